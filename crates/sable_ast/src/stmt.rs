//! Statement and block AST nodes.

use crate::{Expr, Ident, TypeExpr};
use sable_lexer::Span;

/// A statement inside a block.
#[derive(Clone, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The kind of statement.
#[derive(Clone, Debug)]
pub enum StmtKind {
    /// An expression statement
    Expr(Expr),

    /// A variable declaration: `val x = e` or `var x: T = e`
    VarDecl {
        name: Ident,
        annotation: Option<TypeExpr>,
        init: Option<Expr>,
        mutable: bool,
    },

    /// `return` with an optional value
    Return(Option<Expr>),
}

/// A brace-enclosed statement sequence.
///
/// A block is itself an expression whose value is the last statement's
/// value; variable declarations and returns evaluate to unit.
#[derive(Clone, Debug)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}
