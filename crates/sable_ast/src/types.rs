//! Type annotation AST nodes.

use crate::Ident;
use sable_lexer::Span;

/// A type annotation as written in source.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

impl TypeExpr {
    pub fn new(kind: TypeExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The kind of type annotation.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeExprKind {
    /// A simple or generic name: `Int`, `List<String>`
    Named { name: Ident, args: Vec<TypeExpr> },

    /// A function type: `(Int, Int) => Boolean`, `Int => Int`
    Function {
        params: Vec<TypeExpr>,
        ret: Box<TypeExpr>,
    },

    /// A structural type: `{ name: String, size: Int }`
    Structural(Vec<(Ident, TypeExpr)>),
}
