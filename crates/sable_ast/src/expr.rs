//! Expression AST nodes.

use crate::{Block, Ident, NodeId, Parameter, TypeExpr};
use sable_lexer::Span;
use sable_types::Type;

/// An expression in Sable.
///
/// The `ty` slot starts empty and is filled by the type checker; consumers
/// treat it as optional and recompute locally when absent.
#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub id: NodeId,
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span, id: NodeId) -> Self {
        Self {
            kind,
            span,
            id,
            ty: None,
        }
    }
}

/// The kind of expression.
#[derive(Clone, Debug)]
pub enum ExprKind {
    /// A literal value (42, 3.14, "hello", true, null)
    Literal(Literal),

    /// An identifier reference
    Ident(Ident),

    /// The enclosing instance
    This,

    /// A binary operation (a + b, x == y, etc.)
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// A unary operation (-x, !b, +n)
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// A method call. `f(args)` parses as receiver `f` with the synthetic
    /// method name `apply`; `obj.m(args)` as receiver `obj` and method `m`.
    MethodCall {
        receiver: Option<Box<Expr>>,
        method: Ident,
        args: Vec<Expr>,
        type_args: Vec<TypeExpr>,
    },

    /// Field access (obj.field)
    FieldAccess { object: Box<Expr>, field: Ident },

    /// Assignment (target = value)
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },

    /// Block expression; its value is the last statement's value
    Block(Block),

    /// If expression
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },

    /// While loop
    While {
        condition: Box<Expr>,
        body: Box<Expr>,
    },

    /// List literal [a, b, c]
    ListLiteral(Vec<Expr>),

    /// Map literal [k1: v1, k2: v2]
    MapLiteral(Vec<(Expr, Expr)>),

    /// Lambda expression
    Lambda {
        params: Vec<Parameter>,
        body: Box<Expr>,
    },
}

/// A literal value.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Int(i64),
    Double(f64),
    Str(String),
    Bool(bool),
    Null,
}

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Equality and comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    // Logical
    And,
    Or,
}

impl BinaryOp {
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Not => "!",
        }
    }
}
