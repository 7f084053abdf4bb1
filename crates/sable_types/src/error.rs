//! Error types for type resolution and checking.

use crate::Type;
use thiserror::Error;

/// Errors produced by type-level operations.
///
/// These carry no source location; the checker wraps them with the span of
/// the offending expression or declaration.
#[derive(Clone, Debug, Error)]
pub enum TypeError {
    #[error("type mismatch: expected {expected}, found {found}")]
    Mismatch { expected: Type, found: Type },

    #[error("undefined name: {0}")]
    Undefined(String),

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("wrong number of arguments: expected {expected}, found {found}")]
    WrongArity { expected: usize, found: usize },

    #[error("no member {member} on type {ty}")]
    NoSuchMember { ty: Type, member: String },

    #[error("cannot call non-function type: {0}")]
    NotCallable(Type),

    #[error("condition must be Boolean, found {0}")]
    NonBooleanCondition(Type),

    #[error("parameter {0} requires a type annotation")]
    MissingAnnotation(String),

    #[error("duplicate definition of {0}")]
    DuplicateDefinition(String),

    #[error("invalid operands for {op}: {left} and {right}")]
    InvalidOperands {
        op: String,
        left: Type,
        right: Type,
    },

    #[error("cannot find a common type for {0} and {1}")]
    CannotUnify(Type, Type),

    #[error("{name} expects {expected} type arguments, found {found}")]
    TypeArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("type argument {arg} does not satisfy the bounds of {param}")]
    BoundViolation { arg: Type, param: String },

    #[error("`this` is not available here")]
    NoThis,

    #[error("superclass must be a class, found {0}")]
    NotAClass(Type),

    #[error("expected a trait, found {0}")]
    NotATrait(Type),
}

/// Result type for type-level operations.
pub type TypeResult<T> = Result<T, TypeError>;
