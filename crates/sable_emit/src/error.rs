//! Error types for code emission.

use sable_lexer::Span;
use thiserror::Error;

/// A compile error raised during emission, fatal for the current compile.
#[derive(Clone, Debug, Error)]
pub enum EmitError {
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String, span: Span },

    #[error("cannot assign to this expression")]
    AssignmentTarget { span: Span },

    #[error("functions of arity {arity} are not supported")]
    UnsupportedArity { arity: usize, span: Span },

    #[error("method reference to {name} is not supported")]
    MethodReference { name: String, span: Span },

    #[error("{what} is not supported here")]
    Unsupported { what: String, span: Span },

    #[error("expression has no inferred type")]
    UnresolvedType { span: Span },
}

impl EmitError {
    pub fn span(&self) -> Span {
        match self {
            EmitError::UndefinedVariable { span, .. } => *span,
            EmitError::AssignmentTarget { span } => *span,
            EmitError::UnsupportedArity { span, .. } => *span,
            EmitError::MethodReference { span, .. } => *span,
            EmitError::Unsupported { span, .. } => *span,
            EmitError::UnresolvedType { span } => *span,
        }
    }
}

/// Result type for code emission.
pub type EmitResult<T> = Result<T, EmitError>;
