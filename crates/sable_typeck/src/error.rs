//! Error types for the check pass.

use sable_lexer::Span;
use sable_types::TypeError;
use thiserror::Error;

/// A type error with the span of the offending expression or declaration.
#[derive(Clone, Debug, Error)]
#[error("{error}")]
pub struct TypeCheckError {
    pub error: TypeError,
    pub span: Span,
}

impl TypeCheckError {
    pub fn new(error: TypeError, span: Span) -> Self {
        Self { error, span }
    }
}

/// Result type for the check pass.
pub type TypeCheckResult<T> = Result<T, TypeCheckError>;

/// Shorthand for failing with a located type error.
pub(crate) fn err<T>(error: TypeError, span: Span) -> TypeCheckResult<T> {
    Err(TypeCheckError::new(error, span))
}
