//! Error types for lexical analysis.

use crate::Span;
use thiserror::Error;

/// A lexical error, fatal for the current compile.
#[derive(Clone, Debug, Error)]
#[error("{kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

impl LexError {
    pub fn new(kind: LexErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The kind of lexical error.
#[derive(Clone, Debug, Error)]
pub enum LexErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unterminated block comment")]
    UnterminatedBlockComment,

    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
}

/// Result type for lexical analysis.
pub type LexResult<T> = Result<T, LexError>;
