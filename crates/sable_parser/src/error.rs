//! Parser error types.

use sable_lexer::{Span, TokenKind};
use thiserror::Error;

/// Result type for parser operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// A parse error, fatal for the current compile.
#[derive(Clone, Debug, Error)]
pub enum ParseError {
    #[error("unexpected token: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("expected expression, found {found}")]
    ExpectedExpression { found: String, span: Span },

    #[error("expected identifier")]
    ExpectedIdent { span: Span },

    #[error("expected type")]
    ExpectedType { span: Span },

    #[error("{construct} is not supported")]
    Unsupported {
        construct: &'static str,
        span: Span,
    },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. } => *span,
            ParseError::ExpectedExpression { span, .. } => *span,
            ParseError::ExpectedIdent { span } => *span,
            ParseError::ExpectedType { span } => *span,
            ParseError::Unsupported { span, .. } => *span,
        }
    }

    pub fn unexpected_token(expected: impl Into<String>, found: &TokenKind, span: Span) -> Self {
        ParseError::UnexpectedToken {
            expected: expected.into(),
            found: format!("{}", found),
            span,
        }
    }
}
