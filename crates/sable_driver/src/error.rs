//! Error types for the compilation driver.

use thiserror::Error;

/// Errors that can occur during compilation.
///
/// Pipeline errors arrive pre-rendered with their `file:line:column`
/// prefix and source-line excerpt; the driver is the only component that
/// holds the source map.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Lex(String),

    #[error("{0}")]
    Parse(String),

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Emit(String),
}

/// Result type for compilation operations.
pub type CompileResult<T> = Result<T, CompileError>;
