//! Lexical analyzer for the Sable programming language.
//!
//! This crate provides the lexer (tokenizer) that converts Sable source code
//! into a stream of tokens for parsing, together with the span and source-map
//! machinery the rest of the pipeline uses for diagnostics.

mod error;
mod lexer;
mod source_map;
mod span;
mod token;

pub use error::{LexError, LexErrorKind, LexResult};
pub use lexer::Lexer;
pub use source_map::SourceMap;
pub use span::Span;
pub use token::{Token, TokenKind};
