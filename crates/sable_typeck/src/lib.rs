//! Type checker and inferencer for the Sable programming language.
//!
//! The checker performs two passes over a program: a collection pass that
//! binds a preliminary semantic type for every top-level declaration, and a
//! check pass that walks every body, resolves annotations, infers the types
//! of expressions, and fills each expression's inferred-type slot.

mod builtins;
mod checker;
mod context;
mod error;
mod resolve;

pub use checker::{type_key, ProgramTypes, TypeChecker};
pub use context::TypeContext;
pub use error::{TypeCheckError, TypeCheckResult};
