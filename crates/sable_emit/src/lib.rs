//! JVM class-file emitter for the Sable programming language.
//!
//! Lowers a type-checked program to one class artifact per top-level
//! entity: a wrapper class per function, a regular class per class
//! declaration, an interface per trait, a singleton per object, and a
//! static carrier per extension. Function values and lambdas are
//! materialised through invokedynamic call sites bootstrapped by the
//! platform's lambda factory.

mod classfile;
mod descriptor;
mod emitter;
mod error;
mod expr;
mod shapes;

pub use classfile::{ClassFile, CodeBuilder, ConstantPool, VType};
pub use emitter::{ClassArtifact, Emitter};
pub use error::{EmitError, EmitResult};
pub use shapes::FunctionShape;
