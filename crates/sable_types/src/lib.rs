//! Semantic types for the Sable programming language.
//!
//! This crate provides the type representation shared by the checker and
//! the emitter: primitives, collections, function types, structural types,
//! named class/trait/object types, inference variables, and the subtype
//! relation with declaration-site variance.

mod error;
mod subtype;
mod types;

pub use error::{TypeError, TypeResult};
pub use subtype::SubtypeContext;
pub use types::{
    ClassType, FunctionType, GenericDef, ObjectType, TraitType, Type, TypeParamDef, TypeVar,
    Variance,
};
