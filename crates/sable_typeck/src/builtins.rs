//! Built-in operation signatures.
//!
//! A small table of well-known operations on the collection and string
//! types, plus the top-level output functions registered into the global
//! context before checking starts.

use crate::context::TypeContext;
use sable_types::{FunctionType, Type};

/// Looks up a built-in method on a receiver type.
pub fn builtin_member(receiver: &Type, name: &str) -> Option<FunctionType> {
    match (receiver, name) {
        (Type::List(_), "size") => Some(FunctionType::new(vec![], Type::Int)),
        (Type::List(elem), "get") => {
            Some(FunctionType::new(vec![Type::Int], (**elem).clone()))
        }
        (Type::List(elem), "add") => {
            Some(FunctionType::new(vec![(**elem).clone()], Type::Unit))
        }

        (Type::Set(_), "size") => Some(FunctionType::new(vec![], Type::Int)),
        (Type::Set(elem), "add") => {
            Some(FunctionType::new(vec![(**elem).clone()], Type::Unit))
        }

        (Type::Map(_, _), "size") => Some(FunctionType::new(vec![], Type::Int)),
        (Type::Map(key, value), "get") => {
            Some(FunctionType::new(vec![(**key).clone()], (**value).clone()))
        }

        (Type::Str, "length") => Some(FunctionType::new(vec![], Type::Int)),
        (Type::Str, "substring") => {
            Some(FunctionType::new(vec![Type::Int, Type::Int], Type::Str))
        }

        _ => None,
    }
}

/// Registers the top-level built-in functions in the global context.
pub fn register_globals(ctx: &mut TypeContext) {
    ctx.define_global(
        "println",
        Type::Function(FunctionType::new(vec![Type::Any], Type::Unit)),
    );
    ctx.define_global(
        "print",
        Type::Function(FunctionType::new(vec![Type::Any], Type::Unit)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_builtins() {
        let list = Type::List(Box::new(Type::Str));
        let get = builtin_member(&list, "get").unwrap();
        assert_eq!(get.params, vec![Type::Int]);
        assert_eq!(*get.ret, Type::Str);
        assert!(builtin_member(&list, "missing").is_none());
    }

    #[test]
    fn test_string_builtins() {
        let substring = builtin_member(&Type::Str, "substring").unwrap();
        assert_eq!(substring.params.len(), 2);
        assert_eq!(*substring.ret, Type::Str);
        assert_eq!(*builtin_member(&Type::Str, "length").unwrap().ret, Type::Int);
    }

    #[test]
    fn test_globals_registered() {
        let mut ctx = TypeContext::new();
        register_globals(&mut ctx);
        assert!(matches!(ctx.lookup("println"), Some(Type::Function(_))));
        assert!(matches!(ctx.lookup("print"), Some(Type::Function(_))));
    }
}
