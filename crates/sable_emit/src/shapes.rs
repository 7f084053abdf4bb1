//! Functional-interface shape selection for function values.
//!
//! The emitter materialises every function-typed expression as an instance
//! of a `java.util.function` interface, preferring primitive-specialised
//! shapes and falling back to the object-typed ones. The chosen shape
//! fixes the interface, its single abstract method, and the erased
//! descriptor used both at materialisation and at `apply` call sites.

use crate::descriptor::boxed_descriptor;
use crate::error::{EmitError, EmitResult};
use sable_lexer::Span;
use sable_types::Type;

/// A functional-interface shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionShape {
    /// Internal name of the interface.
    pub interface: &'static str,
    /// Name of the single abstract method.
    pub method: &'static str,
    /// The erased descriptor of the single abstract method.
    pub erased: &'static str,
}

impl FunctionShape {
    /// True when the shape passes parameters and returns through Object,
    /// requiring boxing at call sites.
    pub fn is_boxed(&self) -> bool {
        self.erased.contains("Ljava/lang/Object;")
    }

    /// The instantiated method type for a given semantic signature:
    /// specialised shapes keep their erased descriptor, object shapes
    /// reify Object positions to the boxed argument and return types.
    pub fn instantiated(&self, params: &[Type], ret: &Type) -> String {
        if !self.is_boxed() {
            return self.erased.to_string();
        }
        let mut out = String::from("(");
        for (p, erased) in params.iter().zip(self.erased_params()) {
            if erased == "Ljava/lang/Object;" {
                out.push_str(&boxed_descriptor(p));
            } else {
                out.push_str(erased);
            }
        }
        out.push(')');
        if self.erased.ends_with("Ljava/lang/Object;") {
            out.push_str(&boxed_descriptor(ret));
        } else {
            out.push_str(self.erased.rsplit(')').next().unwrap_or("V"));
        }
        out
    }

    /// The erased descriptor of each parameter position.
    pub(crate) fn erased_params(&self) -> Vec<&'static str> {
        let inner = &self.erased[1..self.erased.find(')').unwrap_or(1)];
        let mut params = Vec::new();
        let mut rest = inner;
        while !rest.is_empty() {
            if rest.starts_with('L') {
                let end = rest.find(';').unwrap() + 1;
                params.push(&rest[..end]);
                rest = &rest[end..];
            } else {
                params.push(&rest[..1]);
                rest = &rest[1..];
            }
        }
        params
    }
}

const SUPPLIER: FunctionShape = FunctionShape {
    interface: "java/util/function/Supplier",
    method: "get",
    erased: "()Ljava/lang/Object;",
};

const INT_UNARY: FunctionShape = FunctionShape {
    interface: "java/util/function/IntUnaryOperator",
    method: "applyAsInt",
    erased: "(I)I",
};

const INT_TO_DOUBLE: FunctionShape = FunctionShape {
    interface: "java/util/function/IntToDoubleFunction",
    method: "applyAsDouble",
    erased: "(I)D",
};

const INT_FUNCTION: FunctionShape = FunctionShape {
    interface: "java/util/function/IntFunction",
    method: "apply",
    erased: "(I)Ljava/lang/Object;",
};

const TO_INT_FUNCTION: FunctionShape = FunctionShape {
    interface: "java/util/function/ToIntFunction",
    method: "applyAsInt",
    erased: "(Ljava/lang/Object;)I",
};

const FUNCTION: FunctionShape = FunctionShape {
    interface: "java/util/function/Function",
    method: "apply",
    erased: "(Ljava/lang/Object;)Ljava/lang/Object;",
};

const INT_BINARY: FunctionShape = FunctionShape {
    interface: "java/util/function/IntBinaryOperator",
    method: "applyAsInt",
    erased: "(II)I",
};

const BI_FUNCTION: FunctionShape = FunctionShape {
    interface: "java/util/function/BiFunction",
    method: "apply",
    erased: "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
};

/// Selects the functional-interface shape for a semantic signature, or
/// None for unsupported arities.
pub fn interface_for(params: &[Type], ret: &Type) -> Option<FunctionShape> {
    let shape = match params {
        [] => SUPPLIER,
        [Type::Int] => match ret {
            Type::Int => INT_UNARY,
            Type::Double => INT_TO_DOUBLE,
            _ => INT_FUNCTION,
        },
        [_] => match ret {
            Type::Int => TO_INT_FUNCTION,
            _ => FUNCTION,
        },
        [Type::Int, Type::Int] if *ret == Type::Int => INT_BINARY,
        [_, _] => BI_FUNCTION,
        _ => return None,
    };
    Some(shape)
}

/// Like [`interface_for`], but reports unsupported arities as the compile
/// error the language mandates.
pub fn shape_for(params: &[Type], ret: &Type, span: Span) -> EmitResult<FunctionShape> {
    interface_for(params, ret).ok_or(EmitError::UnsupportedArity {
        arity: params.len(),
        span,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_table() {
        assert_eq!(interface_for(&[], &Type::Str).unwrap(), SUPPLIER);
        assert_eq!(interface_for(&[Type::Int], &Type::Int).unwrap(), INT_UNARY);
        assert_eq!(
            interface_for(&[Type::Int], &Type::Double).unwrap(),
            INT_TO_DOUBLE
        );
        assert_eq!(
            interface_for(&[Type::Int], &Type::Str).unwrap(),
            INT_FUNCTION
        );
        assert_eq!(
            interface_for(&[Type::Str], &Type::Int).unwrap(),
            TO_INT_FUNCTION
        );
        assert_eq!(interface_for(&[Type::Str], &Type::Str).unwrap(), FUNCTION);
        assert_eq!(
            interface_for(&[Type::Int, Type::Int], &Type::Int).unwrap(),
            INT_BINARY
        );
        assert_eq!(
            interface_for(&[Type::Int, Type::Str], &Type::Int).unwrap(),
            BI_FUNCTION
        );
        assert_eq!(
            interface_for(&[Type::Double, Type::Double], &Type::Double).unwrap(),
            BI_FUNCTION
        );
    }

    #[test]
    fn test_arity_three_unsupported() {
        assert!(interface_for(&[Type::Int, Type::Int, Type::Int], &Type::Int).is_none());
        let err = shape_for(
            &[Type::Int, Type::Int, Type::Int],
            &Type::Int,
            Span::dummy(),
        )
        .unwrap_err();
        assert!(matches!(err, EmitError::UnsupportedArity { arity: 3, .. }));
    }

    #[test]
    fn test_instantiated_types() {
        // Specialised shapes keep their erased descriptor.
        let shape = interface_for(&[Type::Int], &Type::Int).unwrap();
        assert_eq!(shape.instantiated(&[Type::Int], &Type::Int), "(I)I");

        // Object shapes reify to boxed types.
        let shape = interface_for(&[Type::Str], &Type::Str).unwrap();
        assert_eq!(
            shape.instantiated(&[Type::Str], &Type::Str),
            "(Ljava/lang/String;)Ljava/lang/String;"
        );

        let shape = interface_for(&[Type::Int, Type::Str], &Type::Int).unwrap();
        assert_eq!(
            shape.instantiated(&[Type::Int, Type::Str], &Type::Int),
            "(Ljava/lang/Integer;Ljava/lang/String;)Ljava/lang/Integer;"
        );

        // ToIntFunction keeps its primitive return.
        let shape = interface_for(&[Type::Str], &Type::Int).unwrap();
        assert_eq!(
            shape.instantiated(&[Type::Str], &Type::Int),
            "(Ljava/lang/String;)I"
        );
    }
}
