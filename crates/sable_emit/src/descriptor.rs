//! Mapping semantic types onto JVM descriptors and internal names.

use crate::classfile::VType;
use crate::shapes;
use sable_types::Type;

/// The field descriptor of a semantic type.
///
/// Structural types, type variables, `Any` and `Null` erase to Object;
/// function types erase to their functional-interface shape.
pub fn field_descriptor(ty: &Type) -> String {
    match ty {
        Type::Int => "I".to_string(),
        Type::Double => "D".to_string(),
        Type::Bool => "Z".to_string(),
        Type::Unit => "V".to_string(),
        _ => format!("L{};", internal_name(ty)),
    }
}

/// The internal (slash-separated) class name a reference type lowers to.
pub fn internal_name(ty: &Type) -> String {
    match ty {
        Type::Str => "java/lang/String".to_string(),
        Type::List(_) => "java/util/List".to_string(),
        Type::Set(_) => "java/util/Set".to_string(),
        Type::Map(_, _) => "java/util/Map".to_string(),
        Type::Class(c) => c.name.clone(),
        Type::Trait(t) => t.name.clone(),
        Type::Object(o) => o.name.clone(),
        Type::Function(f) => shapes::interface_for(&f.params, &f.ret)
            .map(|shape| shape.interface.to_string())
            .unwrap_or_else(|| "java/lang/Object".to_string()),
        _ => "java/lang/Object".to_string(),
    }
}

/// The boxed reference descriptor of a type, used in instantiated method
/// types at lambda call sites.
pub fn boxed_descriptor(ty: &Type) -> String {
    match ty {
        Type::Int => "Ljava/lang/Integer;".to_string(),
        Type::Double => "Ljava/lang/Double;".to_string(),
        Type::Bool => "Ljava/lang/Boolean;".to_string(),
        Type::Unit => "Ljava/lang/Object;".to_string(),
        _ => field_descriptor(ty),
    }
}

/// The boxed class of a primitive, if it has one.
pub fn box_class(ty: &Type) -> Option<(&'static str, &'static str, &'static str)> {
    // (box class, unbox method, unbox descriptor)
    match ty {
        Type::Int => Some(("java/lang/Integer", "intValue", "()I")),
        Type::Double => Some(("java/lang/Double", "doubleValue", "()D")),
        Type::Bool => Some(("java/lang/Boolean", "booleanValue", "()Z")),
        _ => None,
    }
}

/// A method descriptor from semantic parameter and return types.
pub fn method_descriptor(params: &[Type], ret: &Type) -> String {
    let mut out = String::from("(");
    for p in params {
        out.push_str(&field_descriptor(p));
    }
    out.push(')');
    out.push_str(&field_descriptor(ret));
    out
}

/// The verification type of a value of this semantic type.
pub fn vtype_for(ty: &Type) -> VType {
    match ty {
        Type::Int | Type::Bool => VType::Integer,
        Type::Double => VType::Double,
        Type::Null => VType::Null,
        _ => VType::Object(internal_name(ty)),
    }
}

/// Returns true if values of this type occupy a JVM reference slot.
pub fn is_reference(ty: &Type) -> bool {
    !matches!(ty, Type::Int | Type::Double | Type::Bool | Type::Unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_types::FunctionType;

    #[test]
    fn test_primitive_descriptors() {
        assert_eq!(field_descriptor(&Type::Int), "I");
        assert_eq!(field_descriptor(&Type::Double), "D");
        assert_eq!(field_descriptor(&Type::Bool), "Z");
        assert_eq!(field_descriptor(&Type::Unit), "V");
        assert_eq!(field_descriptor(&Type::Str), "Ljava/lang/String;");
    }

    #[test]
    fn test_collections_erase_to_interfaces() {
        assert_eq!(
            field_descriptor(&Type::List(Box::new(Type::Int))),
            "Ljava/util/List;"
        );
        assert_eq!(
            field_descriptor(&Type::Map(Box::new(Type::Str), Box::new(Type::Int))),
            "Ljava/util/Map;"
        );
    }

    #[test]
    fn test_method_descriptor() {
        assert_eq!(
            method_descriptor(&[Type::Int, Type::Str], &Type::Bool),
            "(ILjava/lang/String;)Z"
        );
        assert_eq!(method_descriptor(&[], &Type::Unit), "()V");
    }

    #[test]
    fn test_function_type_erases_to_shape_interface() {
        let f = Type::Function(FunctionType::new(vec![Type::Int], Type::Int));
        assert_eq!(
            field_descriptor(&f),
            "Ljava/util/function/IntUnaryOperator;"
        );
    }

    #[test]
    fn test_any_and_structural_erase_to_object() {
        assert_eq!(field_descriptor(&Type::Any), "Ljava/lang/Object;");
        assert_eq!(
            field_descriptor(&Type::Structural(Default::default())),
            "Ljava/lang/Object;"
        );
    }
}
