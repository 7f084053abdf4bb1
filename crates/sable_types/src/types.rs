//! Core type definitions for Sable.

use indexmap::IndexMap;
use std::fmt;

/// The semantic type representation for Sable.
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    /// 32-bit signed integer
    Int,
    /// 64-bit floating point
    Double,
    /// Immutable string (surface name `String`)
    Str,
    /// Boolean (surface name `Boolean`)
    Bool,
    /// The unit type
    Unit,
    /// Top type
    Any,
    /// Bottom type
    Nothing,
    /// The type of the `null` literal
    Null,

    /// List with covariant element type
    List(Box<Type>),
    /// Set with covariant element type
    Set(Box<Type>),
    /// Map with covariant key and value types
    Map(Box<Type>, Box<Type>),

    /// Function type
    Function(FunctionType),

    /// Structural type: a requirement on member names and types
    Structural(IndexMap<String, Type>),

    /// Named class type
    Class(ClassType),
    /// Named trait type
    Trait(TraitType),
    /// Named singleton object type
    Object(ObjectType),

    /// Inference variable
    Var(TypeVar),

    /// A generic type definition, bound in the context under its name
    /// before any arguments are applied
    Generic(GenericDef),
}

impl Type {
    /// Returns true for `Int` and `Double`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Double)
    }

    /// Returns true for types represented as references on the target VM.
    ///
    /// `null` is assignable exactly to these.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::Str
                | Type::Any
                | Type::Null
                | Type::List(_)
                | Type::Set(_)
                | Type::Map(_, _)
                | Type::Function(_)
                | Type::Structural(_)
                | Type::Class(_)
                | Type::Trait(_)
                | Type::Object(_)
        )
    }

    /// Returns the member map of a structural, class, trait or object type.
    pub fn members(&self) -> Option<&IndexMap<String, Type>> {
        match self {
            Type::Structural(members) => Some(members),
            Type::Class(c) => Some(&c.members),
            Type::Trait(t) => Some(&t.members),
            Type::Object(o) => Some(&o.members),
            _ => None,
        }
    }

    /// Returns the declared name of a class, trait or object type.
    pub fn name(&self) -> Option<&str> {
        match self {
            Type::Class(c) => Some(&c.name),
            Type::Trait(t) => Some(&t.name),
            Type::Object(o) => Some(&o.name),
            Type::Generic(g) => Some(&g.name),
            _ => None,
        }
    }

    /// Looks up a member on a structural, class, trait or object type,
    /// searching declared supertypes and traits transitively.
    pub fn member(&self, name: &str) -> Option<&Type> {
        if let Some(found) = self.members().and_then(|m| m.get(name)) {
            return Some(found);
        }
        match self {
            Type::Class(c) => c
                .superclass
                .as_deref()
                .and_then(|s| s.member(name))
                .or_else(|| c.traits.iter().find_map(|t| t.member(name))),
            Type::Trait(t) => t.super_traits.iter().find_map(|s| s.member(name)),
            Type::Object(o) => o
                .superclass
                .as_deref()
                .and_then(|s| s.member(name))
                .or_else(|| o.traits.iter().find_map(|t| t.member(name))),
            _ => None,
        }
    }
}

/// A function type: parameter types and a return type.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub ret: Box<Type>,
}

impl FunctionType {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self {
            params,
            ret: Box::new(ret),
        }
    }
}

/// A named class type with its resolved members.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassType {
    pub name: String,
    pub type_args: Vec<Type>,
    pub superclass: Option<Box<Type>>,
    pub traits: Vec<Type>,
    pub members: IndexMap<String, Type>,
}

/// A named trait type with its resolved members.
#[derive(Clone, Debug, PartialEq)]
pub struct TraitType {
    pub name: String,
    pub type_args: Vec<Type>,
    pub super_traits: Vec<Type>,
    pub members: IndexMap<String, Type>,
}

/// A named singleton object type with its resolved members.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectType {
    pub name: String,
    pub superclass: Option<Box<Type>>,
    pub traits: Vec<Type>,
    pub members: IndexMap<String, Type>,
}

/// An inference variable.
///
/// Ids are unique within one type-checking pass; the optional bound is the
/// variable's declared upper constraint.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeVar {
    pub name: String,
    pub id: u32,
    pub bound: Option<Box<Type>>,
}

impl TypeVar {
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        Self {
            name: name.into(),
            id,
            bound: None,
        }
    }

    pub fn bounded(name: impl Into<String>, id: u32, bound: Type) -> Self {
        Self {
            name: name.into(),
            id,
            bound: Some(Box::new(bound)),
        }
    }
}

/// Declaration-site variance of a type parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Variance {
    #[default]
    Invariant,
    Covariant,
    Contravariant,
}

impl Variance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variance::Invariant => "",
            Variance::Covariant => "+",
            Variance::Contravariant => "-",
        }
    }
}

/// A declared type parameter: name, variance, and optional bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeParamDef {
    pub name: String,
    pub variance: Variance,
    pub upper: Option<Type>,
    pub lower: Option<Type>,
}

impl TypeParamDef {
    pub fn invariant(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variance: Variance::Invariant,
            upper: None,
            lower: None,
        }
    }
}

/// A generic type definition, registered once per declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct GenericDef {
    pub name: String,
    pub params: Vec<TypeParamDef>,
    pub base: Box<Type>,
}

impl GenericDef {
    /// The declared variance of each parameter, in order.
    pub fn variances(&self) -> Vec<Variance> {
        self.params.iter().map(|p| p.variance).collect()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Double => write!(f, "Double"),
            Type::Str => write!(f, "String"),
            Type::Bool => write!(f, "Boolean"),
            Type::Unit => write!(f, "Unit"),
            Type::Any => write!(f, "Any"),
            Type::Nothing => write!(f, "Nothing"),
            Type::Null => write!(f, "Null"),
            Type::List(t) => write!(f, "List<{}>", t),
            Type::Set(t) => write!(f, "Set<{}>", t),
            Type::Map(k, v) => write!(f, "Map<{}, {}>", k, v),
            Type::Function(func) => {
                write!(f, "(")?;
                for (i, p) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") => {}", func.ret)
            }
            Type::Structural(members) => {
                write!(f, "{{ ")?;
                for (i, (name, ty)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, " }}")
            }
            Type::Class(c) => write_named(f, &c.name, &c.type_args),
            Type::Trait(t) => write_named(f, &t.name, &t.type_args),
            Type::Object(o) => write!(f, "{}", o.name),
            Type::Var(v) => write!(f, "{}", v.name),
            Type::Generic(g) => {
                write!(f, "{}<", g.name)?;
                for (i, p) in g.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}{}", p.variance.as_str(), p.name)?;
                }
                write!(f, ">")
            }
        }
    }
}

fn write_named(f: &mut fmt::Formatter<'_>, name: &str, args: &[Type]) -> fmt::Result {
    write!(f, "{}", name)?;
    if !args.is_empty() {
        write!(f, "<")?;
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ">")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_primitives() {
        assert_eq!(Type::Int.to_string(), "Int");
        assert_eq!(Type::Str.to_string(), "String");
        assert_eq!(Type::Bool.to_string(), "Boolean");
    }

    #[test]
    fn test_display_function() {
        let ty = Type::Function(FunctionType::new(vec![Type::Int, Type::Int], Type::Bool));
        assert_eq!(ty.to_string(), "(Int, Int) => Boolean");
    }

    #[test]
    fn test_display_structural() {
        let mut members = IndexMap::new();
        members.insert("x".to_string(), Type::Int);
        members.insert("name".to_string(), Type::Str);
        assert_eq!(
            Type::Structural(members).to_string(),
            "{ x: Int, name: String }"
        );
    }

    #[test]
    fn test_member_lookup_through_supertypes() {
        let animal = Type::Class(ClassType {
            name: "Animal".to_string(),
            type_args: vec![],
            superclass: None,
            traits: vec![],
            members: IndexMap::from([(
                "name".to_string(),
                Type::Function(FunctionType::new(vec![], Type::Str)),
            )]),
        });
        let dog = Type::Class(ClassType {
            name: "Dog".to_string(),
            type_args: vec![],
            superclass: Some(Box::new(animal)),
            traits: vec![],
            members: IndexMap::new(),
        });
        assert!(dog.member("name").is_some());
        assert!(dog.member("missing").is_none());
    }
}
