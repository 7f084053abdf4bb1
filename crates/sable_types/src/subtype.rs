//! The subtype relation over semantic types.
//!
//! `S <: T` is a pure function of the two types and a context that knows
//! the declared variance of every registered generic type definition. The
//! relation is reflexive and transitive over the primitive hierarchy and
//! the derived constructors.

use crate::{Type, TypeParamDef, Variance};
use std::collections::HashMap;

/// The context the subtype relation is evaluated in.
///
/// Holds the declared parameter variances of every generic type definition
/// in the compilation unit; unregistered names default to invariant.
#[derive(Clone, Debug, Default)]
pub struct SubtypeContext {
    variances: HashMap<String, Vec<Variance>>,
}

impl SubtypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the parameter variances of a generic type definition.
    pub fn register(&mut self, name: impl Into<String>, variances: Vec<Variance>) {
        self.variances.insert(name.into(), variances);
    }

    /// Returns true if `sub` is a subtype of `sup`.
    pub fn is_subtype(&self, sub: &Type, sup: &Type) -> bool {
        // Reflexivity, including type variables against themselves.
        if sub == sup {
            return true;
        }

        // Nothing is the bottom type, Any the top.
        if matches!(sub, Type::Nothing) {
            return true;
        }
        if matches!(sup, Type::Any) {
            return true;
        }

        // Null is assignable to every reference type.
        if matches!(sub, Type::Null) && sup.is_reference() {
            return true;
        }

        // A type variable is a subtype of its bound, and of nothing else
        // beyond Any and itself.
        if let Type::Var(v) = sub {
            return match &v.bound {
                Some(bound) => self.is_subtype(bound, sup),
                None => false,
            };
        }
        if matches!(sup, Type::Var(_)) {
            return false;
        }

        match (sub, sup) {
            // Collections are covariant in their element positions.
            (Type::List(s), Type::List(t)) => self.is_subtype(s, t),
            (Type::Set(s), Type::Set(t)) => self.is_subtype(s, t),
            (Type::Map(k1, v1), Type::Map(k2, v2)) => {
                self.is_subtype(k1, k2) && self.is_subtype(v1, v2)
            }

            // Functions: contravariant parameters, covariant return.
            (Type::Function(f), Type::Function(g)) => {
                f.params.len() == g.params.len()
                    && f.params
                        .iter()
                        .zip(&g.params)
                        .all(|(p, q)| self.is_subtype(q, p))
                    && self.is_subtype(&f.ret, &g.ret)
            }

            // Width plus depth subtyping: anything with members can satisfy
            // a structural requirement member-by-member.
            (_, Type::Structural(required)) if sub.members().is_some() => required
                .iter()
                .all(|(name, want)| match sub.member(name) {
                    Some(have) => self.is_subtype(have, want),
                    None => false,
                }),

            // Named types: same name relates through the declared variances;
            // otherwise the subtype must reach the supertype through its
            // declared superclass or traits.
            (Type::Class(c), Type::Class(d)) if c.name == d.name => {
                self.args_compatible(&c.name, &c.type_args, &d.type_args)
            }
            (Type::Trait(s), Type::Trait(t)) if s.name == t.name => {
                self.args_compatible(&s.name, &s.type_args, &t.type_args)
            }
            (Type::Object(o), Type::Object(p)) if o.name == p.name => true,

            (Type::Class(c), _) => {
                c.superclass
                    .as_deref()
                    .is_some_and(|s| self.is_subtype(s, sup))
                    || c.traits.iter().any(|t| self.is_subtype(t, sup))
            }
            (Type::Object(o), _) => {
                o.superclass
                    .as_deref()
                    .is_some_and(|s| self.is_subtype(s, sup))
                    || o.traits.iter().any(|t| self.is_subtype(t, sup))
            }
            (Type::Trait(t), _) => t.super_traits.iter().any(|s| self.is_subtype(s, sup)),

            _ => false,
        }
    }

    /// Checks type arguments pairwise under the declared variances of
    /// `name`. Unregistered or unmarked parameters are invariant and
    /// require equal argument types.
    fn args_compatible(&self, name: &str, a: &[Type], b: &[Type]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        let variances = self.variances.get(name);
        a.iter().zip(b).enumerate().all(|(i, (x, y))| {
            let variance = variances
                .and_then(|v| v.get(i))
                .copied()
                .unwrap_or(Variance::Invariant);
            match variance {
                Variance::Invariant => x == y,
                Variance::Covariant => self.is_subtype(x, y),
                Variance::Contravariant => self.is_subtype(y, x),
            }
        })
    }

    /// The narrowest common supertype of two types, when one side already
    /// subsumes the other. There is no variable solving; the system is
    /// intentionally local.
    pub fn unify(&self, a: &Type, b: &Type) -> Option<Type> {
        if self.is_subtype(a, b) {
            Some(b.clone())
        } else if self.is_subtype(b, a) {
            Some(a.clone())
        } else {
            None
        }
    }

    /// Returns true if `arg` satisfies the upper and lower bounds of a
    /// declared type parameter.
    pub fn satisfies_bounds(&self, arg: &Type, param: &TypeParamDef) -> bool {
        let upper_ok = param
            .upper
            .as_ref()
            .map_or(true, |u| self.is_subtype(arg, u));
        let lower_ok = param
            .lower
            .as_ref()
            .map_or(true, |l| self.is_subtype(l, arg));
        upper_ok && lower_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassType, FunctionType, TraitType, TypeVar};
    use indexmap::IndexMap;

    fn ctx() -> SubtypeContext {
        SubtypeContext::new()
    }

    fn class(name: &str, superclass: Option<Type>, traits: Vec<Type>) -> Type {
        Type::Class(ClassType {
            name: name.to_string(),
            type_args: vec![],
            superclass: superclass.map(Box::new),
            traits,
            members: IndexMap::new(),
        })
    }

    fn generic_class(name: &str, args: Vec<Type>) -> Type {
        Type::Class(ClassType {
            name: name.to_string(),
            type_args: args,
            superclass: None,
            traits: vec![],
            members: IndexMap::new(),
        })
    }

    fn structural(members: &[(&str, Type)]) -> Type {
        Type::Structural(
            members
                .iter()
                .map(|(n, t)| (n.to_string(), t.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_reflexive() {
        let c = ctx();
        for ty in [
            Type::Int,
            Type::Double,
            Type::Str,
            Type::Bool,
            Type::Unit,
            Type::Any,
            Type::Nothing,
            Type::Null,
            Type::List(Box::new(Type::Int)),
            Type::Function(FunctionType::new(vec![Type::Int], Type::Bool)),
            structural(&[("x", Type::Int)]),
        ] {
            assert!(c.is_subtype(&ty, &ty), "{} <: {} failed", ty, ty);
        }
    }

    #[test]
    fn test_nothing_is_bottom_any_is_top() {
        let c = ctx();
        for ty in [Type::Int, Type::Str, Type::List(Box::new(Type::Bool))] {
            assert!(c.is_subtype(&Type::Nothing, &ty));
            assert!(c.is_subtype(&ty, &Type::Any));
            assert!(!c.is_subtype(&ty, &Type::Nothing));
        }
        assert!(!c.is_subtype(&Type::Any, &Type::Int));
    }

    #[test]
    fn test_null_assignable_to_references_only() {
        let c = ctx();
        assert!(c.is_subtype(&Type::Null, &Type::Str));
        assert!(c.is_subtype(&Type::Null, &Type::List(Box::new(Type::Int))));
        assert!(c.is_subtype(&Type::Null, &Type::Any));
        assert!(!c.is_subtype(&Type::Null, &Type::Int));
        assert!(!c.is_subtype(&Type::Null, &Type::Bool));
        assert!(!c.is_subtype(&Type::Null, &Type::Unit));
    }

    #[test]
    fn test_primitives_unrelated() {
        let c = ctx();
        assert!(!c.is_subtype(&Type::Int, &Type::Double));
        assert!(!c.is_subtype(&Type::Double, &Type::Int));
        assert!(!c.is_subtype(&Type::Bool, &Type::Int));
    }

    #[test]
    fn test_list_covariance() {
        let c = ctx();
        let list_int = Type::List(Box::new(Type::Int));
        let list_any = Type::List(Box::new(Type::Any));
        assert!(c.is_subtype(&list_int, &list_any));
        assert!(!c.is_subtype(&list_any, &list_int));
    }

    #[test]
    fn test_map_covariance() {
        let c = ctx();
        let narrow = Type::Map(Box::new(Type::Int), Box::new(Type::Str));
        let wide = Type::Map(Box::new(Type::Any), Box::new(Type::Any));
        assert!(c.is_subtype(&narrow, &wide));
        assert!(!c.is_subtype(&wide, &narrow));
    }

    #[test]
    fn test_function_contravariance() {
        let c = ctx();
        // (Any) => Int <: (Int) => Any
        let f = Type::Function(FunctionType::new(vec![Type::Any], Type::Int));
        let g = Type::Function(FunctionType::new(vec![Type::Int], Type::Any));
        assert!(c.is_subtype(&f, &g));
        assert!(!c.is_subtype(&g, &f));
    }

    #[test]
    fn test_function_arity_must_match() {
        let c = ctx();
        let f = Type::Function(FunctionType::new(vec![Type::Int], Type::Int));
        let g = Type::Function(FunctionType::new(vec![Type::Int, Type::Int], Type::Int));
        assert!(!c.is_subtype(&f, &g));
    }

    #[test]
    fn test_structural_width() {
        let c = ctx();
        let wide = structural(&[("x", Type::Int), ("y", Type::Int), ("z", Type::Str)]);
        let narrow = structural(&[("x", Type::Int)]);
        assert!(c.is_subtype(&wide, &narrow));
        assert!(!c.is_subtype(&narrow, &wide));
    }

    #[test]
    fn test_structural_depth() {
        let c = ctx();
        let sub = structural(&[("xs", Type::List(Box::new(Type::Int)))]);
        let sup = structural(&[("xs", Type::List(Box::new(Type::Any)))]);
        assert!(c.is_subtype(&sub, &sup));
        assert!(!c.is_subtype(&sup, &sub));
    }

    #[test]
    fn test_class_satisfies_structural() {
        let c = ctx();
        let point = Type::Class(ClassType {
            name: "Point".to_string(),
            type_args: vec![],
            superclass: None,
            traits: vec![],
            members: IndexMap::from([
                ("x".to_string(), Type::Int),
                ("y".to_string(), Type::Int),
            ]),
        });
        assert!(c.is_subtype(&point, &structural(&[("x", Type::Int)])));
        assert!(!c.is_subtype(&point, &structural(&[("w", Type::Int)])));
    }

    #[test]
    fn test_nominal_through_superclass_and_traits() {
        let c = ctx();
        let show = Type::Trait(TraitType {
            name: "Show".to_string(),
            type_args: vec![],
            super_traits: vec![],
            members: IndexMap::new(),
        });
        let animal = class("Animal", None, vec![show.clone()]);
        let dog = class("Dog", Some(animal.clone()), vec![]);
        assert!(c.is_subtype(&dog, &animal));
        assert!(c.is_subtype(&dog, &show));
        assert!(!c.is_subtype(&animal, &dog));
    }

    #[test]
    fn test_unmarked_generics_are_invariant() {
        let c = ctx();
        let box_int = generic_class("Box", vec![Type::Int]);
        let box_any = generic_class("Box", vec![Type::Any]);
        assert!(c.is_subtype(&box_int, &box_int));
        assert!(!c.is_subtype(&box_int, &box_any));
        assert!(!c.is_subtype(&box_any, &box_int));
    }

    #[test]
    fn test_covariant_marked_generics() {
        let mut c = ctx();
        c.register("Source", vec![Variance::Covariant]);
        let src_int = generic_class("Source", vec![Type::Int]);
        let src_any = generic_class("Source", vec![Type::Any]);
        assert!(c.is_subtype(&src_int, &src_any));
        assert!(!c.is_subtype(&src_any, &src_int));
    }

    #[test]
    fn test_contravariant_marked_generics() {
        let mut c = ctx();
        c.register("Sink", vec![Variance::Contravariant]);
        let sink_int = generic_class("Sink", vec![Type::Int]);
        let sink_any = generic_class("Sink", vec![Type::Any]);
        assert!(c.is_subtype(&sink_any, &sink_int));
        assert!(!c.is_subtype(&sink_int, &sink_any));
    }

    #[test]
    fn test_type_var_bound() {
        let c = ctx();
        let bounded = Type::Var(TypeVar::bounded("T", 0, Type::Str));
        let unbounded = Type::Var(TypeVar::new("U", 1));
        assert!(c.is_subtype(&bounded, &Type::Str));
        assert!(c.is_subtype(&bounded, &Type::Any));
        assert!(!c.is_subtype(&bounded, &Type::Int));
        assert!(c.is_subtype(&unbounded, &Type::Any));
        assert!(!c.is_subtype(&unbounded, &Type::Str));
        assert!(c.is_subtype(&unbounded, &unbounded));
    }

    #[test]
    fn test_unify_picks_wider_side() {
        let c = ctx();
        assert_eq!(c.unify(&Type::Int, &Type::Any), Some(Type::Any));
        assert_eq!(c.unify(&Type::Any, &Type::Int), Some(Type::Any));
        assert_eq!(c.unify(&Type::Int, &Type::Int), Some(Type::Int));
        assert_eq!(c.unify(&Type::Int, &Type::Str), None);
        assert_eq!(c.unify(&Type::Nothing, &Type::Int), Some(Type::Int));
    }

    #[test]
    fn test_bounds() {
        let c = ctx();
        let param = TypeParamDef {
            name: "T".to_string(),
            variance: Variance::Invariant,
            upper: Some(Type::Any),
            lower: Some(Type::Nothing),
        };
        assert!(c.satisfies_bounds(&Type::Int, &param));

        let strict = TypeParamDef {
            name: "T".to_string(),
            variance: Variance::Invariant,
            upper: Some(Type::Str),
            lower: None,
        };
        assert!(c.satisfies_bounds(&Type::Str, &strict));
        assert!(!c.satisfies_bounds(&Type::Int, &strict));
    }
}
