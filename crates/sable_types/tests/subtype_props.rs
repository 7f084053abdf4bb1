use proptest::prelude::*;
use sable_types::{FunctionType, SubtypeContext, Type};

/// A generator of well-formed ground types, a few levels deep.
fn arb_type() -> impl Strategy<Value = Type> {
    let leaf = prop::sample::select(vec![
        Type::Int,
        Type::Double,
        Type::Str,
        Type::Bool,
        Type::Unit,
        Type::Any,
        Type::Nothing,
        Type::Null,
    ]);
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(|t| Type::List(Box::new(t))),
            inner.clone().prop_map(|t| Type::Set(Box::new(t))),
            (inner.clone(), inner.clone())
                .prop_map(|(k, v)| Type::Map(Box::new(k), Box::new(v))),
            (prop::collection::vec(inner.clone(), 0..3), inner)
                .prop_map(|(params, ret)| Type::Function(FunctionType::new(params, ret))),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 512,
        .. ProptestConfig::default()
    })]

    /// T <: T for every well-formed type.
    #[test]
    fn subtyping_is_reflexive(ty in arb_type()) {
        let ctx = SubtypeContext::new();
        prop_assert!(ctx.is_subtype(&ty, &ty));
    }

    /// A <: B and B <: C imply A <: C.
    #[test]
    fn subtyping_is_transitive(a in arb_type(), b in arb_type(), c in arb_type()) {
        let ctx = SubtypeContext::new();
        if ctx.is_subtype(&a, &b) && ctx.is_subtype(&b, &c) {
            prop_assert!(ctx.is_subtype(&a, &c), "{} <: {} <: {} but not transitively", a, b, c);
        }
    }

    /// (A) => R1 <: (B) => R2 iff B <: A and R1 <: R2.
    #[test]
    fn function_contravariance(a in arb_type(), b in arb_type(), r1 in arb_type(), r2 in arb_type()) {
        let ctx = SubtypeContext::new();
        let f = Type::Function(FunctionType::new(vec![a.clone()], r1.clone()));
        let g = Type::Function(FunctionType::new(vec![b.clone()], r2.clone()));
        let expected = ctx.is_subtype(&b, &a) && ctx.is_subtype(&r1, &r2);
        prop_assert_eq!(ctx.is_subtype(&f, &g), expected);
    }

    /// List(S) <: List(T) iff S <: T.
    #[test]
    fn list_covariance(s in arb_type(), t in arb_type()) {
        let ctx = SubtypeContext::new();
        let list_s = Type::List(Box::new(s.clone()));
        let list_t = Type::List(Box::new(t.clone()));
        prop_assert_eq!(ctx.is_subtype(&list_s, &list_t), ctx.is_subtype(&s, &t));
    }

    /// A structural type with a strict superset of another's members is a
    /// subtype of it.
    #[test]
    fn structural_width(
        members in prop::collection::btree_map("[a-z]{1,6}", arb_type(), 1..5),
        extra in prop::collection::btree_map("[A-Z][a-z]{0,4}", arb_type(), 1..3),
    ) {
        let ctx = SubtypeContext::new();
        let narrow = Type::Structural(members.clone().into_iter().collect());
        let wide = Type::Structural(members.into_iter().chain(extra).collect());
        prop_assert!(ctx.is_subtype(&wide, &narrow));
    }
}
