//! Resolution of type annotations to semantic types.

use crate::checker::TypeChecker;
use crate::error::{err, TypeCheckResult};
use indexmap::IndexMap;
use sable_ast::{TypeExpr, TypeExprKind};
use sable_types::{FunctionType, GenericDef, Type, TypeError};
use std::collections::HashMap;

impl TypeChecker {
    /// Resolves a type annotation in the current context.
    pub(crate) fn resolve_type(&mut self, annotation: &TypeExpr) -> TypeCheckResult<Type> {
        match &annotation.kind {
            TypeExprKind::Named { name, args } => {
                self.resolve_named(annotation, &name.name, args)
            }

            TypeExprKind::Function { params, ret } => {
                let params = params
                    .iter()
                    .map(|p| self.resolve_type(p))
                    .collect::<TypeCheckResult<Vec<_>>>()?;
                let ret = self.resolve_type(ret)?;
                Ok(Type::Function(FunctionType::new(params, ret)))
            }

            TypeExprKind::Structural(members) => {
                let mut resolved = IndexMap::new();
                for (name, ty) in members {
                    let ty = self.resolve_type(ty)?;
                    if resolved.insert(name.name.clone(), ty).is_some() {
                        return err(
                            TypeError::DuplicateDefinition(name.name.clone()),
                            name.span,
                        );
                    }
                }
                Ok(Type::Structural(resolved))
            }
        }
    }

    fn resolve_named(
        &mut self,
        annotation: &TypeExpr,
        name: &str,
        args: &[TypeExpr],
    ) -> TypeCheckResult<Type> {
        // Built-in names first: primitives take no arguments, collections a
        // fixed count.
        let primitive = match name {
            "Int" => Some(Type::Int),
            "Double" => Some(Type::Double),
            "String" => Some(Type::Str),
            "Boolean" => Some(Type::Bool),
            "Unit" => Some(Type::Unit),
            "Any" | "AnyRef" => Some(Type::Any),
            "Nothing" => Some(Type::Nothing),
            "Null" => Some(Type::Null),
            _ => None,
        };
        if let Some(ty) = primitive {
            if !args.is_empty() {
                return err(
                    TypeError::TypeArgumentCount {
                        name: name.to_string(),
                        expected: 0,
                        found: args.len(),
                    },
                    annotation.span,
                );
            }
            return Ok(ty);
        }

        match name {
            "List" | "Set" => {
                let [arg] = args else {
                    return err(
                        TypeError::TypeArgumentCount {
                            name: name.to_string(),
                            expected: 1,
                            found: args.len(),
                        },
                        annotation.span,
                    );
                };
                let elem = Box::new(self.resolve_type(arg)?);
                Ok(if name == "List" {
                    Type::List(elem)
                } else {
                    Type::Set(elem)
                })
            }

            "Map" => {
                let [key, value] = args else {
                    return err(
                        TypeError::TypeArgumentCount {
                            name: name.to_string(),
                            expected: 2,
                            found: args.len(),
                        },
                        annotation.span,
                    );
                };
                let key = self.resolve_type(key)?;
                let value = self.resolve_type(value)?;
                Ok(Type::Map(Box::new(key), Box::new(value)))
            }

            _ => {
                let Some(binding) = self.ctx.lookup(name).cloned() else {
                    return err(TypeError::UnknownType(name.to_string()), annotation.span);
                };

                match binding {
                    Type::Generic(def) => {
                        if args.len() != def.params.len() {
                            return err(
                                TypeError::TypeArgumentCount {
                                    name: name.to_string(),
                                    expected: def.params.len(),
                                    found: args.len(),
                                },
                                annotation.span,
                            );
                        }
                        let resolved: Vec<Type> = args
                            .iter()
                            .map(|a| self.resolve_type(a))
                            .collect::<TypeCheckResult<_>>()?;
                        for (arg, param) in resolved.iter().zip(&def.params) {
                            if !self.subtype.satisfies_bounds(arg, param) {
                                return err(
                                    TypeError::BoundViolation {
                                        arg: arg.clone(),
                                        param: param.name.clone(),
                                    },
                                    annotation.span,
                                );
                            }
                        }
                        Ok(instantiate(&def, &resolved))
                    }

                    Type::Var(_) | Type::Class(_) | Type::Trait(_) | Type::Object(_) => {
                        if !args.is_empty() {
                            return err(
                                TypeError::TypeArgumentCount {
                                    name: name.to_string(),
                                    expected: 0,
                                    found: args.len(),
                                },
                                annotation.span,
                            );
                        }
                        Ok(binding)
                    }

                    _ => err(TypeError::UnknownType(name.to_string()), annotation.span),
                }
            }
        }
    }

    /// Re-reads a named type from the global context, so member lookups and
    /// subtype checks always see the fully resolved definition rather than
    /// a forward-reference placeholder.
    pub(crate) fn refresh(&self, ty: &Type) -> Type {
        let name = match ty {
            Type::Class(c) => &c.name,
            Type::Trait(t) => &t.name,
            Type::Object(o) => &o.name,
            _ => return ty.clone(),
        };
        let args = match ty {
            Type::Class(c) => c.type_args.clone(),
            Type::Trait(t) => t.type_args.clone(),
            _ => Vec::new(),
        };
        match self.ctx.lookup_global(name) {
            Some(Type::Generic(def)) if def.params.len() == args.len() => {
                instantiate(def, &args)
            }
            Some(full @ (Type::Class(_) | Type::Trait(_) | Type::Object(_))) => full.clone(),
            _ => ty.clone(),
        }
    }
}

/// Instantiates a generic definition with the given arguments by
/// substituting its parameter variables throughout the base type.
pub(crate) fn instantiate(def: &GenericDef, args: &[Type]) -> Type {
    let mut map = HashMap::new();
    for (param, arg) in def.params.iter().zip(args) {
        map.insert(param.name.clone(), arg.clone());
    }
    subst_vars(&def.base, &map)
}

/// Replaces type variables by name throughout a type.
pub(crate) fn subst_vars(ty: &Type, map: &HashMap<String, Type>) -> Type {
    match ty {
        Type::Var(v) => map.get(&v.name).cloned().unwrap_or_else(|| ty.clone()),

        Type::List(t) => Type::List(Box::new(subst_vars(t, map))),
        Type::Set(t) => Type::Set(Box::new(subst_vars(t, map))),
        Type::Map(k, v) => Type::Map(
            Box::new(subst_vars(k, map)),
            Box::new(subst_vars(v, map)),
        ),

        Type::Function(f) => Type::Function(FunctionType {
            params: f.params.iter().map(|p| subst_vars(p, map)).collect(),
            ret: Box::new(subst_vars(&f.ret, map)),
        }),

        Type::Structural(members) => Type::Structural(
            members
                .iter()
                .map(|(n, t)| (n.clone(), subst_vars(t, map)))
                .collect(),
        ),

        Type::Class(c) => Type::Class(sable_types::ClassType {
            name: c.name.clone(),
            type_args: c.type_args.iter().map(|t| subst_vars(t, map)).collect(),
            superclass: c
                .superclass
                .as_ref()
                .map(|s| Box::new(subst_vars(s, map))),
            traits: c.traits.iter().map(|t| subst_vars(t, map)).collect(),
            members: c
                .members
                .iter()
                .map(|(n, t)| (n.clone(), subst_vars(t, map)))
                .collect(),
        }),

        Type::Trait(t) => Type::Trait(sable_types::TraitType {
            name: t.name.clone(),
            type_args: t.type_args.iter().map(|a| subst_vars(a, map)).collect(),
            super_traits: t
                .super_traits
                .iter()
                .map(|s| subst_vars(s, map))
                .collect(),
            members: t
                .members
                .iter()
                .map(|(n, m)| (n.clone(), subst_vars(m, map)))
                .collect(),
        }),

        Type::Object(o) => Type::Object(sable_types::ObjectType {
            name: o.name.clone(),
            superclass: o
                .superclass
                .as_ref()
                .map(|s| Box::new(subst_vars(s, map))),
            traits: o.traits.iter().map(|t| subst_vars(t, map)).collect(),
            members: o
                .members
                .iter()
                .map(|(n, t)| (n.clone(), subst_vars(t, map)))
                .collect(),
        }),

        _ => ty.clone(),
    }
}
