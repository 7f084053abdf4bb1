//! The two-pass type checker.
//!
//! The collection pass binds a preliminary semantic type for every
//! top-level declaration, so bodies may reference declarations regardless
//! of source order. The check pass walks every body in source order,
//! inferring and validating expression types and filling the AST's
//! inferred-type slots.

use crate::builtins::{builtin_member, register_globals};
use crate::context::TypeContext;
use crate::error::{err, TypeCheckError, TypeCheckResult};
use indexmap::IndexMap;
use sable_ast::*;
use sable_lexer::Span;
use sable_types::{
    ClassType, FunctionType, GenericDef, ObjectType, SubtypeContext, TraitType, Type, TypeError,
    TypeParamDef, TypeVar,
};
use std::collections::{HashMap, HashSet};

/// The Sable type checker and inferencer.
///
/// Construct one per program; type variables and context bindings are
/// scoped to a single check.
pub struct TypeChecker {
    pub(crate) ctx: TypeContext,
    pub(crate) subtype: SubtypeContext,
    next_var: u32,
    /// Extension methods, keyed by the flat name of the target type.
    extensions: HashMap<String, IndexMap<String, FunctionType>>,
    /// Constructor parameter types, keyed by class name.
    constructors: HashMap<String, Vec<Type>>,
    /// The declared return type of the function being checked.
    current_return: Option<Type>,
}

/// The kind of named declaration being pre-bound.
enum Named {
    Class,
    Trait,
    Object,
}

impl Named {
    /// An empty placeholder type under the given name, bound before member
    /// resolution so forward references always find the name.
    fn empty(&self, name: &str) -> Type {
        match self {
            Named::Class => Type::Class(ClassType {
                name: name.to_string(),
                type_args: Vec::new(),
                superclass: None,
                traits: Vec::new(),
                members: IndexMap::new(),
            }),
            Named::Trait => Type::Trait(TraitType {
                name: name.to_string(),
                type_args: Vec::new(),
                super_traits: Vec::new(),
                members: IndexMap::new(),
            }),
            Named::Object => Type::Object(ObjectType {
                name: name.to_string(),
                superclass: None,
                traits: Vec::new(),
                members: IndexMap::new(),
            }),
        }
    }
}

impl TypeChecker {
    pub fn new() -> Self {
        let mut ctx = TypeContext::new();
        register_globals(&mut ctx);
        Self {
            ctx,
            subtype: SubtypeContext::new(),
            next_var: 0,
            extensions: HashMap::new(),
            constructors: HashMap::new(),
            current_return: None,
        }
    }

    /// The subtype context, with every generic definition's variances
    /// registered.
    pub fn subtype_context(&self) -> &SubtypeContext {
        &self.subtype
    }

    /// Type checks a program, filling every expression's inferred-type
    /// slot. Fatal on the first error.
    pub fn check(&mut self, program: &mut Program) -> TypeCheckResult<()> {
        self.collect(program)?;
        for decl in &mut program.decls {
            self.check_decl(decl)?;
        }
        Ok(())
    }

    pub(crate) fn fresh_var(&mut self, name: &str) -> Type {
        let id = self.next_var;
        self.next_var += 1;
        Type::Var(TypeVar::new(name, id))
    }

    /// Checker-level compatibility: the strict subtype relation, with
    /// unsolved inference variables accepted on either side. There is no
    /// variable solving; an unconstrained variable is compatible with
    /// anything inside its bound.
    fn compatible(&self, sub: &Type, sup: &Type) -> bool {
        match (sub, sup) {
            (Type::Var(v), _) => match &v.bound {
                Some(bound) => self.compatible(bound, sup),
                None => true,
            },
            (_, Type::Var(v)) => match &v.bound {
                Some(bound) => self.compatible(sub, bound),
                None => true,
            },

            (Type::List(a), Type::List(b)) | (Type::Set(a), Type::Set(b)) => {
                self.compatible(a, b)
            }
            (Type::Map(k1, v1), Type::Map(k2, v2)) => {
                self.compatible(k1, k2) && self.compatible(v1, v2)
            }
            (Type::Function(f), Type::Function(g)) => {
                f.params.len() == g.params.len()
                    && f.params
                        .iter()
                        .zip(&g.params)
                        .all(|(p, q)| self.compatible(q, p))
                    && self.compatible(&f.ret, &g.ret)
            }

            _ => self
                .subtype
                .is_subtype(&self.refresh(sub), &self.refresh(sup)),
        }
    }

    // ========== Collection pass ==========

    fn collect(&mut self, program: &Program) -> TypeCheckResult<()> {
        // Allocate every top-level name first, so member resolution can
        // always find named types regardless of source order. Extension
        // targets live in their own namespace.
        let mut seen = HashSet::new();
        let mut seen_extensions = HashSet::new();
        for decl in &program.decls {
            let name = decl.name().to_string();
            let unique = match decl {
                Decl::Extension(_) => seen_extensions.insert(name.clone()),
                _ => seen.insert(name.clone()),
            };
            if !unique {
                return err(TypeError::DuplicateDefinition(name), decl.span());
            }
            match decl {
                Decl::Class(c) => self.prebind_named(&c.name.name, &c.type_params, Named::Class),
                Decl::Trait(t) => self.prebind_named(&t.name.name, &t.type_params, Named::Trait),
                Decl::Object(o) => self.prebind_named(&o.name.name, &[], Named::Object),
                Decl::Function(_) | Decl::Extension(_) => {}
            }
        }

        // Resolve full signatures in source order, rebinding each name.
        for decl in &program.decls {
            match decl {
                Decl::Function(f) => {
                    let sig = self.resolve_function_signature(f)?;
                    self.ctx
                        .define_global(f.name.name.clone(), Type::Function(sig));
                }
                Decl::Class(c) => self.collect_class(c)?,
                Decl::Trait(t) => self.collect_trait(t)?,
                Decl::Object(o) => self.collect_object(o)?,
                Decl::Extension(e) => self.collect_extension(e)?,
            }
        }
        Ok(())
    }

    fn prebind_named(&mut self, name: &str, type_params: &[TypeParam], kind: Named) {
        let base = kind.empty(name);
        if type_params.is_empty() {
            self.ctx.define_global(name.to_string(), base);
        } else {
            let params: Vec<TypeParamDef> = type_params
                .iter()
                .map(|tp| TypeParamDef {
                    name: tp.name.name.clone(),
                    variance: tp.variance,
                    upper: None,
                    lower: None,
                })
                .collect();
            self.ctx.define_global(
                name.to_string(),
                Type::Generic(GenericDef {
                    name: name.to_string(),
                    params,
                    base: Box::new(base),
                }),
            );
        }
    }

    /// Binds each type parameter as a fresh variable and returns the
    /// resolved parameter definitions paired with their variables.
    fn bind_type_params(
        &mut self,
        type_params: &[TypeParam],
    ) -> TypeCheckResult<Vec<(TypeParamDef, Type)>> {
        let mut out = Vec::new();
        for tp in type_params {
            let upper = tp
                .upper
                .as_ref()
                .map(|u| self.resolve_type(u))
                .transpose()?;
            let lower = tp
                .lower
                .as_ref()
                .map(|l| self.resolve_type(l))
                .transpose()?;

            let id = self.next_var;
            self.next_var += 1;
            let var = Type::Var(TypeVar {
                name: tp.name.name.clone(),
                id,
                bound: upper.clone().map(Box::new),
            });
            self.ctx.define(tp.name.name.clone(), var.clone());

            out.push((
                TypeParamDef {
                    name: tp.name.name.clone(),
                    variance: tp.variance,
                    upper,
                    lower,
                },
                var,
            ));
        }
        Ok(out)
    }

    fn resolve_function_signature(&mut self, f: &FunctionDecl) -> TypeCheckResult<FunctionType> {
        self.ctx.push_scope();
        self.bind_type_params(&f.type_params)?;

        let mut params = Vec::new();
        for p in &f.params {
            let Some(annotation) = &p.annotation else {
                return err(TypeError::MissingAnnotation(p.name.name.clone()), p.span);
            };
            params.push(self.resolve_type(annotation)?);
        }

        let ret = match &f.return_annotation {
            Some(annotation) => self.resolve_type(annotation)?,
            None => self.fresh_var("R"),
        };

        self.ctx.pop_scope();
        Ok(FunctionType::new(params, ret))
    }

    /// Resolves the declared members of a class or object body, including
    /// constructor parameters, with duplicate-name detection.
    fn collect_body_members(
        &mut self,
        ctor: Option<&Constructor>,
        members: &[ClassMember],
    ) -> TypeCheckResult<(IndexMap<String, Type>, Vec<Type>)> {
        let mut resolved = IndexMap::new();
        let mut ctor_params = Vec::new();

        if let Some(ctor) = ctor {
            for p in &ctor.params {
                let Some(annotation) = &p.annotation else {
                    return err(TypeError::MissingAnnotation(p.name.name.clone()), p.span);
                };
                let ty = self.resolve_type(annotation)?;
                if resolved.insert(p.name.name.clone(), ty.clone()).is_some() {
                    return err(TypeError::DuplicateDefinition(p.name.name.clone()), p.span);
                }
                ctor_params.push(ty);
            }
        }

        for member in members {
            let (name, ty, span) = match member {
                ClassMember::Field {
                    name,
                    annotation,
                    span,
                    ..
                } => {
                    let Some(annotation) = annotation else {
                        return err(TypeError::MissingAnnotation(name.name.clone()), *span);
                    };
                    (name.name.clone(), self.resolve_type(annotation)?, *span)
                }
                ClassMember::Method(m) => {
                    let sig = self.resolve_function_signature(m)?;
                    (m.name.name.clone(), Type::Function(sig), m.span)
                }
            };
            if resolved.insert(name.clone(), ty).is_some() {
                return err(TypeError::DuplicateDefinition(name), span);
            }
        }

        Ok((resolved, ctor_params))
    }

    fn resolve_superclass(&mut self, annotation: &TypeExpr) -> TypeCheckResult<Type> {
        let ty = self.resolve_type(annotation)?;
        if !matches!(ty, Type::Class(_)) {
            return err(TypeError::NotAClass(ty), annotation.span);
        }
        Ok(ty)
    }

    fn resolve_trait_list(&mut self, annotations: &[TypeExpr]) -> TypeCheckResult<Vec<Type>> {
        let mut traits = Vec::new();
        for annotation in annotations {
            let ty = self.resolve_type(annotation)?;
            if !matches!(ty, Type::Trait(_)) {
                return err(TypeError::NotATrait(ty), annotation.span);
            }
            traits.push(ty);
        }
        Ok(traits)
    }

    fn collect_class(&mut self, c: &ClassDecl) -> TypeCheckResult<()> {
        self.ctx.push_scope();
        let params = self.bind_type_params(&c.type_params)?;

        let superclass = c
            .superclass
            .as_ref()
            .map(|s| self.resolve_superclass(s))
            .transpose()?
            .map(Box::new);
        let traits = self.resolve_trait_list(&c.traits)?;
        let (members, ctor_params) =
            self.collect_body_members(c.constructor.as_ref(), &c.members)?;

        self.ctx.pop_scope();

        let class_ty = Type::Class(ClassType {
            name: c.name.name.clone(),
            type_args: params.iter().map(|(_, var)| var.clone()).collect(),
            superclass,
            traits,
            members,
        });
        self.constructors.insert(c.name.name.clone(), ctor_params);
        self.define_possibly_generic(&c.name.name, params, class_ty);
        Ok(())
    }

    fn collect_trait(&mut self, t: &TraitDecl) -> TypeCheckResult<()> {
        self.ctx.push_scope();
        let params = self.bind_type_params(&t.type_params)?;
        let super_traits = self.resolve_trait_list(&t.super_traits)?;

        let mut members = IndexMap::new();
        for member in &t.members {
            let (name, sig, span) = match member {
                TraitMember::Method(m) => (
                    m.name.name.clone(),
                    self.resolve_function_signature(m)?,
                    m.span,
                ),
                TraitMember::AbstractMethod {
                    name,
                    params,
                    return_annotation,
                    span,
                } => {
                    let mut sig_params = Vec::new();
                    for p in params {
                        let Some(annotation) = &p.annotation else {
                            return err(
                                TypeError::MissingAnnotation(p.name.name.clone()),
                                p.span,
                            );
                        };
                        sig_params.push(self.resolve_type(annotation)?);
                    }
                    let ret = match return_annotation {
                        Some(annotation) => self.resolve_type(annotation)?,
                        None => self.fresh_var("R"),
                    };
                    (name.name.clone(), FunctionType::new(sig_params, ret), *span)
                }
            };
            if members.insert(name.clone(), Type::Function(sig)).is_some() {
                return err(TypeError::DuplicateDefinition(name), span);
            }
        }

        self.ctx.pop_scope();

        let trait_ty = Type::Trait(TraitType {
            name: t.name.name.clone(),
            type_args: params.iter().map(|(_, var)| var.clone()).collect(),
            super_traits,
            members,
        });
        self.define_possibly_generic(&t.name.name, params, trait_ty);
        Ok(())
    }

    fn collect_object(&mut self, o: &ObjectDecl) -> TypeCheckResult<()> {
        let superclass = o
            .superclass
            .as_ref()
            .map(|s| self.resolve_superclass(s))
            .transpose()?
            .map(Box::new);
        let traits = self.resolve_trait_list(&o.traits)?;
        let (members, _) = self.collect_body_members(None, &o.members)?;

        self.ctx.define_global(
            o.name.name.clone(),
            Type::Object(ObjectType {
                name: o.name.name.clone(),
                superclass,
                traits,
                members,
            }),
        );
        Ok(())
    }

    fn collect_extension(&mut self, e: &ExtensionDecl) -> TypeCheckResult<()> {
        let target = self.resolve_type(&e.target)?;
        let key = type_key(&target);

        let mut methods = IndexMap::new();
        for m in &e.methods {
            let sig = self.resolve_function_signature(m)?;
            if methods.insert(m.name.name.clone(), sig).is_some() {
                return err(TypeError::DuplicateDefinition(m.name.name.clone()), m.span);
            }
        }

        self.extensions.insert(key, methods);
        Ok(())
    }

    fn define_possibly_generic(
        &mut self,
        name: &str,
        params: Vec<(TypeParamDef, Type)>,
        base: Type,
    ) {
        if params.is_empty() {
            self.ctx.define_global(name.to_string(), base);
        } else {
            let defs: Vec<TypeParamDef> = params.into_iter().map(|(def, _)| def).collect();
            self.subtype
                .register(name.to_string(), defs.iter().map(|d| d.variance).collect());
            self.ctx.define_global(
                name.to_string(),
                Type::Generic(GenericDef {
                    name: name.to_string(),
                    params: defs,
                    base: Box::new(base),
                }),
            );
        }
    }

    // ========== Check pass ==========

    fn check_decl(&mut self, decl: &mut Decl) -> TypeCheckResult<()> {
        match decl {
            Decl::Function(f) => self.check_function(f),
            Decl::Class(c) => self.check_class(c),
            Decl::Trait(t) => self.check_trait(t),
            Decl::Object(o) => self.check_object(o),
            Decl::Extension(e) => self.check_extension(e),
        }
    }

    fn check_function(&mut self, f: &mut FunctionDecl) -> TypeCheckResult<()> {
        self.ctx.push_scope();
        self.bind_type_params(&f.type_params)?;

        for p in &mut f.params {
            let Some(annotation) = p.annotation.clone() else {
                return err(TypeError::MissingAnnotation(p.name.name.clone()), p.span);
            };
            let ty = self.resolve_type(&annotation)?;
            if let Some(default) = &mut p.default {
                let default_ty = self.infer_expr(default)?;
                if !self.compatible(&default_ty, &ty) {
                    return err(
                        TypeError::Mismatch {
                            expected: ty,
                            found: default_ty,
                        },
                        p.span,
                    );
                }
            }
            let refreshed = self.refresh(&ty);
            self.ctx.define(p.name.name.clone(), refreshed);
        }

        let declared = f
            .return_annotation
            .clone()
            .map(|a| self.resolve_type(&a))
            .transpose()?;

        let saved = self.current_return.take();
        self.current_return = declared.clone();

        let body_ty = self.infer_block(&mut f.body)?;

        if let Some(declared) = &declared {
            if *declared != Type::Unit && !self.compatible(&body_ty, declared) {
                return err(
                    TypeError::Mismatch {
                        expected: declared.clone(),
                        found: body_ty,
                    },
                    f.body.span,
                );
            }
        }

        self.current_return = saved;
        self.ctx.pop_scope();
        Ok(())
    }

    /// Resolves the `this` type for a named declaration and binds its type
    /// parameters to the same variables the collected definition uses.
    fn bind_this_type(
        &mut self,
        name: &str,
        type_params: &[TypeParam],
        span: Span,
    ) -> TypeCheckResult<Type> {
        match self.ctx.lookup_global(name).cloned() {
            Some(Type::Generic(def)) => {
                let vars = match def.base.as_ref() {
                    Type::Class(c) => c.type_args.clone(),
                    Type::Trait(t) => t.type_args.clone(),
                    _ => Vec::new(),
                };
                for (tp, var) in type_params.iter().zip(&vars) {
                    self.ctx.define(tp.name.name.clone(), var.clone());
                }
                Ok((*def.base).clone())
            }
            Some(ty) => Ok(ty),
            None => err(TypeError::Undefined(name.to_string()), span),
        }
    }

    /// Brings every member of `this` into scope, so member bodies can
    /// reference their siblings and constructor state by bare name.
    fn bind_members_of(&mut self, this_ty: &Type) {
        if let Some(members) = this_ty.members() {
            let bindings: Vec<(String, Type)> = members
                .iter()
                .map(|(n, t)| (n.clone(), t.clone()))
                .collect();
            for (name, ty) in bindings {
                self.ctx.define(name, ty);
            }
        }
    }

    fn check_field(
        &mut self,
        name: &Ident,
        annotation: &Option<TypeExpr>,
        init: &mut Option<Expr>,
        span: Span,
    ) -> TypeCheckResult<()> {
        let Some(annotation) = annotation.clone() else {
            return err(TypeError::MissingAnnotation(name.name.clone()), span);
        };
        let declared = self.resolve_type(&annotation)?;
        if let Some(init) = init {
            let init_ty = self.infer_expr(init)?;
            if !self.compatible(&init_ty, &declared) {
                return err(
                    TypeError::Mismatch {
                        expected: declared,
                        found: init_ty,
                    },
                    span,
                );
            }
        }
        Ok(())
    }

    fn check_class(&mut self, c: &mut ClassDecl) -> TypeCheckResult<()> {
        self.ctx.push_scope();
        let this_ty = self.bind_this_type(&c.name.name, &c.type_params, c.span)?;
        self.bind_members_of(&this_ty);
        self.ctx.push_this(this_ty);

        if let Some(ctor) = &mut c.constructor {
            for p in &mut ctor.params {
                if let Some(default) = &mut p.default {
                    self.infer_expr(default)?;
                }
            }
            if let Some(body) = &mut ctor.body {
                self.infer_block(body)?;
            }
        }

        for member in &mut c.members {
            match member {
                ClassMember::Method(m) => self.check_function(m)?,
                ClassMember::Field {
                    name,
                    annotation,
                    init,
                    span,
                    ..
                } => {
                    let name = name.clone();
                    let annotation = annotation.clone();
                    let span = *span;
                    self.check_field(&name, &annotation, init, span)?;
                }
            }
        }

        self.ctx.pop_this();
        self.ctx.pop_scope();
        Ok(())
    }

    fn check_trait(&mut self, t: &mut TraitDecl) -> TypeCheckResult<()> {
        self.ctx.push_scope();
        let this_ty = self.bind_this_type(&t.name.name, &t.type_params, t.span)?;
        self.bind_members_of(&this_ty);
        self.ctx.push_this(this_ty);

        for member in &mut t.members {
            if let TraitMember::Method(m) = member {
                self.check_function(m)?;
            }
        }

        self.ctx.pop_this();
        self.ctx.pop_scope();
        Ok(())
    }

    fn check_object(&mut self, o: &mut ObjectDecl) -> TypeCheckResult<()> {
        self.ctx.push_scope();
        let this_ty = self.bind_this_type(&o.name.name, &[], o.span)?;
        self.bind_members_of(&this_ty);
        self.ctx.push_this(this_ty);

        for member in &mut o.members {
            match member {
                ClassMember::Method(m) => self.check_function(m)?,
                ClassMember::Field {
                    name,
                    annotation,
                    init,
                    span,
                    ..
                } => {
                    let name = name.clone();
                    let annotation = annotation.clone();
                    let span = *span;
                    self.check_field(&name, &annotation, init, span)?;
                }
            }
        }

        self.ctx.pop_this();
        self.ctx.pop_scope();
        Ok(())
    }

    fn check_extension(&mut self, e: &mut ExtensionDecl) -> TypeCheckResult<()> {
        self.ctx.push_scope();
        let target = e.target.clone();
        let target_ty = self.resolve_type(&target)?;
        self.ctx.push_this(target_ty);
        for m in &mut e.methods {
            self.check_function(m)?;
        }
        self.ctx.pop_this();
        self.ctx.pop_scope();
        Ok(())
    }

    // ========== Inference ==========

    fn infer_block(&mut self, block: &mut Block) -> TypeCheckResult<Type> {
        self.ctx.push_scope();
        let mut last = Type::Unit;
        for stmt in &mut block.stmts {
            last = self.infer_stmt(stmt)?;
        }
        self.ctx.pop_scope();
        Ok(last)
    }

    fn infer_stmt(&mut self, stmt: &mut Stmt) -> TypeCheckResult<Type> {
        match &mut stmt.kind {
            StmtKind::Expr(expr) => self.infer_expr(expr),

            StmtKind::VarDecl {
                name,
                annotation,
                init,
                ..
            } => {
                let declared = annotation
                    .clone()
                    .map(|a| self.resolve_type(&a))
                    .transpose()?;
                let init_ty = match init {
                    Some(init) => Some(self.infer_expr(init)?),
                    None => None,
                };

                let bound = match (declared, init_ty) {
                    (Some(declared), Some(init_ty)) => {
                        if !self.compatible(&init_ty, &declared) {
                            return err(
                                TypeError::Mismatch {
                                    expected: declared,
                                    found: init_ty,
                                },
                                stmt.span,
                            );
                        }
                        declared
                    }
                    (Some(declared), None) => declared,
                    (None, Some(init_ty)) => init_ty,
                    (None, None) => {
                        return err(
                            TypeError::MissingAnnotation(name.name.clone()),
                            stmt.span,
                        )
                    }
                };

                self.ctx.define(name.name.clone(), bound);
                Ok(Type::Unit)
            }

            StmtKind::Return(value) => {
                let ty = match value {
                    Some(value) => self.infer_expr(value)?,
                    None => Type::Unit,
                };
                if let Some(expected) = self.current_return.clone() {
                    if expected != Type::Unit && !self.compatible(&ty, &expected) {
                        return err(TypeError::Mismatch { expected, found: ty }, stmt.span);
                    }
                }
                Ok(ty)
            }
        }
    }

    /// Infers an expression's type and fills its inferred-type slot.
    pub(crate) fn infer_expr(&mut self, expr: &mut Expr) -> TypeCheckResult<Type> {
        let span = expr.span;
        let ty = match &mut expr.kind {
            ExprKind::Literal(lit) => Ok(match lit {
                Literal::Int(_) => Type::Int,
                Literal::Double(_) => Type::Double,
                Literal::Str(_) => Type::Str,
                Literal::Bool(_) => Type::Bool,
                Literal::Null => Type::Null,
            }),

            ExprKind::Ident(ident) => match self.ctx.lookup(&ident.name) {
                Some(ty) => Ok(ty.clone()),
                None => err(TypeError::Undefined(ident.name.clone()), span),
            },

            ExprKind::This => match self.ctx.this_type() {
                Some(ty) => Ok(ty.clone()),
                None => err(TypeError::NoThis, span),
            },

            ExprKind::Binary { op, left, right } => {
                let op = *op;
                let left_ty = self.infer_expr(left)?;
                let right_ty = self.infer_expr(right)?;
                self.infer_binary(op, &left_ty, &right_ty, span)
            }

            ExprKind::Unary { op, operand } => {
                let op = *op;
                let operand_ty = self.infer_expr(operand)?;
                let ok = match op {
                    UnaryOp::Not => operand_ty == Type::Bool,
                    UnaryOp::Neg | UnaryOp::Pos => operand_ty.is_numeric(),
                };
                if ok {
                    Ok(operand_ty)
                } else {
                    err(
                        TypeError::InvalidOperands {
                            op: op.as_str().to_string(),
                            left: operand_ty.clone(),
                            right: operand_ty,
                        },
                        span,
                    )
                }
            }

            ExprKind::MethodCall {
                receiver,
                method,
                args,
                ..
            } => {
                let method = method.clone();
                self.infer_method_call(receiver.as_deref_mut(), &method, args, span)
            }

            ExprKind::FieldAccess { object, field } => {
                let field = field.clone();
                let object_ty = self.infer_expr(object)?;
                let refreshed = self.refresh(&object_ty);
                match refreshed.member(&field.name) {
                    Some(ty) => Ok(ty.clone()),
                    None => err(
                        TypeError::NoSuchMember {
                            ty: refreshed,
                            member: field.name.clone(),
                        },
                        span,
                    ),
                }
            }

            ExprKind::Assign { target, value } => {
                let target_ty = self.infer_expr(target)?;
                let value_ty = self.infer_expr(value)?;
                if !self.compatible(&value_ty, &target_ty) {
                    return err(
                        TypeError::Mismatch {
                            expected: target_ty,
                            found: value_ty,
                        },
                        span,
                    );
                }
                Ok(Type::Unit)
            }

            ExprKind::Block(block) => self.infer_block(block),

            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond_ty = self.infer_expr(condition)?;
                if cond_ty != Type::Bool {
                    return err(TypeError::NonBooleanCondition(cond_ty), condition.span);
                }
                let then_ty = self.infer_expr(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let else_ty = self.infer_expr(else_branch)?;
                        let then_ty = self.refresh(&then_ty);
                        let else_ty = self.refresh(&else_ty);
                        match self.subtype.unify(&then_ty, &else_ty) {
                            Some(ty) => Ok(ty),
                            None => err(TypeError::CannotUnify(then_ty, else_ty), span),
                        }
                    }
                    None => Ok(Type::Unit),
                }
            }

            ExprKind::While { condition, body } => {
                let cond_ty = self.infer_expr(condition)?;
                if cond_ty != Type::Bool {
                    return err(TypeError::NonBooleanCondition(cond_ty), condition.span);
                }
                self.infer_expr(body)?;
                Ok(Type::Unit)
            }

            ExprKind::ListLiteral(elements) => {
                if elements.is_empty() {
                    let elem = self.fresh_var("E");
                    Ok(Type::List(Box::new(elem)))
                } else {
                    let mut elem_ty = self.infer_expr(&mut elements[0])?;
                    for i in 1..elements.len() {
                        let next = self.infer_expr(&mut elements[i])?;
                        let elem_span = elements[i].span;
                        let unified = self
                            .subtype
                            .unify(&self.refresh(&elem_ty), &self.refresh(&next));
                        elem_ty = match unified {
                            Some(ty) => ty,
                            None => {
                                return err(TypeError::CannotUnify(elem_ty, next), elem_span)
                            }
                        };
                    }
                    Ok(Type::List(Box::new(elem_ty)))
                }
            }

            ExprKind::MapLiteral(entries) => {
                let mut key_ty: Option<Type> = None;
                let mut value_ty: Option<Type> = None;
                for (key, value) in entries.iter_mut() {
                    let k = self.infer_expr(key)?;
                    let v = self.infer_expr(value)?;
                    let key_span = key.span;
                    let value_span = value.span;
                    key_ty = Some(match key_ty {
                        None => k,
                        Some(prev) => {
                            match self.subtype.unify(&self.refresh(&prev), &self.refresh(&k)) {
                                Some(ty) => ty,
                                None => return err(TypeError::CannotUnify(prev, k), key_span),
                            }
                        }
                    });
                    value_ty = Some(match value_ty {
                        None => v,
                        Some(prev) => {
                            match self.subtype.unify(&self.refresh(&prev), &self.refresh(&v)) {
                                Some(ty) => ty,
                                None => return err(TypeError::CannotUnify(prev, v), value_span),
                            }
                        }
                    });
                }
                let key_ty = key_ty.expect("map literal has at least one entry");
                let value_ty = value_ty.expect("map literal has at least one entry");
                Ok(Type::Map(Box::new(key_ty), Box::new(value_ty)))
            }

            ExprKind::Lambda { params, body } => {
                self.ctx.push_scope();
                let mut param_tys = Vec::new();
                for p in params.iter() {
                    let ty = match &p.annotation {
                        Some(annotation) => self.resolve_type(annotation)?,
                        None => self.fresh_var(&p.name.name),
                    };
                    self.ctx.define(p.name.name.clone(), ty.clone());
                    param_tys.push(ty);
                }
                let body_ty = self.infer_expr(body)?;
                self.ctx.pop_scope();
                Ok(Type::Function(FunctionType::new(param_tys, body_ty)))
            }
        };
        let ty = ty?;
        expr.ty = Some(ty.clone());
        Ok(ty)
    }

    fn infer_binary(
        &mut self,
        op: BinaryOp,
        left: &Type,
        right: &Type,
        span: Span,
    ) -> TypeCheckResult<Type> {
        let invalid = || TypeError::InvalidOperands {
            op: op.as_str().to_string(),
            left: left.clone(),
            right: right.clone(),
        };

        if op.is_arithmetic() {
            // String concatenation wins for `+` when either side is a string.
            if op == BinaryOp::Add && (*left == Type::Str || *right == Type::Str) {
                return Ok(Type::Str);
            }
            return match (left, right) {
                (Type::Int, Type::Int) => Ok(Type::Int),
                (Type::Double, Type::Double)
                | (Type::Int, Type::Double)
                | (Type::Double, Type::Int) => Ok(Type::Double),
                _ => err(invalid(), span),
            };
        }

        if op.is_comparison() {
            // Operands must be mutually comparable: one side subsumes the
            // other.
            if self.compatible(left, right) || self.compatible(right, left) {
                return Ok(Type::Bool);
            }
            return err(invalid(), span);
        }

        // Logical operators.
        if *left == Type::Bool && *right == Type::Bool {
            Ok(Type::Bool)
        } else {
            err(invalid(), span)
        }
    }

    fn infer_method_call(
        &mut self,
        receiver: Option<&mut Expr>,
        method: &Ident,
        args: &mut Vec<Expr>,
        span: Span,
    ) -> TypeCheckResult<Type> {
        let Some(receiver) = receiver else {
            // Receiverless calls resolve the method name directly.
            let ty = match self.ctx.lookup(&method.name) {
                Some(ty) => ty.clone(),
                None => return err(TypeError::Undefined(method.name.clone()), span),
            };
            let Type::Function(sig) = ty else {
                return err(TypeError::NotCallable(ty), span);
            };
            return self.check_args(&sig, args, span);
        };

        let receiver_ty = self.infer_expr(receiver)?;

        if method.name == APPLY {
            return match receiver_ty {
                // First-class function application, or a direct call when
                // the receiver is a function-typed name.
                Type::Function(sig) => self.check_args(&sig, args, span),

                // A class name in call position is a constructor call.
                Type::Class(ref c) => {
                    let params = self.constructors.get(&c.name).cloned().unwrap_or_default();
                    let result = self.refresh(&receiver_ty);
                    let sig = FunctionType::new(params, result);
                    self.check_args(&sig, args, span)
                }
                Type::Generic(ref def) => {
                    let params = self
                        .constructors
                        .get(&def.name)
                        .cloned()
                        .unwrap_or_default();
                    let sig = FunctionType::new(params, (*def.base).clone());
                    self.check_args(&sig, args, span)
                }

                other => err(TypeError::NotCallable(other), span),
            };
        }

        let refreshed = self.refresh(&receiver_ty);

        if let Some(member_ty) = refreshed.member(&method.name).cloned() {
            let Type::Function(sig) = member_ty else {
                return err(TypeError::NotCallable(member_ty), span);
            };
            return self.check_args(&sig, args, span);
        }

        if let Some(sig) = builtin_member(&refreshed, &method.name) {
            return self.check_args(&sig, args, span);
        }

        if let Some(sig) = self
            .extensions
            .get(&type_key(&refreshed))
            .and_then(|methods| methods.get(&method.name))
            .cloned()
        {
            return self.check_args(&sig, args, span);
        }

        err(
            TypeError::NoSuchMember {
                ty: refreshed,
                member: method.name.clone(),
            },
            span,
        )
    }

    fn check_args(
        &mut self,
        sig: &FunctionType,
        args: &mut [Expr],
        span: Span,
    ) -> TypeCheckResult<Type> {
        if sig.params.len() != args.len() {
            return err(
                TypeError::WrongArity {
                    expected: sig.params.len(),
                    found: args.len(),
                },
                span,
            );
        }
        for (arg, param) in args.iter_mut().zip(&sig.params) {
            let arg_ty = self.infer_expr(arg)?;
            if !self.compatible(&arg_ty, param) {
                return err(
                    TypeError::Mismatch {
                        expected: param.clone(),
                        found: arg_ty,
                    },
                    arg.span,
                );
            }
        }
        Ok((*sig.ret).clone())
    }
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// The checker's output tables, consumed by the emitter to derive
/// descriptors and call-site lowerings.
#[derive(Clone, Debug, Default)]
pub struct ProgramTypes {
    /// Top-level function signatures by name.
    pub functions: HashMap<String, FunctionType>,
    /// Fully resolved named types (classes, traits, objects, generic
    /// definitions) by name.
    pub named: HashMap<String, Type>,
    /// Constructor parameter types by class name.
    pub constructors: HashMap<String, Vec<Type>>,
    /// Extension method signatures by target type name.
    pub extensions: HashMap<String, IndexMap<String, FunctionType>>,
}

impl TypeChecker {
    /// Consumes the checker after a successful check, yielding the tables
    /// the emitter lowers against.
    pub fn into_program_types(self) -> ProgramTypes {
        let mut functions = HashMap::new();
        let mut named = HashMap::new();
        for (name, ty) in self.ctx.globals() {
            match ty {
                Type::Function(sig) => {
                    functions.insert(name.clone(), sig.clone());
                }
                Type::Class(_) | Type::Trait(_) | Type::Object(_) | Type::Generic(_) => {
                    named.insert(name.clone(), ty.clone());
                }
                _ => {}
            }
        }
        ProgramTypes {
            functions,
            named,
            constructors: self.constructors,
            extensions: self.extensions,
        }
    }
}

/// The flat name a type is known by in the extension table and the
/// generated carrier class name.
pub fn type_key(ty: &Type) -> String {
    match ty {
        Type::Int => "Int".to_string(),
        Type::Double => "Double".to_string(),
        Type::Str => "String".to_string(),
        Type::Bool => "Boolean".to_string(),
        Type::Unit => "Unit".to_string(),
        Type::Any => "Any".to_string(),
        Type::Nothing => "Nothing".to_string(),
        Type::Null => "Null".to_string(),
        Type::List(_) => "List".to_string(),
        Type::Set(_) => "Set".to_string(),
        Type::Map(_, _) => "Map".to_string(),
        Type::Function(_) => "Function".to_string(),
        Type::Structural(_) => "Structural".to_string(),
        Type::Class(c) => c.name.clone(),
        Type::Trait(t) => t.name.clone(),
        Type::Object(o) => o.name.clone(),
        Type::Var(v) => v.name.clone(),
        Type::Generic(g) => g.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_lexer::Lexer;
    use sable_parser::Parser;

    fn check(source: &str) -> Result<Program, TypeCheckError> {
        let tokens = Lexer::new(source).tokenize().expect("lex");
        let mut program = Parser::new(tokens).parse().expect("parse");
        let mut checker = TypeChecker::new();
        checker.check(&mut program)?;
        Ok(program)
    }

    fn check_err(source: &str) -> TypeError {
        check(source).unwrap_err().error
    }

    fn body_ty(program: &Program, decl: usize) -> Option<Type> {
        let Decl::Function(f) = &program.decls[decl] else {
            panic!("expected function");
        };
        match &f.body.stmts.last().unwrap().kind {
            StmtKind::Expr(e) => e.ty.clone(),
            _ => None,
        }
    }

    #[test]
    fn test_simple_function() {
        let program = check("fun add(x: Int, y: Int): Int { x + y }").unwrap();
        assert_eq!(body_ty(&program, 0), Some(Type::Int));
    }

    #[test]
    fn test_recursion() {
        check("fun factorial(n: Int): Int { if (n <= 1) { 1 } else { n * factorial(n - 1) } }")
            .unwrap();
    }

    #[test]
    fn test_mixed_arithmetic_widens() {
        let program = check("fun f(x: Int, y: Double): Double { x * y }").unwrap();
        assert_eq!(body_ty(&program, 0), Some(Type::Double));
    }

    #[test]
    fn test_string_concat() {
        check("fun greet(name: String): String { \"hello \" + name }").unwrap();
        check("fun show(n: Int): String { \"n = \" + n }").unwrap();
    }

    #[test]
    fn test_undefined_variable() {
        let e = check_err("fun broken(x: Int): Int { undefined_variable + x }");
        assert!(matches!(e, TypeError::Undefined(name) if name == "undefined_variable"));
    }

    #[test]
    fn test_non_boolean_condition() {
        let e = check_err("fun f(x: Int): Int { if (x) { 1 } else { 2 } }");
        assert!(matches!(e, TypeError::NonBooleanCondition(Type::Int)));
    }

    #[test]
    fn test_arity_mismatch() {
        let e = check_err("fun g(x: Int): Int { x } fun f(): Int { g(1, 2) }");
        assert!(matches!(
            e,
            TypeError::WrongArity {
                expected: 1,
                found: 2
            }
        ));
    }

    #[test]
    fn test_argument_subtyping() {
        let e = check_err("fun g(x: Int): Int { x } fun f(): Int { g(\"no\") }");
        assert!(matches!(e, TypeError::Mismatch { .. }));
    }

    #[test]
    fn test_missing_parameter_annotation() {
        let e = check_err("fun f(x): Int { 1 }");
        assert!(matches!(e, TypeError::MissingAnnotation(name) if name == "x"));
    }

    #[test]
    fn test_unknown_type() {
        let e = check_err("fun f(x: Whatever): Int { 1 }");
        assert!(matches!(e, TypeError::UnknownType(name) if name == "Whatever"));
    }

    #[test]
    fn test_duplicate_top_level() {
        let e = check_err("fun f(): Int { 1 } class f");
        assert!(matches!(e, TypeError::DuplicateDefinition(name) if name == "f"));
    }

    #[test]
    fn test_class_members_and_this() {
        check(
            "class Point(x: Int, y: Int) {\
               fun getX(): Int { x }\
               fun getY(): Int { this.y }\
               fun sum(): Int { getX() + y }\
             }",
        )
        .unwrap();
    }

    #[test]
    fn test_object_members() {
        check(
            "object Math { fun pi(): Double { 3.14159 } fun square(x: Int): Int { x * x } }\
             fun area(r: Int): Double { Math.pi() * Math.square(r) }",
        )
        .unwrap();
    }

    #[test]
    fn test_extension_on_int() {
        check(
            "extension Int { fun isEven(): Boolean { this % 2 == 0 } fun double(): Int { this * 2 } }\
             fun f(n: Int): Boolean { n.isEven() }",
        )
        .unwrap();
    }

    #[test]
    fn test_higher_order_function() {
        check(
            "fun twice(f: Int => Int, x: Int): Int { f(f(x)) }\
             fun main(): Int { twice((x: Int) => x * 2, 3) }",
        )
        .unwrap();
    }

    #[test]
    fn test_lambda_wrong_shape_rejected() {
        let e = check_err(
            "fun twice(f: Int => Int, x: Int): Int { f(f(x)) }\
             fun main(): Int { twice((x: Boolean) => x, 3) }",
        );
        assert!(matches!(e, TypeError::Mismatch { .. }));
    }

    #[test]
    fn test_constructor_call() {
        check(
            "class Point(x: Int, y: Int) { fun getX(): Int { x } }\
             fun f(): Int { Point(10, 20).getX() }",
        )
        .unwrap();
    }

    #[test]
    fn test_constructor_arity_checked() {
        let e = check_err("class Point(x: Int, y: Int) fun f(): Point { Point(1) }");
        assert!(matches!(e, TypeError::WrongArity { .. }));
    }

    #[test]
    fn test_forward_reference() {
        check(
            "fun mk(): Point { Point(1, 2) }\
             class Point(x: Int, y: Int) { fun getX(): Int { x } }\
             fun consume(): Int { mk().getX() }",
        )
        .unwrap();
    }

    #[test]
    fn test_structural_parameter() {
        check(
            "class Dog(name: String) { fun speak(): String { name } }\
             fun describe(x: { name: String }): String { x.name }\
             fun f(): String { describe(Dog(\"rex\")) }",
        )
        .unwrap();
    }

    #[test]
    fn test_structural_rejects_missing_member() {
        let e = check_err(
            "class Cat(lives: Int)\
             fun describe(x: { name: String }): String { x.name }\
             fun f(): String { describe(Cat(9)) }",
        );
        assert!(matches!(e, TypeError::Mismatch { .. }));
    }

    #[test]
    fn test_trait_subtyping_through_with() {
        check(
            "trait Named { def name(): String }\
             class Dog(n: String) with Named { fun name(): String { n } }\
             fun label(x: Named): String { x.name() }\
             fun f(): String { label(Dog(\"rex\")) }",
        )
        .unwrap();
    }

    #[test]
    fn test_superclass_must_be_class() {
        let e = check_err("trait T class C extends T");
        assert!(matches!(e, TypeError::NotAClass(_)));
    }

    #[test]
    fn test_empty_list_gets_type_variable() {
        let program = check("fun f(): List<Int> { [] }").unwrap();
        assert!(matches!(
            body_ty(&program, 0),
            Some(Type::List(ref elem)) if matches!(**elem, Type::Var(_))
        ));
    }

    #[test]
    fn test_list_literal_unifies_elements() {
        let program = check("fun f(): List<Any> { [1, 2, 3] }").unwrap();
        assert_eq!(
            body_ty(&program, 0),
            Some(Type::List(Box::new(Type::Int)))
        );
        let e = check_err("fun g(): List<Any> { [1, \"two\"] }");
        assert!(matches!(e, TypeError::CannotUnify(_, _)));
    }

    #[test]
    fn test_builtin_list_and_string_ops() {
        check(
            "fun f(xs: List<Int>): Int { xs.add(4) xs.size() + xs.get(0) }\
             fun g(s: String): String { s.substring(0, s.length()) }",
        )
        .unwrap();
    }

    #[test]
    fn test_var_assignment() {
        check("fun f(): Int { var x = 1 x = x + 1 x }").unwrap();
    }

    #[test]
    fn test_assignment_type_mismatch() {
        let e = check_err("fun f(): Int { var x = 1 x = \"no\" x }");
        assert!(matches!(e, TypeError::Mismatch { .. }));
    }

    #[test]
    fn test_while_is_unit() {
        check("fun f(n: Int): Int { var i = 0 while (i < n) { i = i + 1 } i }").unwrap();
    }

    #[test]
    fn test_generic_class_instantiation() {
        check(
            "class Box<T>(value: T)\
             fun f(b: Box<Int>): Box<Int> { b }",
        )
        .unwrap();
    }

    #[test]
    fn test_generic_argument_count_checked() {
        let e = check_err("class Box<T>(value: T) fun f(b: Box<Int, Int>): Int { 1 }");
        assert!(matches!(e, TypeError::TypeArgumentCount { .. }));
    }

    #[test]
    fn test_println_builtin() {
        check("fun f(): Unit { println(\"hello\") println(42) }").unwrap();
    }

    #[test]
    fn test_return_statement() {
        check("fun f(n: Int): Int { if (n < 0) { return 0 } else { n } }").unwrap();
    }

    #[test]
    fn test_body_must_match_declared_return() {
        let e = check_err("fun f(): Int { \"no\" }");
        assert!(matches!(e, TypeError::Mismatch { .. }));
    }

    #[test]
    fn test_map_literal() {
        let program = check("fun f(): Map<String, Int> { [\"a\": 1, \"b\": 2] }").unwrap();
        assert_eq!(
            body_ty(&program, 0),
            Some(Type::Map(Box::new(Type::Str), Box::new(Type::Int)))
        );
    }
}
