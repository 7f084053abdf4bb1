//! Lowering declarations to class artifacts.
//!
//! One artifact per top-level entity: `name$` wrapper classes for
//! functions, plain classes, interfaces for traits, singletons for
//! objects, and `<Target>$Extension` carriers. All artifact bytes are
//! buffered in memory; nothing is released to the caller until every
//! declaration has been emitted, so a failing compile produces no output.

use crate::classfile::{
    ClassFile, CodeBuilder, VType, ACC_ABSTRACT, ACC_FINAL, ACC_INTERFACE, ACC_PRIVATE,
    ACC_PUBLIC, ACC_STATIC, ACC_SUPER,
};
use crate::descriptor::{field_descriptor, method_descriptor, vtype_for};
use crate::error::{EmitError, EmitResult};
use indexmap::IndexMap;
use sable_ast::*;
use sable_lexer::SourceMap;
use sable_typeck::ProgramTypes;
use sable_types::{FunctionType, Type};
use std::collections::{HashMap, HashSet};

pub(crate) const OBJECT: &str = "java/lang/Object";

/// A generated class: its simple name and the class-file bytes.
#[derive(Clone, Debug)]
pub struct ClassArtifact {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ClassArtifact {
    /// The file name this artifact is written under.
    pub fn file_name(&self) -> String {
        format!("{}.class", self.name)
    }
}

/// Everything the expression lowerer needs to know about a generated
/// class.
#[derive(Clone, Debug)]
pub(crate) struct ClassInfo {
    pub superclass: String,
    pub interfaces: Vec<String>,
    pub ctor_params: Vec<(String, Type)>,
    pub fields: IndexMap<String, (Type, bool)>,
    pub methods: IndexMap<String, FunctionType>,
    pub is_object: bool,
    pub is_interface: bool,
}

/// The class currently being built, with its synthetic-member counter.
pub(crate) struct ClassCtx {
    pub file: ClassFile,
    pub name: String,
    pub lambda_count: u32,
}

/// How `this` resolves in the method being emitted.
#[derive(Clone, Debug)]
pub(crate) enum ThisBinding {
    /// An instance method: slot 0 holds the receiver object.
    Instance {
        owner: String,
        ty: Type,
        interface: bool,
    },
    /// An extension method: slot 0 holds the receiver value, possibly a
    /// primitive.
    Receiver { ty: Type },
}

#[derive(Clone, Debug)]
pub(crate) struct LocalVar {
    pub slot: u16,
    pub ty: Type,
}

/// Per-method emission state: the assembler, scoped locals, the declared
/// return type, and the `this` binding.
pub(crate) struct MethodCtx {
    pub code: CodeBuilder,
    pub scopes: Vec<HashMap<String, LocalVar>>,
    pub ret: Type,
    pub this: Option<ThisBinding>,
    /// Lambda bodies may only read their parameters and global entities.
    pub in_lambda: bool,
}

impl MethodCtx {
    pub fn lookup(&self, name: &str) -> Option<&LocalVar> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn define(&mut self, name: impl Into<String>, var: LocalVar) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), var);
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }
}

/// The Sable code emitter. Construct one per program: its signature and
/// class tables are scoped to a single compile.
pub struct Emitter<'a> {
    pub(crate) source_map: &'a SourceMap,
    pub(crate) types: &'a ProgramTypes,
    pub(crate) signatures: HashMap<String, FunctionType>,
    /// Functions declared by this program, as opposed to built-ins that
    /// also live in the signature table.
    pub(crate) declared_functions: HashSet<String>,
    pub(crate) classes: HashMap<String, ClassInfo>,
    pub(crate) extensions: HashMap<String, IndexMap<String, FunctionType>>,
    artifacts: Vec<ClassArtifact>,
}

impl<'a> Emitter<'a> {
    pub fn new(source_map: &'a SourceMap, types: &'a ProgramTypes) -> Self {
        Self {
            source_map,
            types,
            signatures: types.functions.clone(),
            declared_functions: HashSet::new(),
            classes: HashMap::new(),
            extensions: types.extensions.clone(),
            artifacts: Vec::new(),
        }
    }

    /// Emits a type-checked program. Returns every class artifact, or the
    /// first compile error; on error no artifact is produced.
    pub fn emit_program(mut self, program: &Program) -> EmitResult<Vec<ClassArtifact>> {
        // Record every top-level signature and class shape before any body
        // is lowered, so call sites can be resolved regardless of source
        // order.
        for decl in &program.decls {
            self.collect_decl(decl)?;
        }

        for decl in &program.decls {
            match decl {
                Decl::Function(f) => self.emit_function_decl(f)?,
                Decl::Class(c) => self.emit_class_decl(c)?,
                Decl::Trait(t) => self.emit_trait_decl(t)?,
                Decl::Object(o) => self.emit_object_decl(o)?,
                Decl::Extension(e) => self.emit_extension_decl(e)?,
            }
        }

        Ok(self.artifacts)
    }

    fn collect_decl(&mut self, decl: &Decl) -> EmitResult<()> {
        match decl {
            Decl::Function(f) => {
                self.declared_functions.insert(f.name.name.clone());
                Ok(())
            }
            Decl::Extension(_) => Ok(()),

            Decl::Class(c) => {
                let info = self.class_info_from(&c.name.name, false)?;
                self.classes.insert(c.name.name.clone(), info);
                Ok(())
            }
            Decl::Object(o) => {
                let info = self.class_info_from(&o.name.name, true)?;
                self.classes.insert(o.name.name.clone(), info);
                Ok(())
            }
            Decl::Trait(t) => {
                let Some(ty) = self.types.named.get(&t.name.name) else {
                    return Err(EmitError::UnresolvedType { span: t.span });
                };
                let trait_ty = match ty {
                    Type::Generic(def) => def.base.as_ref().clone(),
                    other => other.clone(),
                };
                let Type::Trait(trait_ty) = trait_ty else {
                    return Err(EmitError::UnresolvedType { span: t.span });
                };
                let mut methods = IndexMap::new();
                for (name, member) in &trait_ty.members {
                    if let Type::Function(sig) = member {
                        methods.insert(name.clone(), sig.clone());
                    }
                }
                self.classes.insert(
                    t.name.name.clone(),
                    ClassInfo {
                        superclass: OBJECT.to_string(),
                        interfaces: trait_ty
                            .super_traits
                            .iter()
                            .filter_map(|s| s.name().map(str::to_string))
                            .collect(),
                        ctor_params: Vec::new(),
                        fields: IndexMap::new(),
                        methods,
                        is_object: false,
                        is_interface: true,
                    },
                );
                Ok(())
            }
        }
    }

    fn class_info_from(&self, name: &str, is_object: bool) -> EmitResult<ClassInfo> {
        let Some(ty) = self.types.named.get(name) else {
            return Err(EmitError::UndefinedVariable {
                name: name.to_string(),
                span: sable_lexer::Span::dummy(),
            });
        };
        let ty = match ty {
            Type::Generic(def) => def.base.as_ref().clone(),
            other => other.clone(),
        };
        let (superclass, interfaces, members) = match &ty {
            Type::Class(c) => (
                c.superclass
                    .as_deref()
                    .and_then(|s| s.name().map(str::to_string))
                    .unwrap_or_else(|| OBJECT.to_string()),
                c.traits
                    .iter()
                    .filter_map(|t| t.name().map(str::to_string))
                    .collect::<Vec<_>>(),
                &c.members,
            ),
            Type::Object(o) => (
                o.superclass
                    .as_deref()
                    .and_then(|s| s.name().map(str::to_string))
                    .unwrap_or_else(|| OBJECT.to_string()),
                o.traits
                    .iter()
                    .filter_map(|t| t.name().map(str::to_string))
                    .collect::<Vec<_>>(),
                &o.members,
            ),
            _ => {
                return Err(EmitError::UndefinedVariable {
                    name: name.to_string(),
                    span: sable_lexer::Span::dummy(),
                })
            }
        };

        let ctor_param_types = self.types.constructors.get(name).cloned().unwrap_or_default();
        let ctor_names: Vec<String> = members
            .keys()
            .take(ctor_param_types.len())
            .cloned()
            .collect();
        let ctor_params: Vec<(String, Type)> =
            ctor_names.into_iter().zip(ctor_param_types).collect();

        let mut fields = IndexMap::new();
        let mut methods = IndexMap::new();
        for (member_name, member_ty) in members.iter().skip(ctor_params.len()) {
            match member_ty {
                Type::Function(sig) => {
                    methods.insert(member_name.clone(), sig.clone());
                }
                other => {
                    fields.insert(member_name.clone(), (other.clone(), false));
                }
            }
        }

        Ok(ClassInfo {
            superclass,
            interfaces,
            ctor_params,
            fields,
            methods,
            is_object,
            is_interface: false,
        })
    }

    pub(crate) fn finish_class(&mut self, class: ClassCtx) {
        self.artifacts.push(ClassArtifact {
            name: class.name.clone(),
            bytes: class.file.to_bytes(),
        });
    }

    // ========== Declarations ==========

    /// A top-level function compiles to a `name$` wrapper class holding a
    /// single public static method.
    fn emit_function_decl(&mut self, f: &FunctionDecl) -> EmitResult<()> {
        let sig = self
            .signatures
            .get(&f.name.name)
            .cloned()
            .ok_or(EmitError::UnresolvedType { span: f.span })?;

        let class_name = format!("{}$", f.name.name);
        let mut class = ClassCtx {
            file: ClassFile::new(ACC_PUBLIC | ACC_FINAL | ACC_SUPER, &class_name, OBJECT),
            name: class_name,
            lambda_count: 0,
        };
        class.file.set_source_file(self.source_map.file());

        let code = self.compile_method(&mut class, f, &sig, None, true)?;
        class.file.add_method(
            ACC_PUBLIC | ACC_STATIC,
            &f.name.name,
            &method_descriptor(&sig.params, &sig.ret),
            code,
        );

        self.finish_class(class);
        Ok(())
    }

    fn emit_class_decl(&mut self, c: &ClassDecl) -> EmitResult<()> {
        let info = self.classes.get(&c.name.name).cloned().ok_or(
            EmitError::UnresolvedType { span: c.span },
        )?;

        let mut class = ClassCtx {
            file: ClassFile::new(
                ACC_PUBLIC | ACC_SUPER,
                &c.name.name,
                &info.superclass,
            ),
            name: c.name.name.clone(),
            lambda_count: 0,
        };
        class.file.set_source_file(self.source_map.file());
        for interface in &info.interfaces {
            class.file.add_interface(interface);
        }

        // Constructor parameters become private final fields; declared
        // fields follow their mutability.
        for (name, ty) in &info.ctor_params {
            class
                .file
                .add_field(ACC_PRIVATE | ACC_FINAL, name, &field_descriptor(ty));
        }
        for member in &c.members {
            if let ClassMember::Field { name, mutable, .. } = member {
                let (ty, _) = info.fields.get(&name.name).cloned().ok_or(
                    EmitError::UnresolvedType { span: member.span() },
                )?;
                let access = if *mutable {
                    ACC_PRIVATE
                } else {
                    ACC_PRIVATE | ACC_FINAL
                };
                class.file.add_field(access, &name.name, &field_descriptor(&ty));
            }
        }

        self.emit_constructor(&mut class, c, &info)?;

        let this = ThisBinding::Instance {
            owner: c.name.name.clone(),
            ty: self.named_type(&c.name.name),
            interface: false,
        };
        for member in &c.members {
            if let ClassMember::Method(m) = member {
                let sig = info.methods.get(&m.name.name).cloned().ok_or(
                    EmitError::UnresolvedType { span: m.span },
                )?;
                let code = self.compile_method(&mut class, m, &sig, Some(this.clone()), false)?;
                class.file.add_method(
                    ACC_PUBLIC,
                    &m.name.name,
                    &method_descriptor(&sig.params, &sig.ret),
                    code,
                );
            }
        }

        self.finish_class(class);
        Ok(())
    }

    /// Emits `<init>`: the superclass constructor call, constructor
    /// parameter stores, field initialisers, then the optional body.
    fn emit_constructor(
        &mut self,
        class: &mut ClassCtx,
        c: &ClassDecl,
        info: &ClassInfo,
    ) -> EmitResult<()> {
        let param_types: Vec<Type> = info.ctor_params.iter().map(|(_, t)| t.clone()).collect();
        let descriptor = method_descriptor(&param_types, &Type::Unit);

        let mut locals = vec![VType::UninitializedThis];
        for ty in &param_types {
            let vtype = vtype_for(ty);
            let wide = vtype == VType::Double;
            locals.push(vtype);
            if wide {
                locals.push(VType::Top);
            }
        }

        let mut method = MethodCtx {
            code: CodeBuilder::new(locals),
            scopes: vec![HashMap::new()],
            ret: Type::Unit,
            this: Some(ThisBinding::Instance {
                owner: c.name.name.clone(),
                ty: self.named_type(&c.name.name),
                interface: false,
            }),
            in_lambda: false,
        };
        let mut slot = 1u16;
        for (name, ty) in &info.ctor_params {
            method.define(name.clone(), LocalVar { slot, ty: ty.clone() });
            slot += if matches!(ty, Type::Double) { 2 } else { 1 };
        }

        method.code.aload(0);
        method
            .code
            .invokespecial(&mut class.file.pool, &info.superclass, "<init>", "()V");
        method
            .code
            .retype_local(0, VType::Object(c.name.name.clone()));

        let mut param_slot = 1u16;
        for (name, ty) in &info.ctor_params {
            method.code.aload(0);
            self.load_slot(&mut method, param_slot, ty);
            method
                .code
                .putfield(&mut class.file.pool, &c.name.name, name, &field_descriptor(ty));
            param_slot += if matches!(ty, Type::Double) { 2 } else { 1 };
        }

        for member in &c.members {
            if let ClassMember::Field { name, init: Some(init), .. } = member {
                let (ty, _) = info.fields.get(&name.name).cloned().ok_or(
                    EmitError::UnresolvedType { span: member.span() },
                )?;
                method.code.aload(0);
                let init_ty = self.emit_expr(class, &mut method, init)?;
                self.adapt(class, &mut method, &init_ty, &ty, init.span)?;
                method.code.putfield(
                    &mut class.file.pool,
                    &c.name.name,
                    &name.name,
                    &field_descriptor(&ty),
                );
            }
        }

        if let Some(ctor) = &c.constructor {
            if let Some(body) = &ctor.body {
                if let Some(ty) = self.emit_block(class, &mut method, body)? {
                    if ty != Type::Unit {
                        method.code.pop_value();
                    }
                }
            }
        }

        method.code.return_();
        class.file.add_method(ACC_PUBLIC, "<init>", &descriptor, method.code);
        Ok(())
    }

    /// A trait compiles to an interface: `def` signatures become abstract
    /// methods, `fun` bodies become default methods.
    fn emit_trait_decl(&mut self, t: &TraitDecl) -> EmitResult<()> {
        let info = self.classes.get(&t.name.name).cloned().ok_or(
            EmitError::UnresolvedType { span: t.span },
        )?;

        let mut class = ClassCtx {
            file: ClassFile::new(
                ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT,
                &t.name.name,
                OBJECT,
            ),
            name: t.name.name.clone(),
            lambda_count: 0,
        };
        class.file.set_source_file(self.source_map.file());
        for interface in &info.interfaces {
            class.file.add_interface(interface);
        }

        let this = ThisBinding::Instance {
            owner: t.name.name.clone(),
            ty: self.named_type(&t.name.name),
            interface: true,
        };
        for member in &t.members {
            match member {
                TraitMember::AbstractMethod { name, .. } => {
                    let sig = info.methods.get(&name.name).cloned().ok_or(
                        EmitError::UnresolvedType { span: member.span() },
                    )?;
                    class.file.add_abstract_method(
                        ACC_PUBLIC | ACC_ABSTRACT,
                        &name.name,
                        &method_descriptor(&sig.params, &sig.ret),
                    );
                }
                TraitMember::Method(m) => {
                    let sig = info.methods.get(&m.name.name).cloned().ok_or(
                        EmitError::UnresolvedType { span: m.span },
                    )?;
                    let code =
                        self.compile_method(&mut class, m, &sig, Some(this.clone()), false)?;
                    class.file.add_method(
                        ACC_PUBLIC,
                        &m.name.name,
                        &method_descriptor(&sig.params, &sig.ret),
                        code,
                    );
                }
            }
        }

        self.finish_class(class);
        Ok(())
    }

    /// An object compiles to a final class with a private constructor and
    /// a static `INSTANCE` initialised in `<clinit>`.
    fn emit_object_decl(&mut self, o: &ObjectDecl) -> EmitResult<()> {
        let info = self.classes.get(&o.name.name).cloned().ok_or(
            EmitError::UnresolvedType { span: o.span },
        )?;
        let self_descriptor = format!("L{};", o.name.name);

        let mut class = ClassCtx {
            file: ClassFile::new(
                ACC_PUBLIC | ACC_FINAL | ACC_SUPER,
                &o.name.name,
                &info.superclass,
            ),
            name: o.name.name.clone(),
            lambda_count: 0,
        };
        class.file.set_source_file(self.source_map.file());
        for interface in &info.interfaces {
            class.file.add_interface(interface);
        }

        class.file.add_field(
            ACC_PUBLIC | ACC_STATIC | ACC_FINAL,
            "INSTANCE",
            &self_descriptor,
        );
        for member in &o.members {
            if let ClassMember::Field { name, mutable, .. } = member {
                let (ty, _) = info.fields.get(&name.name).cloned().ok_or(
                    EmitError::UnresolvedType { span: member.span() },
                )?;
                let access = if *mutable {
                    ACC_PRIVATE
                } else {
                    ACC_PRIVATE | ACC_FINAL
                };
                class.file.add_field(access, &name.name, &field_descriptor(&ty));
            }
        }

        // Private constructor: super call plus field initialisers.
        let mut method = MethodCtx {
            code: CodeBuilder::new(vec![VType::UninitializedThis]),
            scopes: vec![HashMap::new()],
            ret: Type::Unit,
            this: Some(ThisBinding::Instance {
                owner: o.name.name.clone(),
                ty: self.named_type(&o.name.name),
                interface: false,
            }),
            in_lambda: false,
        };
        method.code.aload(0);
        method
            .code
            .invokespecial(&mut class.file.pool, &info.superclass, "<init>", "()V");
        method
            .code
            .retype_local(0, VType::Object(o.name.name.clone()));
        for member in &o.members {
            if let ClassMember::Field { name, init: Some(init), .. } = member {
                let (ty, _) = info.fields.get(&name.name).cloned().ok_or(
                    EmitError::UnresolvedType { span: member.span() },
                )?;
                method.code.aload(0);
                let init_ty = self.emit_expr(&mut class, &mut method, init)?;
                self.adapt(&mut class, &mut method, &init_ty, &ty, init.span)?;
                method.code.putfield(
                    &mut class.file.pool,
                    &o.name.name,
                    &name.name,
                    &field_descriptor(&ty),
                );
            }
        }
        method.code.return_();
        class.file.add_method(ACC_PRIVATE, "<init>", "()V", method.code);

        // Static initialiser: allocate, invoke the private constructor,
        // store the singleton.
        let mut clinit = CodeBuilder::new(vec![]);
        clinit.new_object(&mut class.file.pool, &o.name.name);
        clinit.dup();
        clinit.invokespecial(&mut class.file.pool, &o.name.name, "<init>", "()V");
        clinit.putstatic(&mut class.file.pool, &o.name.name, "INSTANCE", &self_descriptor);
        clinit.return_();
        class
            .file
            .add_method(ACC_STATIC, "<clinit>", "()V", clinit);

        let this = ThisBinding::Instance {
            owner: o.name.name.clone(),
            ty: self.named_type(&o.name.name),
            interface: false,
        };
        for member in &o.members {
            if let ClassMember::Method(m) = member {
                let sig = info.methods.get(&m.name.name).cloned().ok_or(
                    EmitError::UnresolvedType { span: m.span },
                )?;
                let code = self.compile_method(&mut class, m, &sig, Some(this.clone()), false)?;
                class.file.add_method(
                    ACC_PUBLIC,
                    &m.name.name,
                    &method_descriptor(&sig.params, &sig.ret),
                    code,
                );
            }
        }

        self.finish_class(class);
        Ok(())
    }

    /// An extension compiles to a final `<Target>$Extension` class of
    /// public static methods whose first parameter is the receiver.
    fn emit_extension_decl(&mut self, e: &ExtensionDecl) -> EmitResult<()> {
        let methods = self
            .extensions
            .get(&e.target_name)
            .cloned()
            .ok_or(EmitError::UnresolvedType { span: e.span })?;
        let target_ty = self.extension_target_type(&e.target_name);

        let class_name = format!("{}$Extension", e.target_name);
        let mut class = ClassCtx {
            file: ClassFile::new(ACC_PUBLIC | ACC_FINAL | ACC_SUPER, &class_name, OBJECT),
            name: class_name,
            lambda_count: 0,
        };
        class.file.set_source_file(self.source_map.file());

        for m in &e.methods {
            let sig = methods.get(&m.name.name).cloned().ok_or(
                EmitError::UnresolvedType { span: m.span },
            )?;

            let mut receiver_and_params = vec![target_ty.clone()];
            receiver_and_params.extend(sig.params.iter().cloned());
            let descriptor = method_descriptor(&receiver_and_params, &sig.ret);

            let mut locals = Vec::new();
            for ty in &receiver_and_params {
                let vtype = vtype_for(ty);
                let wide = vtype == VType::Double;
                locals.push(vtype);
                if wide {
                    locals.push(VType::Top);
                }
            }

            let mut method = MethodCtx {
                code: CodeBuilder::new(locals),
                scopes: vec![HashMap::new()],
                ret: sig.ret.as_ref().clone(),
                this: Some(ThisBinding::Receiver {
                    ty: target_ty.clone(),
                }),
                in_lambda: false,
            };
            let mut slot = if matches!(target_ty, Type::Double) { 2 } else { 1 };
            for (p, ty) in m.params.iter().zip(&sig.params) {
                method.define(
                    p.name.name.clone(),
                    LocalVar {
                        slot,
                        ty: ty.clone(),
                    },
                );
                slot += if matches!(ty, Type::Double) { 2 } else { 1 };
            }

            let body = self.emit_block(&mut class, &mut method, &m.body)?;
            self.finish_with_return(&mut class, &mut method, body, m.body.span)?;
            class
                .file
                .add_method(ACC_PUBLIC | ACC_STATIC, &m.name.name, &descriptor, method.code);
        }

        self.finish_class(class);
        Ok(())
    }

    /// Compiles a function or method body to a finished assembler.
    pub(crate) fn compile_method(
        &mut self,
        class: &mut ClassCtx,
        f: &FunctionDecl,
        sig: &FunctionType,
        this: Option<ThisBinding>,
        is_static: bool,
    ) -> EmitResult<CodeBuilder> {
        let mut locals = Vec::new();
        if !is_static {
            locals.push(VType::Object(class.name.clone()));
        }
        for ty in &sig.params {
            let vtype = vtype_for(ty);
            let wide = vtype == VType::Double;
            locals.push(vtype);
            if wide {
                locals.push(VType::Top);
            }
        }

        let mut method = MethodCtx {
            code: CodeBuilder::new(locals),
            scopes: vec![HashMap::new()],
            ret: sig.ret.as_ref().clone(),
            this,
            in_lambda: false,
        };

        let mut slot = if is_static { 0u16 } else { 1u16 };
        for (p, ty) in f.params.iter().zip(&sig.params) {
            method.define(
                p.name.name.clone(),
                LocalVar {
                    slot,
                    ty: ty.clone(),
                },
            );
            slot += if matches!(ty, Type::Double) { 2 } else { 1 };
        }

        let body = self.emit_block(class, &mut method, &f.body)?;
        self.finish_with_return(class, &mut method, body, f.body.span)?;
        Ok(method.code)
    }

    pub(crate) fn named_type(&self, name: &str) -> Type {
        // Member bodies only need the name for descriptor purposes; the
        // full member map lives in the class tables.
        Type::Class(sable_types::ClassType {
            name: name.to_string(),
            type_args: Vec::new(),
            superclass: None,
            traits: Vec::new(),
            members: IndexMap::new(),
        })
    }

    fn extension_target_type(&self, name: &str) -> Type {
        match name {
            "Int" => Type::Int,
            "Double" => Type::Double,
            "Boolean" => Type::Bool,
            "String" => Type::Str,
            "List" => Type::List(Box::new(Type::Any)),
            "Set" => Type::Set(Box::new(Type::Any)),
            "Map" => Type::Map(Box::new(Type::Any), Box::new(Type::Any)),
            other => self.named_type(other),
        }
    }

    /// Looks up a field (or constructor parameter) on a class, walking the
    /// superclass chain.
    pub(crate) fn find_field(&self, class_name: &str, field: &str) -> Option<(String, Type)> {
        let info = self.classes.get(class_name)?;
        if let Some((_, ty)) = info.ctor_params.iter().find(|(n, _)| n == field) {
            return Some((class_name.to_string(), ty.clone()));
        }
        if let Some((ty, _)) = info.fields.get(field) {
            return Some((class_name.to_string(), ty.clone()));
        }
        if info.superclass != OBJECT {
            let superclass = info.superclass.clone();
            return self.find_field(&superclass, field);
        }
        None
    }

    /// Looks up a method on a class or trait, walking superclasses and
    /// implemented traits.
    pub(crate) fn find_method(&self, class_name: &str, method: &str) -> Option<FunctionType> {
        let info = self.classes.get(class_name)?;
        if let Some(sig) = info.methods.get(method) {
            return Some(sig.clone());
        }
        if info.superclass != OBJECT {
            if let Some(sig) = self.find_method(&info.superclass.clone(), method) {
                return Some(sig);
            }
        }
        for interface in &info.interfaces {
            if let Some(sig) = self.find_method(interface, method) {
                return Some(sig);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmitError;
    use sable_lexer::Lexer;
    use sable_parser::Parser;
    use sable_typeck::TypeChecker;

    fn compile(source: &str) -> EmitResult<Vec<ClassArtifact>> {
        let tokens = Lexer::new(source).tokenize().expect("lex");
        let mut program = Parser::new(tokens).parse().expect("parse");
        let mut checker = TypeChecker::new();
        checker.check(&mut program).expect("typecheck");
        let types = checker.into_program_types();
        let map = SourceMap::new("test.sb", source);
        Emitter::new(&map, &types).emit_program(&program)
    }

    fn names(artifacts: &[ClassArtifact]) -> Vec<&str> {
        artifacts.iter().map(|a| a.name.as_str()).collect()
    }

    fn contains_bytes(haystack: &[u8], needle: &str) -> bool {
        let needle = needle.as_bytes();
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_function_wrapper_class() {
        let artifacts = compile("fun add(x: Int, y: Int): Int { x + y }").unwrap();
        assert_eq!(names(&artifacts), vec!["add$"]);
        let bytes = &artifacts[0].bytes;
        assert_eq!(&bytes[0..4], &[0xca, 0xfe, 0xba, 0xbe]);
        assert!(contains_bytes(bytes, "add"));
        assert!(contains_bytes(bytes, "(II)I"));
    }

    #[test]
    fn test_recursive_function_compiles() {
        let artifacts = compile(
            "fun factorial(n: Int): Int { if (n <= 1) { 1 } else { n * factorial(n - 1) } }",
        )
        .unwrap();
        let bytes = &artifacts[0].bytes;
        assert!(contains_bytes(bytes, "factorial"));
        // Branching methods carry stack map frames.
        assert!(contains_bytes(bytes, "StackMapTable"));
    }

    #[test]
    fn test_class_artifact() {
        let artifacts = compile(
            "class Point(x: Int, y: Int) { fun getX(): Int { x } fun getY(): Int { y } }",
        )
        .unwrap();
        assert_eq!(names(&artifacts), vec!["Point"]);
        let bytes = &artifacts[0].bytes;
        assert!(contains_bytes(bytes, "<init>"));
        assert!(contains_bytes(bytes, "(II)V"));
        assert!(contains_bytes(bytes, "getX"));
        assert!(contains_bytes(bytes, "getY"));
    }

    #[test]
    fn test_object_singleton() {
        let artifacts = compile(
            "object Math { fun pi(): Double { 3.14159 } fun square(x: Int): Int { x * x } }",
        )
        .unwrap();
        assert_eq!(names(&artifacts), vec!["Math"]);
        let bytes = &artifacts[0].bytes;
        assert!(contains_bytes(bytes, "INSTANCE"));
        assert!(contains_bytes(bytes, "<clinit>"));
        assert!(contains_bytes(bytes, "()D"));
    }

    #[test]
    fn test_extension_carrier() {
        let artifacts = compile(
            "extension Int { fun isEven(): Boolean { this % 2 == 0 } fun double(): Int { this * 2 } }",
        )
        .unwrap();
        assert_eq!(names(&artifacts), vec!["Int$Extension"]);
        let bytes = &artifacts[0].bytes;
        assert!(contains_bytes(bytes, "isEven"));
        assert!(contains_bytes(bytes, "(I)Z"));
        assert!(contains_bytes(bytes, "(I)I"));
    }

    #[test]
    fn test_trait_interface() {
        let artifacts = compile(
            "trait Shape { def area(): Double fun describe(): String { \"shape\" } }",
        )
        .unwrap();
        assert_eq!(names(&artifacts), vec!["Shape"]);
        let bytes = &artifacts[0].bytes;
        assert!(contains_bytes(bytes, "area"));
        assert!(contains_bytes(bytes, "describe"));
    }

    #[test]
    fn test_lambda_materialisation() {
        let artifacts = compile(
            "fun twice(f: Int => Int, x: Int): Int { f(f(x)) }\
             fun main(): Int { twice((x: Int) => x * 2, 3) }",
        )
        .unwrap();
        assert_eq!(names(&artifacts), vec!["twice$", "main$"]);
        let twice = &artifacts[0].bytes;
        assert!(contains_bytes(twice, "java/util/function/IntUnaryOperator"));
        assert!(contains_bytes(twice, "applyAsInt"));
        let main = &artifacts[1].bytes;
        assert!(contains_bytes(main, "lambda$0"));
        assert!(contains_bytes(main, "BootstrapMethods"));
        assert!(contains_bytes(main, "java/lang/invoke/LambdaMetafactory"));
    }

    #[test]
    fn test_unsupported_lambda_arity() {
        let err = compile(
            "fun apply3(f: (Int, Int, Int) => Int): Int { f(1, 2, 3) }",
        )
        .unwrap_err();
        assert!(matches!(err, EmitError::UnsupportedArity { arity: 3, .. }));
    }

    #[test]
    fn test_failed_compile_produces_no_artifacts() {
        let result = compile("fun apply3(f: (Int, Int, Int) => Int): Int { f(1, 2, 3) }");
        assert!(result.is_err());
    }

    #[test]
    fn test_multiple_declarations_emit_in_source_order() {
        let artifacts = compile(
            "fun one(): Int { 1 }\
             class Pair(a: Int, b: Int)\
             object Registry { fun size(): Int { 0 } }",
        )
        .unwrap();
        assert_eq!(names(&artifacts), vec!["one$", "Pair", "Registry"]);
    }
}
