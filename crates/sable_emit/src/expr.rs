//! Expression lowering.
//!
//! Produces conventional stack code: direct integer and double opcodes for
//! arithmetic, conditional jumps pushing 0/1 for comparisons, short-circuit
//! jumps for the logical operators, `java.util` containers for the
//! collection literals, and invokedynamic materialisation for every
//! function-typed value. Structural receivers fall back to reflective
//! invocation.

use crate::classfile::{Cond, CodeBuilder, Label, VType, ACC_PRIVATE, ACC_STATIC, ACC_SYNTHETIC, REF_INVOKE_STATIC, REF_INVOKE_VIRTUAL};
use crate::descriptor::{box_class, field_descriptor, internal_name, is_reference, method_descriptor, vtype_for};
use crate::emitter::{ClassCtx, Emitter, LocalVar, MethodCtx, ThisBinding, OBJECT};
use crate::error::{EmitError, EmitResult};
use crate::shapes;
use sable_ast::*;
use sable_lexer::Span;
use sable_typeck::type_key;
use sable_types::{FunctionType, Type};

const METAFACTORY_DESC: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;\
Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;\
Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;";

impl<'a> Emitter<'a> {
    /// The inferred type of an expression. Literals are recomputed
    /// locally; everything else must have been filled by the checker.
    pub(crate) fn expr_ty(&self, expr: &Expr) -> EmitResult<Type> {
        if let Some(ty) = &expr.ty {
            return Ok(ty.clone());
        }
        match &expr.kind {
            ExprKind::Literal(Literal::Int(_)) => Ok(Type::Int),
            ExprKind::Literal(Literal::Double(_)) => Ok(Type::Double),
            ExprKind::Literal(Literal::Str(_)) => Ok(Type::Str),
            ExprKind::Literal(Literal::Bool(_)) => Ok(Type::Bool),
            ExprKind::Literal(Literal::Null) => Ok(Type::Null),
            _ => Err(EmitError::UnresolvedType { span: expr.span }),
        }
    }

    fn line_of(&self, span: Span) -> u16 {
        self.source_map.line_col(span.start).0.min(u16::MAX as u32) as u16
    }

    /// Resolves a local-variable type annotation to a semantic type.
    ///
    /// Mirrors `sable_typeck::resolve::resolve_type`, but reads from the
    /// already-checked `ProgramTypes` tables rather than a live type
    /// context: by emission time every annotation has already been
    /// validated by the checker, so this never needs to raise a type
    /// error of its own.
    pub(crate) fn resolve_annotation(&self, annotation: &TypeExpr) -> EmitResult<Type> {
        match &annotation.kind {
            TypeExprKind::Named { name, args } => {
                let args = args
                    .iter()
                    .map(|a| self.resolve_annotation(a))
                    .collect::<EmitResult<Vec<_>>>()?;
                Ok(self.resolve_named_annotation(&name.name, args))
            }

            TypeExprKind::Function { params, ret } => {
                let params = params
                    .iter()
                    .map(|p| self.resolve_annotation(p))
                    .collect::<EmitResult<Vec<_>>>()?;
                let ret = self.resolve_annotation(ret)?;
                Ok(Type::Function(FunctionType::new(params, ret)))
            }

            TypeExprKind::Structural(members) => {
                let mut resolved = indexmap::IndexMap::new();
                for (name, ty) in members {
                    resolved.insert(name.name.clone(), self.resolve_annotation(ty)?);
                }
                Ok(Type::Structural(resolved))
            }
        }
    }

    fn resolve_named_annotation(&self, name: &str, args: Vec<Type>) -> Type {
        match name {
            "Int" => Type::Int,
            "Double" => Type::Double,
            "String" => Type::Str,
            "Boolean" => Type::Bool,
            "Unit" => Type::Unit,
            "Any" | "AnyRef" => Type::Any,
            "Nothing" => Type::Nothing,
            "Null" => Type::Null,
            "List" => Type::List(Box::new(args.into_iter().next().unwrap_or(Type::Any))),
            "Set" => Type::Set(Box::new(args.into_iter().next().unwrap_or(Type::Any))),
            "Map" => {
                let mut args = args.into_iter();
                let key = args.next().unwrap_or(Type::Any);
                let value = args.next().unwrap_or(Type::Any);
                Type::Map(Box::new(key), Box::new(value))
            }
            _ => match self.types.named.get(name) {
                Some(Type::Generic(def)) => instantiate_generic(def, &args),
                Some(ty) => ty.clone(),
                None => self.named_type(name),
            },
        }
    }

    /// Emits a block's statements; returns the type of its value, or None
    /// when the block diverges through a return.
    pub(crate) fn emit_block(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        block: &Block,
    ) -> EmitResult<Option<Type>> {
        m.push_scope();
        let mut last = Type::Unit;
        let count = block.stmts.len();
        for (i, stmt) in block.stmts.iter().enumerate() {
            let is_last = i + 1 == count;
            match &stmt.kind {
                StmtKind::Expr(expr) => {
                    let ty = self.emit_expr(class, m, expr)?;
                    if !m.code.is_reachable() {
                        m.pop_scope();
                        return Ok(None);
                    }
                    if is_last {
                        last = ty;
                    } else if ty != Type::Unit {
                        m.code.pop_value();
                    }
                }

                StmtKind::VarDecl {
                    name,
                    annotation,
                    init,
                    ..
                } => {
                    let ty = match (init, annotation) {
                        (Some(init), Some(annotation)) => {
                            let declared = self.resolve_annotation(annotation)?;
                            let init_ty = self.emit_expr(class, m, init)?;
                            self.adapt(class, m, &init_ty, &declared, init.span)?;
                            declared
                        }
                        (Some(init), None) => self.emit_expr(class, m, init)?,
                        (None, Some(annotation)) => self.resolve_annotation(annotation)?,
                        (None, None) => {
                            return Err(EmitError::UnresolvedType { span: stmt.span })
                        }
                    };
                    let slot = m.code.reserve_local(&vtype_for(&ty));
                    if init.is_some() {
                        self.store_slot(m, slot, &ty);
                    }
                    m.define(name.name.clone(), LocalVar { slot, ty });
                    last = Type::Unit;
                }

                StmtKind::Return(value) => {
                    let value_ty = match value {
                        Some(value) => Some(self.emit_expr(class, m, value)?),
                        None => None,
                    };
                    self.emit_typed_return(class, m, value_ty, stmt.span)?;
                    m.pop_scope();
                    return Ok(None);
                }
            }
        }
        m.pop_scope();
        Ok(Some(last))
    }

    /// Emits the return sequence for the enclosing method, adapting the
    /// value on the stack (if any) to the declared return type.
    fn emit_typed_return(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        value_ty: Option<Type>,
        span: Span,
    ) -> EmitResult<()> {
        let ret = m.ret.clone();
        if ret == Type::Unit {
            if let Some(ty) = value_ty {
                if ty != Type::Unit {
                    m.code.pop_value();
                }
            }
            if m.in_lambda {
                // The implementation method of an object-shaped interface
                // returns Object even for unit bodies.
                m.code.aconst_null();
                m.code.areturn();
            } else {
                m.code.return_();
            }
            return Ok(());
        }

        let from = value_ty.unwrap_or(Type::Unit);
        self.adapt(class, m, &from, &ret, span)?;
        self.emit_return_for(m, &ret);
        Ok(())
    }

    fn emit_return_for(&self, m: &mut MethodCtx, ty: &Type) {
        match ty {
            Type::Int | Type::Bool => m.code.ireturn(),
            Type::Double => m.code.dreturn(),
            _ => m.code.areturn(),
        }
    }

    /// Finishes a method body whose block fell through: adapts the final
    /// value to the declared return and emits the return instruction.
    pub(crate) fn finish_with_return(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        body: Option<Type>,
        span: Span,
    ) -> EmitResult<()> {
        if !m.code.is_reachable() {
            return Ok(());
        }
        match body {
            None => Ok(()),
            Some(ty) => self.emit_typed_return(class, m, Some(ty), span),
        }
    }

    // ========== Expressions ==========

    pub(crate) fn emit_expr(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        expr: &Expr,
    ) -> EmitResult<Type> {
        let line = self.line_of(expr.span);
        m.code.line(line);

        match &expr.kind {
            ExprKind::Literal(lit) => Ok(self.emit_literal(class, m, lit)),

            ExprKind::Ident(ident) => self.emit_ident(class, m, ident, expr),

            ExprKind::This => self.emit_this(m, expr.span),

            ExprKind::Binary { op, left, right } => {
                self.emit_binary(class, m, *op, left, right, expr)
            }

            ExprKind::Unary { op, operand } => {
                let ty = self.emit_expr(class, m, operand)?;
                match op {
                    UnaryOp::Not => {
                        m.code.iconst(1);
                        m.code.ixor();
                        Ok(Type::Bool)
                    }
                    UnaryOp::Neg => {
                        if ty == Type::Double {
                            m.code.dneg();
                        } else {
                            m.code.ineg();
                        }
                        Ok(ty)
                    }
                    UnaryOp::Pos => Ok(ty),
                }
            }

            ExprKind::MethodCall {
                receiver,
                method,
                args,
                ..
            } => self.emit_method_call(class, m, receiver.as_deref(), method, args, expr),

            ExprKind::FieldAccess { object, field } => {
                self.emit_field_access(class, m, object, field, expr)
            }

            ExprKind::Assign { target, value } => self.emit_assign(class, m, target, value),

            ExprKind::Block(block) => {
                let result = self.emit_block(class, m, block)?;
                Ok(result.unwrap_or(Type::Nothing))
            }

            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.emit_if(class, m, condition, then_branch, else_branch.as_deref(), expr),

            ExprKind::While { condition, body } => {
                self.emit_while(class, m, condition, body)
            }

            ExprKind::ListLiteral(elements) => self.emit_list(class, m, elements, expr),

            ExprKind::MapLiteral(entries) => self.emit_map(class, m, entries, expr),

            ExprKind::Lambda { params, body } => self.emit_lambda(class, m, params, body, expr),
        }
    }

    fn emit_literal(&self, class: &mut ClassCtx, m: &mut MethodCtx, lit: &Literal) -> Type {
        match lit {
            Literal::Int(n) => {
                m.code.ldc_int(&mut class.file.pool, *n as i32);
                Type::Int
            }
            Literal::Double(d) => {
                m.code.dconst(&mut class.file.pool, *d);
                Type::Double
            }
            Literal::Str(s) => {
                m.code.ldc_string(&mut class.file.pool, s);
                Type::Str
            }
            Literal::Bool(b) => {
                m.code.iconst(i32::from(*b));
                Type::Bool
            }
            Literal::Null => {
                m.code.aconst_null();
                Type::Null
            }
        }
    }

    /// Bare identifiers resolve in order: local slot, field of `this`,
    /// method of the enclosing class (materialised as a function value),
    /// then top-level entities.
    fn emit_ident(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        ident: &Ident,
        expr: &Expr,
    ) -> EmitResult<Type> {
        let name = &ident.name;

        if let Some(local) = m.lookup(name).cloned() {
            self.load_slot(m, local.slot, &local.ty);
            return Ok(local.ty);
        }

        if let Some(ThisBinding::Instance { owner, .. }) = m.this.clone() {
            if let Some((field_owner, ty)) = self.find_field(&owner, name) {
                m.code.aload(0);
                m.code.getfield(
                    &mut class.file.pool,
                    &field_owner,
                    name,
                    &field_descriptor(&ty),
                );
                return Ok(ty);
            }
            if let Some(sig) = self.find_method(&owner, name) {
                // Materialise the sibling method as a function value with
                // the receiver captured.
                m.code.aload(0);
                let captures = format!("(L{};", owner);
                self.emit_indy(
                    class,
                    m,
                    &sig,
                    REF_INVOKE_VIRTUAL,
                    &owner,
                    name,
                    &method_descriptor(&sig.params, &sig.ret),
                    &captures,
                    expr.span,
                )?;
                return Ok(Type::Function(sig));
            }
        }

        if self.declared_functions.contains(name) {
            if let Some(sig) = self.signatures.get(name).cloned() {
                let owner = format!("{}$", name);
                self.emit_indy(
                    class,
                    m,
                    &sig,
                    REF_INVOKE_STATIC,
                    &owner,
                    name,
                    &method_descriptor(&sig.params, &sig.ret),
                    "(",
                    expr.span,
                )?;
                return Ok(Type::Function(sig));
            }
        }
        if name == "println" || name == "print" {
            return Err(EmitError::MethodReference {
                name: name.clone(),
                span: expr.span,
            });
        }

        if let Some(info) = self.classes.get(name) {
            if info.is_object {
                let descriptor = format!("L{};", name);
                m.code
                    .getstatic(&mut class.file.pool, name, "INSTANCE", &descriptor);
                return Ok(self.expr_ty(expr).unwrap_or_else(|_| self.named_type(name)));
            }
            return Err(EmitError::Unsupported {
                what: format!("class {} used as a value", name),
                span: expr.span,
            });
        }

        Err(EmitError::UndefinedVariable {
            name: name.clone(),
            span: expr.span,
        })
    }

    fn emit_this(&mut self, m: &mut MethodCtx, span: Span) -> EmitResult<Type> {
        match m.this.clone() {
            Some(ThisBinding::Instance { ty, .. }) => {
                m.code.aload(0);
                Ok(ty)
            }
            Some(ThisBinding::Receiver { ty }) => {
                self.load_slot(m, 0, &ty);
                Ok(ty)
            }
            None => Err(EmitError::UndefinedVariable {
                name: "this".to_string(),
                span,
            }),
        }
    }

    fn emit_binary(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        expr: &Expr,
    ) -> EmitResult<Type> {
        let left_ty = self.expr_ty(left)?;
        let right_ty = self.expr_ty(right)?;
        let result = self.expr_ty(expr)?;

        if op.is_arithmetic() {
            if result == Type::Str {
                return self.emit_string_concat(class, m, left, right);
            }
            if result == Type::Double {
                self.emit_expr(class, m, left)?;
                if left_ty == Type::Int {
                    m.code.i2d();
                }
                self.emit_expr(class, m, right)?;
                if right_ty == Type::Int {
                    m.code.i2d();
                }
                m.code.double_arith(double_arith_opcode(op));
                return Ok(Type::Double);
            }
            self.emit_expr(class, m, left)?;
            self.emit_expr(class, m, right)?;
            m.code.int_arith(int_arith_opcode(op));
            return Ok(Type::Int);
        }

        if op.is_comparison() {
            self.emit_comparison(class, m, op, left, right, &left_ty, &right_ty)?;
            return Ok(Type::Bool);
        }

        // Short-circuit logical operators.
        match op {
            BinaryOp::And => {
                let l_false = m.code.new_label();
                let l_end = m.code.new_label();
                self.emit_expr(class, m, left)?;
                m.code.if_cond(Cond::Eq, l_false);
                self.emit_expr(class, m, right)?;
                m.code.goto(l_end);
                m.code.bind(l_false);
                m.code.iconst(0);
                m.code.bind(l_end);
            }
            BinaryOp::Or => {
                let l_true = m.code.new_label();
                let l_end = m.code.new_label();
                self.emit_expr(class, m, left)?;
                m.code.if_cond(Cond::Ne, l_true);
                self.emit_expr(class, m, right)?;
                m.code.goto(l_end);
                m.code.bind(l_true);
                m.code.iconst(1);
                m.code.bind(l_end);
            }
            _ => unreachable!("binary operators are arithmetic, comparison, or logical"),
        }
        Ok(Type::Bool)
    }

    fn emit_comparison(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        left_ty: &Type,
        right_ty: &Type,
    ) -> EmitResult<()> {
        let cond = comparison_cond(op);

        // Numeric comparisons: integers directly, anything with a double
        // through dcmpl.
        if left_ty.is_numeric() && right_ty.is_numeric() {
            if *left_ty == Type::Int && *right_ty == Type::Int {
                self.emit_expr(class, m, left)?;
                self.emit_expr(class, m, right)?;
                self.emit_bool_result(m, |code, l| code.if_icmp(cond, l));
            } else {
                self.emit_expr(class, m, left)?;
                if *left_ty == Type::Int {
                    m.code.i2d();
                }
                self.emit_expr(class, m, right)?;
                if *right_ty == Type::Int {
                    m.code.i2d();
                }
                m.code.dcmpl();
                self.emit_bool_result(m, |code, l| code.if_cond(cond, l));
            }
            return Ok(());
        }

        if *left_ty == Type::Bool && *right_ty == Type::Bool {
            self.emit_expr(class, m, left)?;
            self.emit_expr(class, m, right)?;
            self.emit_bool_result(m, |code, l| code.if_icmp(cond, l));
            return Ok(());
        }

        // Reference equality. Null comparisons use reference identity;
        // strings compare by value.
        let equal = op == BinaryOp::Eq;
        let involves_null = *left_ty == Type::Null || *right_ty == Type::Null;
        if !involves_null && (*left_ty == Type::Str || *right_ty == Type::Str) {
            self.emit_expr(class, m, left)?;
            self.emit_expr(class, m, right)?;
            m.code.invokevirtual(
                &mut class.file.pool,
                "java/lang/String",
                "equals",
                "(Ljava/lang/Object;)Z",
            );
            if !equal {
                m.code.iconst(1);
                m.code.ixor();
            }
            return Ok(());
        }

        self.emit_expr(class, m, left)?;
        self.emit_expr(class, m, right)?;
        self.emit_bool_result(m, |code, l| code.if_acmp(equal, l));
        Ok(())
    }

    /// Emits the 0/1 materialisation pattern around a branch that jumps
    /// when the condition holds.
    fn emit_bool_result(
        &self,
        m: &mut MethodCtx,
        jump: impl FnOnce(&mut CodeBuilder, Label),
    ) {
        let l_true = m.code.new_label();
        let l_end = m.code.new_label();
        jump(&mut m.code, l_true);
        m.code.iconst(0);
        m.code.goto(l_end);
        m.code.bind(l_true);
        m.code.iconst(1);
        m.code.bind(l_end);
    }

    fn emit_string_concat(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        left: &Expr,
        right: &Expr,
    ) -> EmitResult<Type> {
        let left_ty = self.expr_ty(left)?;
        self.emit_expr(class, m, left)?;
        self.to_string_value(class, m, &left_ty);
        let right_ty = self.expr_ty(right)?;
        self.emit_expr(class, m, right)?;
        self.to_string_value(class, m, &right_ty);
        m.code.invokevirtual(
            &mut class.file.pool,
            "java/lang/String",
            "concat",
            "(Ljava/lang/String;)Ljava/lang/String;",
        );
        Ok(Type::Str)
    }

    fn to_string_value(&self, class: &mut ClassCtx, m: &mut MethodCtx, ty: &Type) {
        let desc = match ty {
            Type::Str => return,
            Type::Int => "(I)Ljava/lang/String;",
            Type::Double => "(D)Ljava/lang/String;",
            Type::Bool => "(Z)Ljava/lang/String;",
            _ => "(Ljava/lang/Object;)Ljava/lang/String;",
        };
        m.code
            .invokestatic(&mut class.file.pool, "java/lang/String", "valueOf", desc);
    }

    fn emit_if(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: Option<&Expr>,
        expr: &Expr,
    ) -> EmitResult<Type> {
        let result = self.expr_ty(expr)?;
        self.emit_expr(class, m, condition)?;

        match else_branch {
            Some(else_branch) => {
                let l_else = m.code.new_label();
                let l_end = m.code.new_label();
                m.code.if_cond(Cond::Eq, l_else);

                let then_ty = self.emit_expr(class, m, then_branch)?;
                if m.code.is_reachable() {
                    self.join_branch(class, m, &then_ty, &result, then_branch.span)?;
                    m.code.goto(l_end);
                }

                m.code.bind(l_else);
                let else_ty = self.emit_expr(class, m, else_branch)?;
                if m.code.is_reachable() {
                    self.join_branch(class, m, &else_ty, &result, else_branch.span)?;
                }
                m.code.bind(l_end);
                Ok(result)
            }
            None => {
                let l_end = m.code.new_label();
                m.code.if_cond(Cond::Eq, l_end);
                let then_ty = self.emit_expr(class, m, then_branch)?;
                if m.code.is_reachable() && then_ty != Type::Unit {
                    m.code.pop_value();
                }
                m.code.bind(l_end);
                Ok(Type::Unit)
            }
        }
    }

    /// Adapts a branch value to the if-expression's unified type so both
    /// paths agree at the merge point.
    fn join_branch(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        from: &Type,
        to: &Type,
        span: Span,
    ) -> EmitResult<()> {
        if *to == Type::Unit {
            if *from != Type::Unit {
                m.code.pop_value();
            }
            return Ok(());
        }
        self.adapt(class, m, from, to, span)?;
        if is_reference(to) {
            m.code.retype_top(vtype_for(to));
        }
        Ok(())
    }

    fn emit_while(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        condition: &Expr,
        body: &Expr,
    ) -> EmitResult<Type> {
        let l_start = m.code.new_label();
        let l_end = m.code.new_label();
        m.code.bind(l_start);
        self.emit_expr(class, m, condition)?;
        m.code.if_cond(Cond::Eq, l_end);
        let body_ty = self.emit_expr(class, m, body)?;
        if m.code.is_reachable() {
            if body_ty != Type::Unit {
                m.code.pop_value();
            }
            m.code.goto(l_start);
        }
        m.code.bind(l_end);
        Ok(Type::Unit)
    }

    fn emit_assign(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        target: &Expr,
        value: &Expr,
    ) -> EmitResult<Type> {
        match &target.kind {
            ExprKind::Ident(ident) => {
                if let Some(local) = m.lookup(&ident.name).cloned() {
                    let value_ty = self.emit_expr(class, m, value)?;
                    self.adapt(class, m, &value_ty, &local.ty, value.span)?;
                    self.store_slot(m, local.slot, &local.ty);
                    return Ok(Type::Unit);
                }
                if let Some(ThisBinding::Instance { owner, .. }) = m.this.clone() {
                    if let Some((field_owner, ty)) = self.find_field(&owner, &ident.name) {
                        m.code.aload(0);
                        let value_ty = self.emit_expr(class, m, value)?;
                        self.adapt(class, m, &value_ty, &ty, value.span)?;
                        m.code.putfield(
                            &mut class.file.pool,
                            &field_owner,
                            &ident.name,
                            &field_descriptor(&ty),
                        );
                        return Ok(Type::Unit);
                    }
                }
                Err(EmitError::UndefinedVariable {
                    name: ident.name.clone(),
                    span: target.span,
                })
            }

            ExprKind::FieldAccess { object, field } => {
                let object_ty = self.expr_ty(object)?;
                let Some(owner) = object_ty.name().map(str::to_string) else {
                    return Err(EmitError::AssignmentTarget { span: target.span });
                };
                let Some((field_owner, ty)) = self.find_field(&owner, &field.name) else {
                    return Err(EmitError::AssignmentTarget { span: target.span });
                };
                self.emit_expr(class, m, object)?;
                let value_ty = self.emit_expr(class, m, value)?;
                self.adapt(class, m, &value_ty, &ty, value.span)?;
                m.code.putfield(
                    &mut class.file.pool,
                    &field_owner,
                    &field.name,
                    &field_descriptor(&ty),
                );
                Ok(Type::Unit)
            }

            _ => Err(EmitError::AssignmentTarget { span: target.span }),
        }
    }

    fn emit_list(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        elements: &[Expr],
        expr: &Expr,
    ) -> EmitResult<Type> {
        m.code.new_object(&mut class.file.pool, "java/util/ArrayList");
        m.code.dup();
        m.code
            .invokespecial(&mut class.file.pool, "java/util/ArrayList", "<init>", "()V");
        for element in elements {
            m.code.dup();
            let ty = self.emit_expr(class, m, element)?;
            self.box_value(class, m, &ty);
            m.code.invokevirtual(
                &mut class.file.pool,
                "java/util/ArrayList",
                "add",
                "(Ljava/lang/Object;)Z",
            );
            m.code.pop_value();
        }
        self.expr_ty(expr)
    }

    fn emit_map(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        entries: &[(Expr, Expr)],
        expr: &Expr,
    ) -> EmitResult<Type> {
        m.code.new_object(&mut class.file.pool, "java/util/HashMap");
        m.code.dup();
        m.code
            .invokespecial(&mut class.file.pool, "java/util/HashMap", "<init>", "()V");
        for (key, value) in entries {
            m.code.dup();
            let key_ty = self.emit_expr(class, m, key)?;
            self.box_value(class, m, &key_ty);
            let value_ty = self.emit_expr(class, m, value)?;
            self.box_value(class, m, &value_ty);
            m.code.invokevirtual(
                &mut class.file.pool,
                "java/util/HashMap",
                "put",
                "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
            );
            m.code.pop_value();
        }
        self.expr_ty(expr)
    }

    /// Lifts a lambda body to a private static method and materialises it
    /// through an invokedynamic call site. Lambdas read only their
    /// parameters and global entities; there is no local capture.
    fn emit_lambda(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        params: &[Parameter],
        body: &Expr,
        expr: &Expr,
    ) -> EmitResult<Type> {
        let Type::Function(fn_ty) = self.expr_ty(expr)? else {
            return Err(EmitError::UnresolvedType { span: expr.span });
        };

        let impl_name = format!("lambda${}", class.lambda_count);
        class.lambda_count += 1;
        let impl_desc = lambda_impl_descriptor(&fn_ty);

        let mut locals = Vec::new();
        for ty in &fn_ty.params {
            let vtype = vtype_for(ty);
            let wide = vtype == VType::Double;
            locals.push(vtype);
            if wide {
                locals.push(VType::Top);
            }
        }

        let mut lambda_ctx = MethodCtx {
            code: CodeBuilder::new(locals),
            scopes: vec![Default::default()],
            ret: fn_ty.ret.as_ref().clone(),
            this: None,
            in_lambda: true,
        };
        let mut slot = 0u16;
        for (p, ty) in params.iter().zip(&fn_ty.params) {
            lambda_ctx.define(
                p.name.name.clone(),
                LocalVar {
                    slot,
                    ty: ty.clone(),
                },
            );
            slot += if matches!(ty, Type::Double) { 2 } else { 1 };
        }

        let body_ty = self.emit_expr(class, &mut lambda_ctx, body)?;
        if lambda_ctx.code.is_reachable() {
            self.emit_typed_return(class, &mut lambda_ctx, Some(body_ty), body.span)?;
        }
        class.file.add_method(
            ACC_PRIVATE | ACC_STATIC | ACC_SYNTHETIC,
            &impl_name,
            &impl_desc,
            lambda_ctx.code,
        );

        let owner = class.name.clone();
        self.emit_indy(
            class,
            m,
            &fn_ty,
            REF_INVOKE_STATIC,
            &owner,
            &impl_name,
            &impl_desc,
            "(",
            expr.span,
        )?;
        Ok(Type::Function(fn_ty))
    }

    /// Emits an invokedynamic call site bootstrapped through the lambda
    /// factory. `captures_prefix` is the open parameter list of the call
    /// site descriptor: `"("` for no captures, `"(LOwner;"` for a captured
    /// receiver already on the stack.
    #[allow(clippy::too_many_arguments)]
    fn emit_indy(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        fn_ty: &FunctionType,
        impl_kind: u8,
        impl_owner: &str,
        impl_name: &str,
        impl_desc: &str,
        captures_prefix: &str,
        span: Span,
    ) -> EmitResult<()> {
        let shape = shapes::shape_for(&fn_ty.params, &fn_ty.ret, span)?;

        let pool = &mut class.file.pool;
        let factory_ref = pool.methodref(
            "java/lang/invoke/LambdaMetafactory",
            "metafactory",
            METAFACTORY_DESC,
        );
        let factory_handle = pool.method_handle(REF_INVOKE_STATIC, factory_ref);
        let erased_mt = pool.method_type(shape.erased);
        let impl_ref = pool.methodref(impl_owner, impl_name, impl_desc);
        let impl_handle = pool.method_handle(impl_kind, impl_ref);
        let instantiated = shape.instantiated(&fn_ty.params, &fn_ty.ret);
        let instantiated_mt = pool.method_type(&instantiated);

        let bsm = class
            .file
            .add_bootstrap_method(factory_handle, vec![erased_mt, impl_handle, instantiated_mt]);

        let mut captures = String::from(captures_prefix);
        captures.push_str(&format!(")L{};", shape.interface));
        m.code
            .invokedynamic(&mut class.file.pool, bsm, shape.method, &captures);
        Ok(())
    }

    // ========== Calls ==========

    fn emit_method_call(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        receiver: Option<&Expr>,
        method: &Ident,
        args: &[Expr],
        expr: &Expr,
    ) -> EmitResult<Type> {
        let Some(receiver) = receiver else {
            return self.emit_named_call(class, m, method, args, expr);
        };

        if method.name == APPLY {
            if let ExprKind::Ident(ident) = &receiver.kind {
                return self.emit_apply_on_name(class, m, ident, args, expr);
            }
            // First-class application of an arbitrary function-typed
            // expression.
            let receiver_ty = self.expr_ty(receiver)?;
            let Type::Function(fn_ty) = receiver_ty else {
                return Err(EmitError::Unsupported {
                    what: format!("call on a value of type {}", receiver_ty),
                    span: expr.span,
                });
            };
            self.emit_expr(class, m, receiver)?;
            return self.emit_sam_call(class, m, &fn_ty, args, expr.span);
        }

        self.emit_member_call(class, m, receiver, method, args, expr)
    }

    /// A call with no receiver expression: resolve the method name the
    /// way a bare identifier resolves.
    fn emit_named_call(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        method: &Ident,
        args: &[Expr],
        expr: &Expr,
    ) -> EmitResult<Type> {
        let ident = method.clone();
        self.emit_apply_on_name(class, m, &ident, args, expr)
    }

    /// Lowers `name(args)`: a SAM call for function-typed locals and
    /// fields, a direct invocation for sibling methods and top-level
    /// functions, a constructor call for class names.
    fn emit_apply_on_name(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        ident: &Ident,
        args: &[Expr],
        expr: &Expr,
    ) -> EmitResult<Type> {
        let name = &ident.name;

        if let Some(local) = m.lookup(name).cloned() {
            let Type::Function(fn_ty) = local.ty.clone() else {
                return Err(EmitError::Unsupported {
                    what: format!("call on a value of type {}", local.ty),
                    span: expr.span,
                });
            };
            self.load_slot(m, local.slot, &local.ty);
            return self.emit_sam_call(class, m, &fn_ty, args, expr.span);
        }

        if let Some(ThisBinding::Instance { owner, interface, .. }) = m.this.clone() {
            if let Some((field_owner, ty)) = self.find_field(&owner, name) {
                if let Type::Function(fn_ty) = ty.clone() {
                    m.code.aload(0);
                    m.code.getfield(
                        &mut class.file.pool,
                        &field_owner,
                        name,
                        &field_descriptor(&ty),
                    );
                    return self.emit_sam_call(class, m, &fn_ty, args, expr.span);
                }
            }
            if let Some(sig) = self.find_method(&owner, name) {
                m.code.aload(0);
                self.emit_call_args(class, m, &sig, args)?;
                let descriptor = method_descriptor(&sig.params, &sig.ret);
                if interface {
                    m.code
                        .invokeinterface(&mut class.file.pool, &owner, name, &descriptor);
                } else {
                    m.code
                        .invokevirtual(&mut class.file.pool, &owner, name, &descriptor);
                }
                return Ok(sig.ret.as_ref().clone());
            }
        }

        if self.declared_functions.contains(name) {
            if let Some(sig) = self.signatures.get(name).cloned() {
                self.emit_call_args(class, m, &sig, args)?;
                let owner = format!("{}$", name);
                m.code.invokestatic(
                    &mut class.file.pool,
                    &owner,
                    name,
                    &method_descriptor(&sig.params, &sig.ret),
                );
                return Ok(sig.ret.as_ref().clone());
            }
        }

        if (name == "println" || name == "print") && args.len() == 1 {
            return self.emit_println(class, m, name, &args[0]);
        }

        if let Some(info) = self.classes.get(name).cloned() {
            if !info.is_object && !info.is_interface {
                m.code.new_object(&mut class.file.pool, name);
                m.code.dup();
                let param_types: Vec<Type> =
                    info.ctor_params.iter().map(|(_, t)| t.clone()).collect();
                let sig = FunctionType::new(param_types.clone(), Type::Unit);
                self.emit_call_args(class, m, &sig, args)?;
                m.code.invokespecial(
                    &mut class.file.pool,
                    name,
                    "<init>",
                    &method_descriptor(&param_types, &Type::Unit),
                );
                return self.expr_ty(expr);
            }
            return Err(EmitError::Unsupported {
                what: format!("{} is not callable", name),
                span: expr.span,
            });
        }

        Err(EmitError::UndefinedVariable {
            name: name.clone(),
            span: expr.span,
        })
    }

    fn emit_println(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        name: &str,
        arg: &Expr,
    ) -> EmitResult<Type> {
        m.code.getstatic(
            &mut class.file.pool,
            "java/lang/System",
            "out",
            "Ljava/io/PrintStream;",
        );
        let arg_ty = self.emit_expr(class, m, arg)?;
        let descriptor = match arg_ty {
            Type::Int => "(I)V",
            Type::Double => "(D)V",
            Type::Bool => "(Z)V",
            Type::Str => "(Ljava/lang/String;)V",
            _ => "(Ljava/lang/Object;)V",
        };
        m.code
            .invokevirtual(&mut class.file.pool, "java/io/PrintStream", name, descriptor);
        Ok(Type::Unit)
    }

    /// Lowers `receiver.method(args)` for named methods: direct virtual or
    /// interface dispatch, built-in collection and string operations,
    /// extension carriers, and the reflective fallback for structural
    /// receivers.
    fn emit_member_call(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        receiver: &Expr,
        method: &Ident,
        args: &[Expr],
        expr: &Expr,
    ) -> EmitResult<Type> {
        let receiver_ty = self.expr_ty(receiver)?;
        let name = &method.name;

        match &receiver_ty {
            Type::Class(_) | Type::Object(_) | Type::Trait(_) => {
                let type_name = receiver_ty.name().unwrap_or_default().to_string();
                if let Some(sig) = self.find_method(&type_name, name) {
                    self.emit_expr(class, m, receiver)?;
                    self.emit_call_args(class, m, &sig, args)?;
                    let descriptor = method_descriptor(&sig.params, &sig.ret);
                    let is_interface = matches!(receiver_ty, Type::Trait(_));
                    if is_interface {
                        m.code
                            .invokeinterface(&mut class.file.pool, &type_name, name, &descriptor);
                    } else {
                        m.code
                            .invokevirtual(&mut class.file.pool, &type_name, name, &descriptor);
                    }
                    return Ok(sig.ret.as_ref().clone());
                }
                if let Some((field_owner, ty)) = self.find_field(&type_name, name) {
                    if let Type::Function(fn_ty) = ty.clone() {
                        self.emit_expr(class, m, receiver)?;
                        m.code.getfield(
                            &mut class.file.pool,
                            &field_owner,
                            name,
                            &field_descriptor(&ty),
                        );
                        return self.emit_sam_call(class, m, &fn_ty, args, expr.span);
                    }
                }
                self.emit_extension_or_fail(class, m, receiver, &receiver_ty, method, args, expr)
            }

            Type::List(elem) => {
                let elem = elem.as_ref().clone();
                match name.as_str() {
                    "size" => {
                        self.emit_expr(class, m, receiver)?;
                        m.code
                            .invokeinterface(&mut class.file.pool, "java/util/List", "size", "()I");
                        Ok(Type::Int)
                    }
                    "get" => {
                        self.emit_expr(class, m, receiver)?;
                        let arg_ty = self.emit_expr(class, m, &args[0])?;
                        self.adapt(class, m, &arg_ty, &Type::Int, args[0].span)?;
                        m.code.invokeinterface(
                            &mut class.file.pool,
                            "java/util/List",
                            "get",
                            "(I)Ljava/lang/Object;",
                        );
                        self.unbox_or_cast(class, m, &elem)?;
                        Ok(elem)
                    }
                    "add" => {
                        self.emit_expr(class, m, receiver)?;
                        let arg_ty = self.emit_expr(class, m, &args[0])?;
                        self.box_value(class, m, &arg_ty);
                        m.code.invokeinterface(
                            &mut class.file.pool,
                            "java/util/List",
                            "add",
                            "(Ljava/lang/Object;)Z",
                        );
                        m.code.pop_value();
                        Ok(Type::Unit)
                    }
                    _ => self.emit_extension_or_fail(
                        class,
                        m,
                        receiver,
                        &receiver_ty,
                        method,
                        args,
                        expr,
                    ),
                }
            }

            Type::Set(_) => {
                match name.as_str() {
                    "size" => {
                        self.emit_expr(class, m, receiver)?;
                        m.code
                            .invokeinterface(&mut class.file.pool, "java/util/Set", "size", "()I");
                        Ok(Type::Int)
                    }
                    "add" => {
                        self.emit_expr(class, m, receiver)?;
                        let arg_ty = self.emit_expr(class, m, &args[0])?;
                        self.box_value(class, m, &arg_ty);
                        m.code.invokeinterface(
                            &mut class.file.pool,
                            "java/util/Set",
                            "add",
                            "(Ljava/lang/Object;)Z",
                        );
                        m.code.pop_value();
                        Ok(Type::Unit)
                    }
                    _ => self.emit_extension_or_fail(
                        class,
                        m,
                        receiver,
                        &receiver_ty,
                        method,
                        args,
                        expr,
                    ),
                }
            }

            Type::Map(_, value) => {
                let value = value.as_ref().clone();
                match name.as_str() {
                    "size" => {
                        self.emit_expr(class, m, receiver)?;
                        m.code
                            .invokeinterface(&mut class.file.pool, "java/util/Map", "size", "()I");
                        Ok(Type::Int)
                    }
                    "get" => {
                        self.emit_expr(class, m, receiver)?;
                        let arg_ty = self.emit_expr(class, m, &args[0])?;
                        self.box_value(class, m, &arg_ty);
                        m.code.invokeinterface(
                            &mut class.file.pool,
                            "java/util/Map",
                            "get",
                            "(Ljava/lang/Object;)Ljava/lang/Object;",
                        );
                        self.unbox_or_cast(class, m, &value)?;
                        Ok(value)
                    }
                    _ => self.emit_extension_or_fail(
                        class,
                        m,
                        receiver,
                        &receiver_ty,
                        method,
                        args,
                        expr,
                    ),
                }
            }

            Type::Str => match name.as_str() {
                "length" => {
                    self.emit_expr(class, m, receiver)?;
                    m.code.invokevirtual(
                        &mut class.file.pool,
                        "java/lang/String",
                        "length",
                        "()I",
                    );
                    Ok(Type::Int)
                }
                "substring" => {
                    self.emit_expr(class, m, receiver)?;
                    for arg in args {
                        let arg_ty = self.emit_expr(class, m, arg)?;
                        self.adapt(class, m, &arg_ty, &Type::Int, arg.span)?;
                    }
                    m.code.invokevirtual(
                        &mut class.file.pool,
                        "java/lang/String",
                        "substring",
                        "(II)Ljava/lang/String;",
                    );
                    Ok(Type::Str)
                }
                _ => self.emit_extension_or_fail(
                    class,
                    m,
                    receiver,
                    &receiver_ty,
                    method,
                    args,
                    expr,
                ),
            },

            Type::Structural(members) => {
                let Some(Type::Function(sig)) = members.get(name).cloned() else {
                    return Err(EmitError::Unsupported {
                        what: format!("call to {} on a structural type", name),
                        span: expr.span,
                    });
                };
                self.emit_expr(class, m, receiver)?;
                self.emit_reflective_call(class, m, name, &sig, args, expr.span)
            }

            _ => self.emit_extension_or_fail(class, m, receiver, &receiver_ty, method, args, expr),
        }
    }

    /// Tries the extension-method carrier for the receiver's type; the
    /// receiver becomes the first static argument.
    #[allow(clippy::too_many_arguments)]
    fn emit_extension_or_fail(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        receiver: &Expr,
        receiver_ty: &Type,
        method: &Ident,
        args: &[Expr],
        expr: &Expr,
    ) -> EmitResult<Type> {
        let key = type_key(receiver_ty);
        let Some(sig) = self
            .extensions
            .get(&key)
            .and_then(|methods| methods.get(&method.name))
            .cloned()
        else {
            return Err(EmitError::Unsupported {
                what: format!("method {} on {}", method.name, receiver_ty),
                span: expr.span,
            });
        };

        self.emit_expr(class, m, receiver)?;
        self.emit_call_args(class, m, &sig, args)?;

        let mut full_params = vec![receiver_ty.clone()];
        full_params.extend(sig.params.iter().cloned());
        let carrier = format!("{}$Extension", key);
        m.code.invokestatic(
            &mut class.file.pool,
            &carrier,
            &method.name,
            &method_descriptor(&full_params, &sig.ret),
        );
        Ok(sig.ret.as_ref().clone())
    }

    /// Emits the arguments of a direct call, adapting each to its
    /// parameter type.
    fn emit_call_args(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        sig: &FunctionType,
        args: &[Expr],
    ) -> EmitResult<()> {
        for (arg, param) in args.iter().zip(&sig.params) {
            let arg_ty = self.emit_expr(class, m, arg)?;
            self.adapt(class, m, &arg_ty, param, arg.span)?;
        }
        Ok(())
    }

    /// Invokes the single abstract method of the function value on the
    /// stack, boxing arguments into object-shaped interfaces and
    /// casting-and-unboxing the result back to its semantic type.
    fn emit_sam_call(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        fn_ty: &FunctionType,
        args: &[Expr],
        span: Span,
    ) -> EmitResult<Type> {
        let shape = shapes::shape_for(&fn_ty.params, &fn_ty.ret, span)?;

        let erased_params = shape.erased_params();
        for ((arg, param), erased) in args.iter().zip(&fn_ty.params).zip(erased_params) {
            let arg_ty = self.emit_expr(class, m, arg)?;
            if erased == "Ljava/lang/Object;" {
                // Object-positioned parameter: box primitives, pass
                // references through.
                self.box_value(class, m, &arg_ty);
            } else {
                self.adapt(class, m, &arg_ty, param, arg.span)?;
            }
        }

        m.code.invokeinterface(
            &mut class.file.pool,
            shape.interface,
            shape.method,
            shape.erased,
        );

        let ret = fn_ty.ret.as_ref().clone();
        if shape.erased.ends_with("Ljava/lang/Object;") {
            self.unbox_or_cast(class, m, &ret)?;
        }
        Ok(ret)
    }

    /// Reflective invocation for structural receivers: the member's
    /// declared signature supplies the parameter classes for the lookup.
    fn emit_reflective_call(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        name: &str,
        sig: &FunctionType,
        args: &[Expr],
        _span: Span,
    ) -> EmitResult<Type> {
        // [receiver] -> [receiver, Method]
        m.code.dup();
        m.code.invokevirtual(
            &mut class.file.pool,
            OBJECT,
            "getClass",
            "()Ljava/lang/Class;",
        );
        m.code.ldc_string(&mut class.file.pool, name);
        m.code.iconst(sig.params.len() as i32);
        m.code.anewarray(&mut class.file.pool, "java/lang/Class");
        for (i, param) in sig.params.iter().enumerate() {
            m.code.dup();
            m.code.iconst(i as i32);
            self.emit_class_constant(class, m, param);
            m.code.aastore();
        }
        m.code.invokevirtual(
            &mut class.file.pool,
            "java/lang/Class",
            "getMethod",
            "(Ljava/lang/String;[Ljava/lang/Class;)Ljava/lang/reflect/Method;",
        );
        m.code.swap();

        // [Method, receiver] -> [Method, receiver, Object[]]
        m.code.iconst(args.len() as i32);
        m.code.anewarray(&mut class.file.pool, OBJECT);
        for (i, arg) in args.iter().enumerate() {
            m.code.dup();
            m.code.iconst(i as i32);
            let arg_ty = self.emit_expr(class, m, arg)?;
            self.box_value(class, m, &arg_ty);
            m.code.aastore();
        }

        m.code.invokevirtual(
            &mut class.file.pool,
            "java/lang/reflect/Method",
            "invoke",
            "(Ljava/lang/Object;[Ljava/lang/Object;)Ljava/lang/Object;",
        );

        let ret = sig.ret.as_ref().clone();
        self.unbox_or_cast(class, m, &ret)?;
        Ok(ret)
    }

    /// Pushes the `Class` object describing a parameter type, using the
    /// primitive `TYPE` fields where the descriptor is primitive.
    fn emit_class_constant(&mut self, class: &mut ClassCtx, m: &mut MethodCtx, ty: &Type) {
        match ty {
            Type::Int => m.code.getstatic(
                &mut class.file.pool,
                "java/lang/Integer",
                "TYPE",
                "Ljava/lang/Class;",
            ),
            Type::Double => m.code.getstatic(
                &mut class.file.pool,
                "java/lang/Double",
                "TYPE",
                "Ljava/lang/Class;",
            ),
            Type::Bool => m.code.getstatic(
                &mut class.file.pool,
                "java/lang/Boolean",
                "TYPE",
                "Ljava/lang/Class;",
            ),
            other => {
                let name = internal_name(other);
                m.code.ldc_class(&mut class.file.pool, &name);
            }
        }
    }

    fn emit_field_access(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        object: &Expr,
        field: &Ident,
        expr: &Expr,
    ) -> EmitResult<Type> {
        let object_ty = self.expr_ty(object)?;

        if let Some(type_name) = object_ty.name().map(str::to_string) {
            if self.classes.contains_key(&type_name) {
                if let Some((field_owner, ty)) = self.find_field(&type_name, &field.name) {
                    self.emit_expr(class, m, object)?;
                    m.code.getfield(
                        &mut class.file.pool,
                        &field_owner,
                        &field.name,
                        &field_descriptor(&ty),
                    );
                    return Ok(ty);
                }
                if let Some(sig) = self.find_method(&type_name, &field.name) {
                    // A method read as a value: materialise with the
                    // receiver captured.
                    self.emit_expr(class, m, object)?;
                    let captures = format!("(L{};", type_name);
                    self.emit_indy(
                        class,
                        m,
                        &sig,
                        REF_INVOKE_VIRTUAL,
                        &type_name,
                        &field.name,
                        &method_descriptor(&sig.params, &sig.ret),
                        &captures,
                        expr.span,
                    )?;
                    return Ok(Type::Function(sig));
                }
                return Err(EmitError::MethodReference {
                    name: field.name.clone(),
                    span: expr.span,
                });
            }
        }

        // Structural and erased receivers read members reflectively.
        let member_ty = self.expr_ty(expr)?;
        self.emit_expr(class, m, object)?;
        self.emit_reflective_field_get(class, m, &field.name, &member_ty)
    }

    fn emit_reflective_field_get(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        name: &str,
        member_ty: &Type,
    ) -> EmitResult<Type> {
        // [receiver] -> [receiver, Field]
        m.code.dup();
        m.code.invokevirtual(
            &mut class.file.pool,
            OBJECT,
            "getClass",
            "()Ljava/lang/Class;",
        );
        m.code.ldc_string(&mut class.file.pool, name);
        m.code.invokevirtual(
            &mut class.file.pool,
            "java/lang/Class",
            "getDeclaredField",
            "(Ljava/lang/String;)Ljava/lang/reflect/Field;",
        );
        m.code.dup();
        m.code.iconst(1);
        m.code.invokevirtual(
            &mut class.file.pool,
            "java/lang/reflect/Field",
            "setAccessible",
            "(Z)V",
        );
        m.code.swap();
        m.code.invokevirtual(
            &mut class.file.pool,
            "java/lang/reflect/Field",
            "get",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
        );
        self.unbox_or_cast(class, m, member_ty)?;
        Ok(member_ty.clone())
    }

    // ========== Value adaptation ==========

    pub(crate) fn load_slot(&self, m: &mut MethodCtx, slot: u16, ty: &Type) {
        match ty {
            Type::Int | Type::Bool => m.code.iload(slot),
            Type::Double => m.code.dload(slot),
            _ => m.code.aload(slot),
        }
    }

    fn store_slot(&self, m: &mut MethodCtx, slot: u16, ty: &Type) {
        match ty {
            Type::Int | Type::Bool => m.code.istore(slot),
            Type::Double => m.code.dstore(slot),
            _ => m.code.astore(slot),
        }
    }

    fn box_value(&self, class: &mut ClassCtx, m: &mut MethodCtx, ty: &Type) {
        let (class_name, desc) = match ty {
            Type::Int => ("java/lang/Integer", "(I)Ljava/lang/Integer;"),
            Type::Double => ("java/lang/Double", "(D)Ljava/lang/Double;"),
            Type::Bool => ("java/lang/Boolean", "(Z)Ljava/lang/Boolean;"),
            _ => return,
        };
        m.code
            .invokestatic(&mut class.file.pool, class_name, "valueOf", desc);
    }

    /// Adapts an Object on the stack down to a semantic type: unboxing for
    /// primitives, checkcast for concrete references, pop for unit.
    fn unbox_or_cast(&self, class: &mut ClassCtx, m: &mut MethodCtx, to: &Type) -> EmitResult<()> {
        match to {
            Type::Unit => {
                m.code.pop_value();
                Ok(())
            }
            Type::Int | Type::Double | Type::Bool => {
                let (box_name, method, desc) = box_class(to).expect("primitive has a box");
                m.code.checkcast(&mut class.file.pool, box_name);
                m.code
                    .invokevirtual(&mut class.file.pool, box_name, method, desc);
                Ok(())
            }
            Type::Any | Type::Var(_) | Type::Structural(_) | Type::Null | Type::Nothing => Ok(()),
            other => {
                m.code.checkcast(&mut class.file.pool, &internal_name(other));
                Ok(())
            }
        }
    }

    /// Adapts the value on top of the stack from one semantic type to
    /// another: boxing, unboxing, and reference casts as required.
    pub(crate) fn adapt(
        &mut self,
        class: &mut ClassCtx,
        m: &mut MethodCtx,
        from: &Type,
        to: &Type,
        span: Span,
    ) -> EmitResult<()> {
        if from == to || *to == Type::Any {
            return Ok(());
        }

        match to {
            Type::Int | Type::Double | Type::Bool => {
                if from == to {
                    return Ok(());
                }
                if is_reference(from) {
                    return self.unbox_or_cast(class, m, to);
                }
                Err(EmitError::Unsupported {
                    what: format!("conversion from {} to {}", from, to),
                    span,
                })
            }

            Type::Unit => {
                if *from != Type::Unit {
                    m.code.pop_value();
                }
                Ok(())
            }

            Type::Function(to_fn) => {
                if let Type::Function(from_fn) = from {
                    let to_shape = shapes::shape_for(&to_fn.params, &to_fn.ret, span)?;
                    let from_shape = shapes::shape_for(&from_fn.params, &from_fn.ret, span)?;
                    if to_shape != from_shape {
                        return Err(EmitError::Unsupported {
                            what: format!("adapting {} to {}", from, to),
                            span,
                        });
                    }
                    return Ok(());
                }
                if !is_reference(from) {
                    return Err(EmitError::Unsupported {
                        what: format!("conversion from {} to {}", from, to),
                        span,
                    });
                }
                Ok(())
            }

            _ => {
                if !is_reference(from) {
                    self.box_value(class, m, from);
                    return Ok(());
                }
                // Erased sources are narrowed with a cast; upcasts need
                // nothing.
                if matches!(from, Type::Any | Type::Var(_) | Type::Structural(_)) {
                    return self.unbox_or_cast(class, m, to);
                }
                Ok(())
            }
        }
    }
}

/// The descriptor of a lambda's implementation method: parameters by their
/// field descriptors, unit returns widened to Object so object-shaped
/// interfaces can be satisfied.
fn lambda_impl_descriptor(fn_ty: &FunctionType) -> String {
    let mut out = String::from("(");
    for p in &fn_ty.params {
        out.push_str(&field_descriptor(p));
    }
    out.push(')');
    if *fn_ty.ret == Type::Unit {
        out.push_str("Ljava/lang/Object;");
    } else {
        out.push_str(&field_descriptor(&fn_ty.ret));
    }
    out
}

fn int_arith_opcode(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Add => 0x60,
        BinaryOp::Sub => 0x64,
        BinaryOp::Mul => 0x68,
        BinaryOp::Div => 0x6c,
        BinaryOp::Mod => 0x70,
        _ => unreachable!("not an arithmetic operator"),
    }
}

fn double_arith_opcode(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Add => 0x63,
        BinaryOp::Sub => 0x67,
        BinaryOp::Mul => 0x6b,
        BinaryOp::Div => 0x6f,
        BinaryOp::Mod => 0x73,
        _ => unreachable!("not an arithmetic operator"),
    }
}

fn comparison_cond(op: BinaryOp) -> Cond {
    match op {
        BinaryOp::Eq => Cond::Eq,
        BinaryOp::NotEq => Cond::Ne,
        BinaryOp::Lt => Cond::Lt,
        BinaryOp::LtEq => Cond::Le,
        BinaryOp::Gt => Cond::Gt,
        BinaryOp::GtEq => Cond::Ge,
        _ => unreachable!("not a comparison operator"),
    }
}

/// Instantiates a generic definition with the given arguments by
/// substituting its parameter variables throughout the base type.
///
/// Duplicated from `sable_typeck::resolve`, which keeps the equivalent
/// logic private to the checker.
fn instantiate_generic(def: &sable_types::GenericDef, args: &[Type]) -> Type {
    let mut map = std::collections::HashMap::new();
    for (param, arg) in def.params.iter().zip(args) {
        map.insert(param.name.clone(), arg.clone());
    }
    subst_vars(&def.base, &map)
}

fn subst_vars(ty: &Type, map: &std::collections::HashMap<String, Type>) -> Type {
    match ty {
        Type::Var(v) => map.get(&v.name).cloned().unwrap_or_else(|| ty.clone()),

        Type::List(t) => Type::List(Box::new(subst_vars(t, map))),
        Type::Set(t) => Type::Set(Box::new(subst_vars(t, map))),
        Type::Map(k, v) => Type::Map(Box::new(subst_vars(k, map)), Box::new(subst_vars(v, map))),

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
            superclass: c.superclass.as_ref().map(|s| Box::new(subst_vars(s, map))),
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
            super_traits: t.super_traits.iter().map(|s| subst_vars(s, map)).collect(),
            members: t
                .members
                .iter()
                .map(|(n, m)| (n.clone(), subst_vars(m, map)))
                .collect(),
        }),

        Type::Object(o) => Type::Object(sable_types::ObjectType {
            name: o.name.clone(),
            superclass: o.superclass.as_ref().map(|s| Box::new(subst_vars(s, map))),
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
