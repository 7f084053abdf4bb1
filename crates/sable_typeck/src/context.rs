//! The scoped type context used during checking.

use sable_types::Type;
use std::collections::HashMap;

/// A stack of lexical scopes mapping names to semantic types, plus the
/// current `this` binding.
///
/// The bottom scope is the global context populated by the collection
/// pass; every block, function body, and member-checking context pushes a
/// scope on top of it.
#[derive(Clone, Debug, Default)]
pub struct TypeContext {
    scopes: Vec<HashMap<String, Type>>,
    this_stack: Vec<Type>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
            this_stack: Vec::new(),
        }
    }

    /// Enter a new scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Exit the current scope.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Define a name in the current scope.
    pub fn define(&mut self, name: impl Into<String>, ty: Type) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), ty);
        }
    }

    /// Define a name in the global (bottom) scope.
    pub fn define_global(&mut self, name: impl Into<String>, ty: Type) {
        if let Some(scope) = self.scopes.first_mut() {
            scope.insert(name.into(), ty);
        }
    }

    /// Look a name up, innermost scope first.
    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Look a name up in the global scope only.
    pub fn lookup_global(&self, name: &str) -> Option<&Type> {
        self.scopes.first().and_then(|scope| scope.get(name))
    }

    /// Returns true if the name is bound in the global scope.
    pub fn is_defined_global(&self, name: &str) -> bool {
        self.lookup_global(name).is_some()
    }

    /// Iterates the global scope's bindings.
    pub fn globals(&self) -> impl Iterator<Item = (&String, &Type)> {
        self.scopes.first().into_iter().flat_map(|scope| scope.iter())
    }

    /// Bind `this` for the duration of a member-checking context.
    pub fn push_this(&mut self, ty: Type) {
        self.this_stack.push(ty);
    }

    pub fn pop_this(&mut self) {
        self.this_stack.pop();
    }

    /// The current `this` binding, if any.
    pub fn this_type(&self) -> Option<&Type> {
        self.this_stack.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoping_shadows_and_restores() {
        let mut ctx = TypeContext::new();
        ctx.define("x", Type::Int);
        ctx.push_scope();
        ctx.define("x", Type::Str);
        assert_eq!(ctx.lookup("x"), Some(&Type::Str));
        ctx.pop_scope();
        assert_eq!(ctx.lookup("x"), Some(&Type::Int));
    }

    #[test]
    fn test_global_define_from_inner_scope() {
        let mut ctx = TypeContext::new();
        ctx.push_scope();
        ctx.define_global("f", Type::Unit);
        ctx.pop_scope();
        assert_eq!(ctx.lookup("f"), Some(&Type::Unit));
    }

    #[test]
    fn test_this_stack() {
        let mut ctx = TypeContext::new();
        assert!(ctx.this_type().is_none());
        ctx.push_this(Type::Int);
        assert_eq!(ctx.this_type(), Some(&Type::Int));
        ctx.pop_this();
        assert!(ctx.this_type().is_none());
    }
}
