//! Lexically scoped, shared, mutable environments.
//!
//! An [`Environment`] is a cheap handle to one scope. Every closure created in
//! a scope holds a handle to it, and every child scope holds its parent, so a
//! scope lives as long as anything still refers to it. Each scope's binding
//! table sits behind its own lock: individual `set`/`get`/`update` operations
//! are atomic even when `go` sequences share the scope, while sequences of
//! operations written in the guest language are not.

use crate::ast::Node;
use crate::{EvalError, EvalResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

struct Frame {
    name: String,
    bindings: RwLock<HashMap<String, Node>>,
    parent: Option<Environment>,
}

/// Handle to a scope: a name→node table plus an optional parent.
#[derive(Clone)]
pub struct Environment(Arc<Frame>);

impl Environment {
    /// A scope with no parent.
    pub fn new(name: impl Into<String>) -> Self {
        Environment(Arc::new(Frame {
            name: name.into(),
            bindings: RwLock::new(HashMap::new()),
            parent: None,
        }))
    }

    /// A new, empty scope whose parent is `self`.
    pub fn child(&self, name: impl Into<String>) -> Self {
        Environment(Arc::new(Frame {
            name: name.into(),
            bindings: RwLock::new(HashMap::new()),
            parent: Some(self.clone()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    /// Bind `name` in this exact scope. Fails if this scope already binds it;
    /// shadowing a binding from an enclosing scope is fine.
    pub fn set(&self, name: &str, value: Node) -> EvalResult<()> {
        let mut bindings = self.0.bindings.write();
        if bindings.contains_key(name) {
            return Err(EvalError::name(format!("Cannot redefine a name: {name}")));
        }
        bindings.insert(name.to_owned(), value);
        Ok(())
    }

    /// Bind or overwrite `name` in this scope. Used to seed the root scope.
    pub(crate) fn define(&self, name: &str, value: Node) {
        self.0.bindings.write().insert(name.to_owned(), value);
    }

    /// Look `name` up in this scope, then in each enclosing scope.
    pub fn get(&self, name: &str) -> Option<Node> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            if let Some(value) = env.0.bindings.read().get(name) {
                return Some(value.clone());
            }
            scope = env.parent();
        }
        None
    }

    /// Rebind `name` in the nearest scope that already binds it.
    /// Returns `false` when no scope in the chain does.
    pub fn update(&self, name: &str, value: Node) -> bool {
        let mut scope = Some(self);
        while let Some(env) = scope {
            if let Some(slot) = env.0.bindings.write().get_mut(name) {
                *slot = value;
                return true;
            }
            scope = env.parent();
        }
        false
    }

    /// Bindings made directly in this scope, sorted by name.
    pub fn local_bindings(&self) -> Vec<(String, Node)> {
        let mut result: Vec<_> = self
            .0
            .bindings
            .read()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Every visible binding, inner scopes shadowing outer ones, sorted by name.
    pub fn all_bindings(&self) -> Vec<(String, Node)> {
        let mut bindings = HashMap::new();
        let mut scope = Some(self);
        while let Some(env) = scope {
            for (name, value) in env.0.bindings.read().iter() {
                bindings
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
            scope = env.parent();
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Whether two handles refer to the same scope.
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment({})", self.name())
    }
}
