//! Namespaces: mutable name-to-variable maps shared by reference.

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::commands::Callable;
use crate::value::Value;
use crate::vars::Variable;

/// The suffix distinguishing function variables: `fn greet` defines the
/// variable `greet~`, and a form head `greet` resolves it.
pub const FN_SUFFIX: &str = "~";

/// A mapping from names to variables.
///
/// Cloning an `Ns` clones the handle. A closure's captured namespace and the
/// scope it captured from are the same object, so rebinding a name in one is
/// visible through the other.
#[derive(Clone, Debug, Default)]
pub struct Ns {
    slots: Arc<RwLock<IndexMap<String, Variable>>>,
}

impl Ns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a variable. The returned handle shares the cell, so it stays
    /// valid even if the slot is later rebound or deleted.
    pub fn get(&self, name: &str) -> Option<Variable> {
        self.read().get(name).cloned()
    }

    /// Binds `name` to `var`, replacing any previous binding.
    pub fn assign(&self, name: impl Into<String>, var: Variable) {
        self.write().insert(name.into(), var);
    }

    /// Binds `name` to a fresh mutable variable holding `value`.
    pub fn add_var(&self, name: impl Into<String>, value: Value) {
        self.assign(name, Variable::new(value));
    }

    /// Binds the function variable `name~` to a read-only fn value.
    pub fn add_fn(&self, name: &str, f: Arc<dyn Callable>) {
        self.assign(
            format!("{name}{FN_SUFFIX}"),
            Variable::read_only(Value::Fn(f)),
        );
    }

    /// Removes a binding. Existing handles to the variable keep working.
    pub fn del(&self, name: &str) -> bool {
        self.write().shift_remove(name).is_some()
    }

    pub fn has(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// The bound names, in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Whether two handles refer to the same namespace object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slots, &other.slots)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<String, Variable>> {
        self.slots
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<String, Variable>> {
        self.slots
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn clones_share_bindings() {
        let a = Ns::new();
        let b = a.clone();
        a.add_var("x", Value::Int(1));
        assert_eq!(b.get("x").unwrap().get().unwrap(), Value::Int(1));
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn deleting_a_slot_does_not_kill_existing_handles() {
        let ns = Ns::new();
        ns.add_var("x", Value::Int(1));
        let handle = ns.get("x").unwrap();
        assert!(ns.del("x"));
        assert!(!ns.has("x"));
        assert_eq!(handle.get().unwrap(), Value::Int(1));
    }

    #[test]
    fn rebinding_replaces_the_cell() {
        let ns = Ns::new();
        ns.add_var("x", Value::Int(1));
        let old = ns.get("x").unwrap();
        ns.add_var("x", Value::Int(2));
        let new = ns.get("x").unwrap();
        assert!(!old.cell_eq(&new));
        assert_eq!(old.get().unwrap(), Value::Int(1));
    }

    #[test]
    fn names_keep_insertion_order() {
        let ns = Ns::new();
        ns.add_var("b", Value::Nil);
        ns.add_var("a", Value::Nil);
        assert_eq!(ns.names(), vec!["b".to_string(), "a".to_string()]);
    }
}
