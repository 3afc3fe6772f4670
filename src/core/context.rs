//! Evaluation scope and external bindings.
//!
//! An [`EvalScope`] is the name→value environment one rule evaluation sees.
//! It is assembled per evaluation from external bindings, the visible slice
//! of the session's changes, and the current field's own value — and is
//! discarded immediately after. The pipeline owns the assembly rules (which
//! sibling fields are visible at which stage); this module only holds the
//! containers.

use crate::core::types::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Caller-supplied external bindings for one validation run.
///
/// Bindings parameterize declared rules per call: the same definition can be
/// validated against different thresholds without re-declaring anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bindings {
    values: IndexMap<String, Value>,
}

impl Bindings {
    /// Create an empty binding set.
    pub fn new() -> Self {
        Self {
            values: IndexMap::new(),
        }
    }

    /// Add a binding, consuming and returning self for chaining.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Insert a binding.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Get a binding by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Check if a binding exists.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Check if there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Iterate over all bindings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

impl From<IndexMap<String, Value>> for Bindings {
    fn from(values: IndexMap<String, Value>) -> Self {
        Self { values }
    }
}

/// The name→value environment visible to one rule evaluation.
///
/// Later insertions shadow earlier ones on name collision, which gives the
/// required precedence when the scope is layered bindings-first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalScope {
    names: IndexMap<String, Value>,
    current: Option<Value>,
}

impl EvalScope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self {
            names: IndexMap::new(),
            current: None,
        }
    }

    /// Create a scope pre-populated with external bindings.
    pub fn with_bindings(bindings: &Bindings) -> Self {
        let mut scope = Self::new();
        for (name, value) in bindings.iter() {
            scope.insert(name.clone(), value.clone());
        }
        scope
    }

    /// Insert a name, shadowing any earlier entry.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.names.insert(name.into(), value);
    }

    /// Set the current field's own value (for one-argument rules).
    pub fn set_current(&mut self, value: Value) {
        self.current = Some(value);
    }

    /// Resolve a name.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.names.get(name)
    }

    /// The current field's own value, if set.
    pub fn current(&self) -> Option<&Value> {
        self.current.as_ref()
    }

    /// Number of resolvable names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the scope has no names.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_builder() {
        let bindings = Bindings::new()
            .with("max_age", Value::Integer(100))
            .with("country", Value::String("se".into()));

        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings.get("max_age"), Some(&Value::Integer(100)));
        assert!(!bindings.contains("min_age"));
    }

    #[test]
    fn test_scope_shadowing() {
        let bindings = Bindings::new().with("age", Value::Integer(1));
        let mut scope = EvalScope::with_bindings(&bindings);

        // A field change with the same name shadows the binding
        scope.insert("age", Value::Integer(2));
        assert_eq!(scope.lookup("age"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_scope_current_value() {
        let mut scope = EvalScope::new();
        assert!(scope.current().is_none());

        scope.set_current(Value::String("x".into()));
        assert_eq!(scope.current(), Some(&Value::String("x".into())));
    }
}
