//! The per-run working state of a validation.
//!
//! A [`ValidationSession`] is created at the start of a pipeline run, mutated
//! stage by stage, and discarded after the entity is materialized or the
//! aggregate failure is raised. It is never reused across runs and never
//! shared between threads. Validity is recomputed from the accumulated
//! errors, not cached.

use crate::core::context::{Bindings, EvalScope};
use crate::core::error::{ErrorKind, FieldError};
use crate::core::types::Value;
use crate::schema::definition::RecordDefinition;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Lifecycle of a session. Transitions are forward-only; a session is
/// single-pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Input normalized, nothing processed yet
    Initialized,
    /// All scalar fields went through coercion
    Coerced,
    /// All pipeline stages ran, including recursive nested sessions
    Staged,
    /// Terminal: valid or invalid
    Finalized,
}

/// Child sessions of a nested record field.
#[derive(Debug)]
pub enum NestedSessions {
    /// A single nested record; `None` when the input was absent
    One(Option<Box<ValidationSession>>),
    /// A collection of nested records
    Many(Vec<ValidationSession>),
}

impl NestedSessions {
    /// Whether every present child session is valid.
    pub fn valid(&self) -> bool {
        match self {
            NestedSessions::One(None) => true,
            NestedSessions::One(Some(session)) => session.valid(),
            NestedSessions::Many(sessions) => sessions.iter().all(|s| s.valid()),
        }
    }
}

/// Serializable snapshot of a run's outcome: `{changes, errors, valid}`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Whether the run accumulated no errors (nested included)
    pub valid: bool,
    /// Coerced/derived/mapped values for touched fields
    pub changes: IndexMap<String, Value>,
    /// All accumulated errors, nested ones folded in
    pub errors: Vec<FieldError>,
}

/// Mutable working result threaded through the pipeline.
pub struct ValidationSession {
    definition: Arc<RecordDefinition>,
    input: IndexMap<String, Value>,
    changes: IndexMap<String, Value>,
    errors: Vec<FieldError>,
    nested: IndexMap<String, NestedSessions>,
    coercion_failed: HashSet<String>,
    state: SessionState,
}

impl ValidationSession {
    /// Create a fresh session over normalized input.
    pub fn new(definition: Arc<RecordDefinition>, input: IndexMap<String, Value>) -> Self {
        Self {
            definition,
            input,
            changes: IndexMap::new(),
            errors: Vec::new(),
            nested: IndexMap::new(),
            coercion_failed: HashSet::new(),
            state: SessionState::Initialized,
        }
    }

    /// The owning definition.
    pub fn definition(&self) -> &Arc<RecordDefinition> {
        &self.definition
    }

    /// The raw input this run started from.
    pub fn input(&self) -> &IndexMap<String, Value> {
        &self.input
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Advance the lifecycle. Backward transitions are ignored.
    pub fn advance(&mut self, next: SessionState) {
        if next > self.state {
            self.state = next;
        }
    }

    // ========================================================================
    // Changes
    // ========================================================================

    /// All touched fields and their current values.
    pub fn changes(&self) -> &IndexMap<String, Value> {
        &self.changes
    }

    /// Current value of one field, if touched.
    pub fn change(&self, field: &str) -> Option<&Value> {
        self.changes.get(field)
    }

    /// Set (or overwrite) a field's value.
    pub fn set_change(&mut self, field: impl Into<String>, value: Value) {
        self.changes.insert(field.into(), value);
    }

    /// Mark a field as failed coercion: terminal, later stages skip it.
    pub fn mark_coercion_failure(&mut self, field: impl Into<String>) {
        self.coercion_failed.insert(field.into());
    }

    /// Whether a field failed coercion.
    pub fn field_failed(&self, field: &str) -> bool {
        self.coercion_failed.contains(field)
    }

    // ========================================================================
    // Errors
    // ========================================================================

    /// Record an error. Never aborts the run.
    pub fn add_error(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    /// This session's own errors (nested sessions not included).
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// All errors including nested sessions', folded in keyed by nested
    /// field name.
    pub fn all_errors(&self) -> Vec<FieldError> {
        let mut all = self.errors.clone();
        for (name, sessions) in &self.nested {
            if !sessions.valid() {
                let children = match sessions {
                    NestedSessions::One(Some(session)) => session.all_errors(),
                    NestedSessions::One(None) => Vec::new(),
                    NestedSessions::Many(list) => {
                        list.iter().flat_map(|s| s.all_errors()).collect()
                    }
                };
                all.push(
                    FieldError::new(name.clone(), ErrorKind::Nested, "is invalid")
                        .with_children(children),
                );
            }
        }
        all
    }

    /// Whether the run accumulated no errors. Recomputed, not cached.
    pub fn valid(&self) -> bool {
        self.errors.is_empty() && self.nested.values().all(|n| n.valid())
    }

    // ========================================================================
    // Nested Sessions
    // ========================================================================

    /// Attach the child sessions of a nested field.
    pub fn set_nested(&mut self, field: impl Into<String>, sessions: NestedSessions) {
        self.nested.insert(field.into(), sessions);
    }

    /// Child sessions keyed by nested field name.
    pub fn nested(&self) -> &IndexMap<String, NestedSessions> {
        &self.nested
    }

    /// Child sessions of one nested field.
    pub fn nested_sessions(&self, field: &str) -> Option<&NestedSessions> {
        self.nested.get(field)
    }

    // ========================================================================
    // Scope Building
    // ========================================================================

    /// Scope for a derive rule: bindings, then every change made so far in
    /// this pass, then the field's own value.
    ///
    /// Derive runs after the whole record coerced, so all coerced siblings
    /// are visible regardless of declaration order.
    pub fn scope_for_derive(&self, bindings: &Bindings, field: &str) -> EvalScope {
        let mut scope = EvalScope::with_bindings(bindings);
        for (name, value) in &self.changes {
            scope.insert(name.clone(), value.clone());
        }
        self.finish_scope(scope, field)
    }

    /// Scope for validations, block clauses, guards, and map: bindings, then
    /// only changes of fields declared before this one, then the field's own
    /// value.
    pub fn scope_for_rule(&self, bindings: &Bindings, field: &str) -> EvalScope {
        let mut scope = EvalScope::with_bindings(bindings);
        let field_index = self
            .definition
            .field_index(field)
            .unwrap_or(usize::MAX);
        for (name, value) in &self.changes {
            let index = self.definition.field_index(name).unwrap_or(usize::MAX);
            if index < field_index {
                scope.insert(name.clone(), value.clone());
            }
        }
        self.finish_scope(scope, field)
    }

    fn finish_scope(&self, mut scope: EvalScope, field: &str) -> EvalScope {
        let current = self.changes.get(field).cloned().unwrap_or(Value::Null);
        scope.insert(field.to_string(), current.clone());
        scope.set_current(current);
        scope
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Snapshot of the run outcome: `{changes, errors, valid}`.
    pub fn report(&self) -> RunReport {
        RunReport {
            valid: self.valid(),
            changes: self.changes.clone(),
            errors: self.all_errors(),
        }
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        if self.valid() {
            "✓ record is valid".to_string()
        } else {
            format!(
                "✗ validation failed with {} error(s)",
                self.all_errors().len()
            )
        }
    }
}

impl std::fmt::Debug for ValidationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationSession")
            .field("definition", &self.definition.name())
            .field("state", &self.state)
            .field("changes", &self.changes)
            .field("errors", &self.errors)
            .field("nested", &self.nested.keys().collect::<Vec<_>>())
            .finish()
    }
}
