//! Error types for Remold.
//!
//! Uses thiserror for structured errors with context. Errors are designed to:
//! - Be serializable for embedding in API responses
//! - Accumulate per field without aborting the run
//! - Carry metadata for message templates ("must be less than {number}")

use crate::core::types::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Top-level error type for Remold.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum RemoldError {
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Invalid record: {0}")]
    Invalid(#[from] InvalidRecord),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// A raw value could not be converted into a field's internal type.
///
/// Coercion failure is terminal for the field: later pipeline stages skip it.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("cannot coerce {got} into {expected}")]
pub struct CoerceError {
    /// Display name of the target type.
    pub expected: String,
    /// Shape of the offending raw value.
    pub got: String,
}

/// A deferred rule body failed to evaluate.
///
/// These never propagate past the evaluator boundary: the pipeline converts
/// every one of them into a field error on the field being processed.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EvalError {
    #[error("unknown name '{0}' in scope")]
    UnknownName(String),

    #[error("operator '{op}' cannot be applied to {got}")]
    TypeMismatch { op: String, got: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("{0}")]
    Failed(String),
}

/// Errors raised while building a record definition.
///
/// Definitions are validated once at construction; a definition that builds
/// successfully never produces these at run time.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefinitionError {
    #[error("duplicate field '{0}'")]
    DuplicateField(String),

    #[error("nested field '{0}' collides with a scalar field of the same name")]
    NestedNameCollision(String),

    #[error("unknown field '{0}' referenced in rule attachment")]
    UnknownField(String),

    #[error("rule '{rule}' on field '{field}' declares the wrong arity")]
    RuleArity { field: String, rule: String },

    #[error("default value for field '{field}' does not coerce: {source}")]
    BadDefault {
        field: String,
        #[source]
        source: CoerceError,
    },

    #[error("format pattern on field '{field}' does not compile: {pattern}")]
    BadFormat { field: String, pattern: String },
}

// ============================================================================
// Field Errors
// ============================================================================

/// The category of a per-field error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Raw value did not coerce; terminal for the field.
    Coercion,
    /// Required field absent after coercion.
    Required,
    /// A structured constraint failed; carries the constraint kind.
    Constraint(String),
    /// A block clause condition matched and its outcome failed.
    BlockClause,
    /// The boolean guard was falsy or failed to evaluate.
    GuardFailed,
    /// The rule body itself failed to evaluate or returned an
    /// unrecognized shape.
    Evaluator,
    /// A nested record produced errors of its own.
    Nested,
}

/// One accumulated error on one field.
///
/// The message is a template: `{name}` placeholders are substituted from
/// `params` when rendered, so the offending bound survives as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field the error is attached to.
    pub field: String,
    /// Error category.
    pub kind: ErrorKind,
    /// Message template with `{name}` placeholders.
    pub message: String,
    /// Named metadata substituted into the template.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub params: IndexMap<String, Value>,
    /// Index of the block clause that produced this error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clause: Option<usize>,
    /// Errors of the nested sub-session (kind == Nested only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FieldError>,
}

impl FieldError {
    /// Create a new field error.
    pub fn new(field: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
            params: IndexMap::new(),
            clause: None,
            children: Vec::new(),
        }
    }

    /// Attach a named metadata value.
    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Attach a block clause index.
    pub fn with_clause(mut self, index: usize) -> Self {
        self.clause = Some(index);
        self
    }

    /// Attach the errors of a nested sub-session.
    pub fn with_children(mut self, children: Vec<FieldError>) -> Self {
        self.children = children;
        self
    }

    /// Render the message with `{name}` placeholders substituted from params.
    pub fn rendered(&self) -> String {
        render_template(&self.message, &self.params)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.rendered())
    }
}

/// Substitute `{name}` placeholders in a template from a metadata map.
///
/// Unknown placeholders are left as-is so a malformed template still renders.
pub fn render_template(template: &str, params: &IndexMap<String, Value>) -> String {
    let mut rendered = template.to_string();
    for (name, value) in params {
        let placeholder = format!("{{{}}}", name);
        if rendered.contains(&placeholder) {
            rendered = rendered.replace(&placeholder, &display_bare(value));
        }
    }
    rendered
}

/// Display a value without string quoting, for message interpolation.
fn display_bare(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Aggregate Failure
// ============================================================================

/// The aggregate failure raised by the checked entity constructor.
///
/// Always a single value carrying the original input and every field's
/// rendered messages; never one error per field.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidRecord {
    /// The raw input the run started from.
    pub input: IndexMap<String, Value>,
    /// Rendered messages grouped by field name.
    pub errors: IndexMap<String, Vec<String>>,
}

impl InvalidRecord {
    /// Build the aggregate from accumulated field errors.
    ///
    /// Nested errors flatten into their parent's entry as
    /// `"sub_field: message"` (dotted paths for deeper nesting).
    pub fn new(input: IndexMap<String, Value>, field_errors: &[FieldError]) -> Self {
        let mut errors: IndexMap<String, Vec<String>> = IndexMap::new();
        for error in field_errors {
            let messages = errors.entry(error.field.clone()).or_default();
            flatten_rendered(error, "", messages);
        }
        Self { input, errors }
    }

    /// Total number of rendered messages across all fields.
    pub fn error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }
}

/// Render an error (or its nested children, recursively) into a message list.
fn flatten_rendered(error: &FieldError, path: &str, messages: &mut Vec<String>) {
    if error.kind == ErrorKind::Nested && !error.children.is_empty() {
        for child in &error.children {
            let child_path = if path.is_empty() {
                child.field.clone()
            } else {
                format!("{}.{}", path, child.field)
            };
            flatten_rendered(child, &child_path, messages);
        }
    } else if path.is_empty() {
        messages.push(error.rendered());
    } else {
        messages.push(format!("{}: {}", path, error.rendered()));
    }
}

impl fmt::Display for InvalidRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "validation failed with {} error(s) across {} field(s)",
            self.error_count(),
            self.errors.len()
        )
    }
}

/// Result type alias for Remold operations.
pub type RemoldResult<T> = Result<T, RemoldError>;

/// Result type alias for definition construction.
pub type DefinitionResult<T> = Result<T, DefinitionError>;

/// Result type alias for rule evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template() {
        let error = FieldError::new(
            "age",
            ErrorKind::Constraint("less_than".into()),
            "must be less than {number}",
        )
        .with_param("number", Value::Integer(100));

        assert_eq!(error.rendered(), "must be less than 100");
    }

    #[test]
    fn test_render_string_param_unquoted() {
        let error = FieldError::new(
            "status",
            ErrorKind::Constraint("inclusion".into()),
            "is not one of {allowed}",
        )
        .with_param("allowed", Value::String("open, closed".into()));

        assert_eq!(error.rendered(), "is not one of open, closed");
    }

    #[test]
    fn test_unknown_placeholder_left_intact() {
        let error = FieldError::new("x", ErrorKind::Evaluator, "broken {template}");
        assert_eq!(error.rendered(), "broken {template}");
    }

    #[test]
    fn test_invalid_record_groups_by_field() {
        let errors = vec![
            FieldError::new("age", ErrorKind::Required, "is required"),
            FieldError::new(
                "age",
                ErrorKind::Constraint("greater_than".into()),
                "must be greater than {number}",
            )
            .with_param("number", Value::Integer(0)),
            FieldError::new("name", ErrorKind::Required, "is required"),
        ];

        let invalid = InvalidRecord::new(IndexMap::new(), &errors);
        assert_eq!(invalid.error_count(), 3);
        assert_eq!(invalid.errors["age"].len(), 2);
        assert_eq!(invalid.errors["age"][1], "must be greater than 0");
        assert_eq!(invalid.errors["name"], vec!["is required".to_string()]);
    }
}
