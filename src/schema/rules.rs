//! Field rules: structured constraints, block clauses, guards, and the
//! derive/map transforms.
//!
//! Standard validations are declared as data, not code — each [`Constraint`]
//! is checked independently and failures accumulate. Bounds are
//! [`Operand`]s, so a limit can be an inline value or a name resolved from
//! the evaluation scope (a sibling field or an external binding).

use crate::core::context::EvalScope;
use crate::core::error::{EvalError, EvalResult};
use crate::core::types::Value;
use crate::eval::evaluator::RuleBody;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A constraint bound: an inline value or a name resolved per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operand", content = "value", rename_all = "snake_case")]
pub enum Operand {
    /// Inline value baked into the definition
    Value(Value),
    /// Name resolved from the evaluation scope at run time
    Name(String),
}

impl Operand {
    /// Resolve the operand against a scope.
    pub fn resolve(&self, scope: &EvalScope) -> EvalResult<Value> {
        match self {
            Operand::Value(value) => Ok(value.clone()),
            Operand::Name(name) => scope
                .lookup(name)
                .cloned()
                .ok_or_else(|| EvalError::UnknownName(name.clone())),
        }
    }
}

impl From<i64> for Operand {
    fn from(i: i64) -> Self {
        Operand::Value(Value::Integer(i))
    }
}

impl From<f64> for Operand {
    fn from(f: f64) -> Self {
        Operand::Value(Value::Float(f))
    }
}

impl From<&str> for Operand {
    fn from(name: &str) -> Self {
        Operand::Name(name.to_string())
    }
}

/// A failed constraint check: message template plus metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintFailure {
    /// Message template with `{name}` placeholders
    pub message: String,
    /// Metadata substituted into the template (and kept on the error)
    pub params: IndexMap<String, Value>,
}

/// Structured constraints checked during the standard-validations stage.
///
/// Constraints that do not apply to a value's shape pass silently (a numeric
/// bound on a string says nothing), matching how type checks and constraint
/// checks are kept separate concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum Constraint {
    /// Numeric value must be > bound
    GreaterThan(Operand),
    /// Numeric value must be >= bound
    GreaterOrEqual(Operand),
    /// Numeric value must be < bound
    LessThan(Operand),
    /// Numeric value must be <= bound
    LessOrEqual(Operand),

    /// String/list length must be >= min
    MinLength(usize),
    /// String/list length must be <= max
    MaxLength(usize),

    /// Value must be one of the listed values
    Inclusion(Vec<Value>),
    /// Value must not be one of the listed values
    Exclusion(Vec<Value>),

    /// String must match the regex pattern
    Format(String),
}

impl Constraint {
    /// Short kind name carried on the resulting error.
    pub fn kind(&self) -> &'static str {
        match self {
            Constraint::GreaterThan(_) => "greater_than",
            Constraint::GreaterOrEqual(_) => "greater_or_equal",
            Constraint::LessThan(_) => "less_than",
            Constraint::LessOrEqual(_) => "less_or_equal",
            Constraint::MinLength(_) => "min_length",
            Constraint::MaxLength(_) => "max_length",
            Constraint::Inclusion(_) => "inclusion",
            Constraint::Exclusion(_) => "exclusion",
            Constraint::Format(_) => "format",
        }
    }

    /// Check a value against this constraint.
    ///
    /// Returns `Ok(None)` on pass, `Ok(Some(failure))` on a failed check, and
    /// `Err` only when a bound operand cannot be resolved or is not numeric.
    pub fn check(
        &self,
        value: &Value,
        scope: &EvalScope,
    ) -> EvalResult<Option<ConstraintFailure>> {
        match self {
            Constraint::GreaterThan(bound) => {
                self.numeric_bound(value, bound, scope, "must be greater than {number}", |v, b| {
                    v > b
                })
            }
            Constraint::GreaterOrEqual(bound) => self.numeric_bound(
                value,
                bound,
                scope,
                "must be greater than or equal to {number}",
                |v, b| v >= b,
            ),
            Constraint::LessThan(bound) => {
                self.numeric_bound(value, bound, scope, "must be less than {number}", |v, b| {
                    v < b
                })
            }
            Constraint::LessOrEqual(bound) => self.numeric_bound(
                value,
                bound,
                scope,
                "must be less than or equal to {number}",
                |v, b| v <= b,
            ),

            Constraint::MinLength(min) => Ok(measure_length(value).and_then(|len| {
                if len < *min {
                    Some(ConstraintFailure {
                        message: "should be at least {count} item(s)".to_string(),
                        params: length_params(*min, len),
                    })
                } else {
                    None
                }
            })),

            Constraint::MaxLength(max) => Ok(measure_length(value).and_then(|len| {
                if len > *max {
                    Some(ConstraintFailure {
                        message: "should be at most {count} item(s)".to_string(),
                        params: length_params(*max, len),
                    })
                } else {
                    None
                }
            })),

            Constraint::Inclusion(allowed) => {
                if allowed.contains(value) {
                    Ok(None)
                } else {
                    let mut params = IndexMap::new();
                    params.insert("allowed".to_string(), Value::String(join_values(allowed)));
                    Ok(Some(ConstraintFailure {
                        message: "is not included in {allowed}".to_string(),
                        params,
                    }))
                }
            }

            Constraint::Exclusion(reserved) => {
                if reserved.contains(value) {
                    Ok(Some(ConstraintFailure {
                        message: "is reserved".to_string(),
                        params: IndexMap::new(),
                    }))
                } else {
                    Ok(None)
                }
            }

            Constraint::Format(pattern) => match value {
                Value::String(s) => {
                    let regex = Regex::new(pattern)
                        .map_err(|e| EvalError::Failed(format!("bad format pattern: {}", e)))?;
                    if regex.is_match(s) {
                        Ok(None)
                    } else {
                        let mut params = IndexMap::new();
                        params.insert("pattern".to_string(), Value::String(pattern.clone()));
                        Ok(Some(ConstraintFailure {
                            message: "has invalid format".to_string(),
                            params,
                        }))
                    }
                }
                _ => Ok(None),
            },
        }
    }

    fn numeric_bound(
        &self,
        value: &Value,
        bound: &Operand,
        scope: &EvalScope,
        message: &str,
        pass: impl Fn(f64, f64) -> bool,
    ) -> EvalResult<Option<ConstraintFailure>> {
        let Some(v) = value.as_float() else {
            return Ok(None);
        };
        let resolved = bound.resolve(scope)?;
        let b = resolved.as_float().ok_or_else(|| EvalError::TypeMismatch {
            op: self.kind().to_string(),
            got: resolved.kind_name().to_string(),
        })?;
        if pass(v, b) {
            Ok(None)
        } else {
            let mut params = IndexMap::new();
            params.insert("number".to_string(), resolved);
            Ok(Some(ConstraintFailure {
                message: message.to_string(),
                params,
            }))
        }
    }

    /// Get a human-readable description of this constraint.
    pub fn description(&self) -> String {
        match self {
            Constraint::GreaterThan(b) => format!("Must be greater than {}", describe_operand(b)),
            Constraint::GreaterOrEqual(b) => {
                format!("Must be greater than or equal to {}", describe_operand(b))
            }
            Constraint::LessThan(b) => format!("Must be less than {}", describe_operand(b)),
            Constraint::LessOrEqual(b) => {
                format!("Must be less than or equal to {}", describe_operand(b))
            }
            Constraint::MinLength(n) => format!("Minimum length: {}", n),
            Constraint::MaxLength(n) => format!("Maximum length: {}", n),
            Constraint::Inclusion(values) => format!("One of: {}", join_values(values)),
            Constraint::Exclusion(values) => format!("None of: {}", join_values(values)),
            Constraint::Format(pattern) => format!("Must match pattern: {}", pattern),
        }
    }
}

fn describe_operand(operand: &Operand) -> String {
    match operand {
        Operand::Value(value) => value.to_string(),
        Operand::Name(name) => format!("'{}'", name),
    }
}

fn measure_length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::List(items) => Some(items.len()),
        _ => None,
    }
}

fn length_params(bound: usize, actual: usize) -> IndexMap<String, Value> {
    let mut params = IndexMap::new();
    params.insert("count".to_string(), Value::Integer(bound as i64));
    params.insert("actual".to_string(), Value::Integer(actual as i64));
    params
}

fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Block Clauses and the Rule Set
// ============================================================================

/// One ordered `(condition, outcome)` pair of a block.
///
/// Every clause is evaluated regardless of what earlier clauses did; the
/// clause index is recorded on any resulting error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockClause {
    /// Condition deciding whether the outcome applies
    pub condition: RuleBody,
    /// Outcome evaluated when the condition is truthy
    pub outcome: RuleBody,
}

impl BlockClause {
    /// Create a clause.
    pub fn new(condition: RuleBody, outcome: RuleBody) -> Self {
        Self { condition, outcome }
    }
}

/// The full rule set attached to one field.
///
/// Fixed at definition time and shared across all runs; only the evaluation
/// context varies per run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    /// Pre-validation transform; overwrites the coerced value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derive: Option<RuleBody>,
    /// Structured constraints, all checked independently
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<Constraint>,
    /// Ordered condition→outcome clauses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block: Vec<BlockClause>,
    /// Boolean guard; falsy or failed evaluation is a generic error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<RuleBody>,
    /// Post-validation transform; overwrites the final value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<RuleBody>,
}

impl RuleSet {
    /// Check if no rules are attached.
    pub fn is_empty(&self) -> bool {
        self.derive.is_none()
            && self.validations.is_empty()
            && self.block.is_empty()
            && self.when.is_none()
            && self.map.is_none()
    }

    /// Iterate over every rule body with its rule name, for definition-time
    /// checks.
    pub fn bodies(&self) -> Vec<(&'static str, &RuleBody)> {
        let mut bodies = Vec::new();
        if let Some(body) = &self.derive {
            bodies.push(("derive", body));
        }
        for clause in &self.block {
            bodies.push(("block condition", &clause.condition));
            bodies.push(("block outcome", &clause.outcome));
        }
        if let Some(body) = &self.when {
            bodies.push(("when", body));
        }
        if let Some(body) = &self.map {
            bodies.push(("map", body));
        }
        bodies
    }
}
