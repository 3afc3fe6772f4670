//! Core value types and the type coercion contract.
//!
//! The type system uses an enum-based approach for several reasons:
//! - Closed set of types: record fields have a finite set of primitive shapes
//! - Zero-cost pattern matching: Compiler optimizes to jump tables
//! - Serialization: serde handles enums natively
//! - Type safety: Exhaustive matching catches missing cases at compile time
//!
//! [`FieldType`] is the coercion contract: the engine never inspects a field's
//! type beyond calling [`FieldType::coerce`] and [`FieldType::dump`].

use crate::core::error::CoerceError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Runtime values that flow through a validation run.
///
/// This enum represents all data shapes that raw input, coerced changes, and
/// materialized entities can hold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum Value {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// UTF-8 string
    String(String),
    /// Ordered list of values
    List(Vec<Value>),
    /// Ordered key-value map
    Map(IndexMap<String, Value>),
    /// Represents absence of value
    Null,
}

impl Value {
    /// Try to get this value as an integer.
    pub fn as_integer(&self) -> Option<i64> {
        if let Value::Integer(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Try to get this value as a float.
    /// Integers are automatically widened to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Boolean(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Try to get this value as a list reference.
    pub fn as_list(&self) -> Option<&Vec<Value>> {
        if let Value::List(items) = self {
            Some(items)
        } else {
            None
        }
    }

    /// Try to get this value as a map reference.
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        if let Value::Map(map) = self {
            Some(map)
        } else {
            None
        }
    }

    /// Check if this value is Null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by conditions and guards: Null and false are falsy,
    /// everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Boolean(false))
    }

    /// Get a short name of this value's shape for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Null => "null",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::List(items) => write!(f, "List[{}]", items.len()),
            Value::Map(map) => write!(f, "Map{{{} entries}}", map.len()),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

// ============================================================================
// JSON Interop
// ============================================================================

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Integer(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => {
                serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
            Value::Null => serde_json::Value::Null,
        }
    }
}

// ============================================================================
// Coercion Contract
// ============================================================================

/// User-supplied coercer for [`FieldType::Custom`].
///
/// Implementors convert a raw external value into the field's internal value
/// and back. The engine calls nothing else on a custom type.
pub trait Coercer: Send + Sync {
    /// Convert a raw external value into the internal value.
    fn coerce(&self, raw: &Value) -> Result<Value, CoerceError>;

    /// Convert an internal value back to its external representation.
    fn dump(&self, value: &Value) -> Value {
        value.clone()
    }
}

/// Type descriptor of a field: the coercion/dump contract.
///
/// Coercion is lenient where the external world is: integers widen to floats,
/// and numeric/boolean fields accept their string spellings (untrusted input
/// frequently arrives fully stringified). Downcasts are refused.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "inner")]
pub enum FieldType {
    /// 64-bit signed integer
    Integer,
    /// 64-bit float (integers widen)
    Float,
    /// Boolean (accepts "true"/"false" strings)
    Boolean,
    /// UTF-8 string
    String,
    /// Closed set of allowed string variants
    Enum(Vec<String>),
    /// First member type that coerces wins
    Union(Vec<FieldType>),
    /// Homogeneous list of an element type
    List(Box<FieldType>),
    /// Identity coercion (accepts anything)
    Any,

    /// Custom type with a user-supplied coercer
    /// Note: The coercer is skipped during serialization
    #[serde(skip)]
    Custom {
        /// Name used in error messages
        name: String,
        /// The coercer implementation
        coercer: Arc<dyn Coercer>,
    },
}

impl FieldType {
    /// Coerce a raw external value into this type.
    pub fn coerce(&self, raw: &Value) -> Result<Value, CoerceError> {
        match self {
            FieldType::Integer => match raw {
                Value::Integer(i) => Ok(Value::Integer(*i)),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|_| self.mismatch(raw)),
                _ => Err(self.mismatch(raw)),
            },

            FieldType::Float => match raw {
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Integer(i) => Ok(Value::Float(*i as f64)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| self.mismatch(raw)),
                _ => Err(self.mismatch(raw)),
            },

            FieldType::Boolean => match raw {
                Value::Boolean(b) => Ok(Value::Boolean(*b)),
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" => Ok(Value::Boolean(true)),
                    "false" => Ok(Value::Boolean(false)),
                    _ => Err(self.mismatch(raw)),
                },
                _ => Err(self.mismatch(raw)),
            },

            FieldType::String => match raw {
                Value::String(s) => Ok(Value::String(s.clone())),
                _ => Err(self.mismatch(raw)),
            },

            FieldType::Enum(variants) => match raw {
                Value::String(s) if variants.iter().any(|v| v == s) => {
                    Ok(Value::String(s.clone()))
                }
                _ => Err(self.mismatch(raw)),
            },

            FieldType::Union(members) => members
                .iter()
                .find_map(|member| member.coerce(raw).ok())
                .ok_or_else(|| self.mismatch(raw)),

            FieldType::List(element) => match raw {
                Value::List(items) => items
                    .iter()
                    .map(|item| element.coerce(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List),
                _ => Err(self.mismatch(raw)),
            },

            FieldType::Any => Ok(raw.clone()),

            FieldType::Custom { coercer, .. } => coercer.coerce(raw),
        }
    }

    /// Convert an internal value back to its external representation.
    ///
    /// For the built-in primitives the internal and external representations
    /// coincide; custom types and list elements delegate.
    pub fn dump(&self, value: &Value) -> Value {
        match self {
            FieldType::List(element) => match value {
                Value::List(items) => {
                    Value::List(items.iter().map(|item| element.dump(item)).collect())
                }
                other => other.clone(),
            },
            FieldType::Custom { coercer, .. } => coercer.dump(value),
            _ => value.clone(),
        }
    }

    /// Get a human-readable name for this type.
    pub fn display_name(&self) -> String {
        match self {
            FieldType::Integer => "integer".to_string(),
            FieldType::Float => "float".to_string(),
            FieldType::Boolean => "boolean".to_string(),
            FieldType::String => "string".to_string(),
            FieldType::Enum(variants) => format!("enum({})", variants.join(", ")),
            FieldType::Union(members) => {
                let names: Vec<String> = members.iter().map(|m| m.display_name()).collect();
                format!("union({})", names.join(" | "))
            }
            FieldType::List(element) => format!("list<{}>", element.display_name()),
            FieldType::Any => "any".to_string(),
            FieldType::Custom { name, .. } => name.clone(),
        }
    }

    fn mismatch(&self, raw: &Value) -> CoerceError {
        CoerceError {
            expected: self.display_name(),
            got: raw.kind_name().to_string(),
        }
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Integer => write!(f, "Integer"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Boolean => write!(f, "Boolean"),
            FieldType::String => write!(f, "String"),
            FieldType::Enum(v) => f.debug_tuple("Enum").field(v).finish(),
            FieldType::Union(v) => f.debug_tuple("Union").field(v).finish(),
            FieldType::List(v) => f.debug_tuple("List").field(v).finish(),
            FieldType::Any => write!(f, "Any"),
            FieldType::Custom { name, .. } => f
                .debug_struct("Custom")
                .field("name", name)
                .field("coercer", &"<coercer>")
                .finish(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
