//! Entity materialization.
//!
//! An [`Entity`] is the concrete, internally-typed record a successful (or
//! forced) run produces. [`Entity::new`] applies all accumulated changes
//! onto a fresh default entity unconditionally; [`Entity::try_new`] is the
//! checked form that raises a single aggregate [`InvalidRecord`] instead.

use crate::core::context::Bindings;
use crate::core::error::{InvalidRecord, RemoldError, RemoldResult};
use crate::core::types::Value;
use crate::pipeline::runner::run;
use crate::pipeline::session::{NestedSessions, ValidationSession};
use crate::schema::definition::{Cardinality, RecordDefinition};
use indexmap::IndexMap;
use std::sync::Arc;

/// Materialized nested records of one nested field.
#[derive(Debug, Clone)]
pub enum NestedValue {
    /// A single nested entity; `None` when absent and not defaulted
    One(Option<Box<Entity>>),
    /// A collection of nested entities
    Many(Vec<Entity>),
}

/// A concrete record instance produced by a validation run.
///
/// Scalar values live under their field names; nested records are separate
/// entities. [`Entity::dump`] converts the whole tree back to external
/// values through each field's coercion contract.
#[derive(Debug, Clone)]
pub struct Entity {
    definition: Arc<RecordDefinition>,
    values: IndexMap<String, Value>,
    nested: IndexMap<String, NestedValue>,
}

impl Entity {
    /// Run the pipeline and materialize regardless of validity.
    ///
    /// All accumulated changes are applied onto a fresh default entity even
    /// when the session carries errors.
    pub fn new(
        definition: &Arc<RecordDefinition>,
        input: impl Into<IndexMap<String, Value>>,
        bindings: &Bindings,
    ) -> Entity {
        let session = run(definition, input.into(), bindings);
        Entity::from_session(&session)
    }

    /// Run the pipeline and materialize only a valid session.
    ///
    /// On an invalid session this returns the single aggregate failure
    /// carrying the original input and every field's rendered messages.
    pub fn try_new(
        definition: &Arc<RecordDefinition>,
        input: impl Into<IndexMap<String, Value>>,
        bindings: &Bindings,
    ) -> Result<Entity, InvalidRecord> {
        let session = run(definition, input.into(), bindings);
        if session.valid() {
            Ok(Entity::from_session(&session))
        } else {
            Err(InvalidRecord::new(
                session.input().clone(),
                &session.all_errors(),
            ))
        }
    }

    /// A fresh entity with every field at its default (or null) and nested
    /// records per their default-entity flags.
    pub fn default_for(definition: &Arc<RecordDefinition>) -> Entity {
        let mut values = IndexMap::new();
        for field in definition.fields() {
            values.insert(
                field.name.clone(),
                field.default.clone().unwrap_or(Value::Null),
            );
        }

        let mut nested = IndexMap::new();
        for (name, nested_def) in definition.nested() {
            let value = match nested_def.cardinality {
                Cardinality::One => {
                    if nested_def.default_entity {
                        NestedValue::One(Some(Box::new(Entity::default_for(
                            &nested_def.definition,
                        ))))
                    } else {
                        NestedValue::One(None)
                    }
                }
                Cardinality::Many => NestedValue::Many(Vec::new()),
            };
            nested.insert(name.clone(), value);
        }

        Entity {
            definition: definition.clone(),
            values,
            nested,
        }
    }

    /// Apply a finished session's changes onto a fresh default entity.
    pub fn from_session(session: &ValidationSession) -> Entity {
        let mut entity = Entity::default_for(session.definition());

        for (name, value) in session.changes() {
            entity.values.insert(name.clone(), value.clone());
        }

        for (name, sessions) in session.nested() {
            match sessions {
                NestedSessions::One(Some(child)) => {
                    entity.nested.insert(
                        name.clone(),
                        NestedValue::One(Some(Box::new(Entity::from_session(child)))),
                    );
                }
                // Absent nested input keeps the default entity (or None)
                // that default_for already put in place.
                NestedSessions::One(None) => {}
                NestedSessions::Many(children) => {
                    entity.nested.insert(
                        name.clone(),
                        NestedValue::Many(
                            children.iter().map(Entity::from_session).collect(),
                        ),
                    );
                }
            }
        }

        entity
    }

    /// The owning definition.
    pub fn definition(&self) -> &Arc<RecordDefinition> {
        &self.definition
    }

    /// Get a scalar field's value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// All scalar values in declaration order.
    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    /// Get a nested field's materialized records.
    pub fn nested_value(&self, field: &str) -> Option<&NestedValue> {
        self.nested.get(field)
    }

    /// Convert back to external values through the coercion contract,
    /// recursing into nested entities.
    pub fn dump(&self) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        for field in self.definition.fields() {
            let value = self
                .values
                .get(&field.name)
                .map(|v| field.field_type.dump(v))
                .unwrap_or(Value::Null);
            out.insert(field.name.clone(), value);
        }

        for (name, nested) in &self.nested {
            let value = match nested {
                NestedValue::One(Some(entity)) => Value::Map(entity.dump()),
                NestedValue::One(None) => Value::Null,
                NestedValue::Many(entities) => {
                    Value::List(entities.iter().map(|e| Value::Map(e.dump())).collect())
                }
            };
            out.insert(name.clone(), value);
        }
        out
    }

    /// External representation as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        Value::Map(self.dump()).into()
    }
}

/// An entity can be fed back in as input (it dumps to a key-value map).
impl From<&Entity> for IndexMap<String, Value> {
    fn from(entity: &Entity) -> Self {
        entity.dump()
    }
}

/// A previous session's raw input can be reused as input.
impl From<&ValidationSession> for IndexMap<String, Value> {
    fn from(session: &ValidationSession) -> Self {
        session.input().clone()
    }
}

/// Convert a JSON object into pipeline input.
pub fn input_from_json(json: serde_json::Value) -> RemoldResult<IndexMap<String, Value>> {
    match Value::from(json) {
        Value::Map(map) => Ok(map),
        other => Err(RemoldError::Other(format!(
            "JSON input must be an object, got {}",
            other.kind_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FieldType;
    use crate::schema::definition::FieldDefinition;
    use crate::schema::rules::{Constraint, Operand};

    fn input(entries: &[(&str, Value)]) -> IndexMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn address() -> Arc<RecordDefinition> {
        RecordDefinition::builder("address")
            .field(FieldDefinition::new("city", FieldType::String).required())
            .field(
                FieldDefinition::new("country", FieldType::String)
                    .with_default(Value::String("se".into())),
            )
            .build_shared()
            .unwrap()
    }

    fn person() -> Arc<RecordDefinition> {
        RecordDefinition::builder("person")
            .field(FieldDefinition::new("name", FieldType::String).required())
            .field(
                FieldDefinition::new("age", FieldType::Integer)
                    .with_validation(Constraint::GreaterThan(Operand::from(0))),
            )
            .has_one("address", address())
            .build_shared()
            .unwrap()
    }

    #[test]
    fn test_new_materializes_despite_errors() {
        let def = person();
        let entity = Entity::new(
            &def,
            input(&[("age", Value::Integer(-3))]),
            &Bindings::new(),
        );

        // name missing (required) and age out of bounds, but the entity
        // still carries the applied change and the null default.
        assert_eq!(entity.get("age"), Some(&Value::Integer(-3)));
        assert_eq!(entity.get("name"), Some(&Value::Null));
    }

    #[test]
    fn test_try_new_raises_single_aggregate() {
        let def = person();
        let result = Entity::try_new(
            &def,
            input(&[("age", Value::Integer(-3))]),
            &Bindings::new(),
        );

        let invalid = result.unwrap_err();
        assert_eq!(invalid.errors["name"], vec!["can't be blank".to_string()]);
        assert_eq!(
            invalid.errors["age"],
            vec!["must be greater than 0".to_string()]
        );
        // The original input is carried on the failure
        assert_eq!(invalid.input.get("age"), Some(&Value::Integer(-3)));
    }

    #[test]
    fn test_try_new_flattens_nested_errors() {
        let def = person();
        let result = Entity::try_new(
            &def,
            input(&[
                ("name", Value::String("ada".into())),
                (
                    "address",
                    Value::Map(input(&[("country", Value::String("dk".into()))])),
                ),
            ]),
            &Bindings::new(),
        );

        let invalid = result.unwrap_err();
        assert_eq!(
            invalid.errors["address"],
            vec!["city: can't be blank".to_string()]
        );
    }

    #[test]
    fn test_try_new_success() {
        let def = person();
        let entity = Entity::try_new(
            &def,
            input(&[
                ("name", Value::String("ada".into())),
                ("age", Value::Integer(36)),
            ]),
            &Bindings::new(),
        )
        .unwrap();

        assert_eq!(entity.get("name"), Some(&Value::String("ada".into())));
    }

    #[test]
    fn test_default_entity_flag() {
        let with_default = RecordDefinition::builder("person")
            .field(FieldDefinition::new("name", FieldType::String))
            .has_one_with_default("address", address())
            .build_shared()
            .unwrap();

        let entity = Entity::new(&with_default, IndexMap::new(), &Bindings::new());
        match entity.nested_value("address") {
            Some(NestedValue::One(Some(child))) => {
                assert_eq!(child.get("country"), Some(&Value::String("se".into())));
            }
            other => panic!("expected default nested entity, got {:?}", other),
        }

        let without = person();
        let entity = Entity::new(&without, IndexMap::new(), &Bindings::new());
        assert!(matches!(
            entity.nested_value("address"),
            Some(NestedValue::One(None))
        ));
    }

    #[test]
    fn test_dump_includes_nested() {
        let def = person();
        let entity = Entity::new(
            &def,
            input(&[
                ("name", Value::String("ada".into())),
                ("age", Value::Integer(36)),
                (
                    "address",
                    Value::Map(input(&[("city", Value::String("malmo".into()))])),
                ),
            ]),
            &Bindings::new(),
        );

        let dumped = entity.dump();
        assert_eq!(dumped["name"], Value::String("ada".into()));
        let address = dumped["address"].as_map().unwrap();
        assert_eq!(address["city"], Value::String("malmo".into()));
        // Nested default applied during the nested run
        assert_eq!(address["country"], Value::String("se".into()));
    }

    #[test]
    fn test_entity_round_trips_as_input() {
        let def = person();
        let first = Entity::try_new(
            &def,
            input(&[
                ("name", Value::String("ada".into())),
                ("age", Value::Integer(36)),
            ]),
            &Bindings::new(),
        )
        .unwrap();

        // No map/derive rules with side effects: revalidating the dumped
        // entity reproduces the same values.
        let second = Entity::try_new(&def, &first, &Bindings::new()).unwrap();
        assert_eq!(first.dump(), second.dump());
    }

    #[test]
    fn test_input_from_json() {
        let map = input_from_json(serde_json::json!({"age": 3})).unwrap();
        assert_eq!(map["age"], Value::Integer(3));

        assert!(input_from_json(serde_json::json!([1, 2])).is_err());
    }
}
