//! Record definitions: the static, declaration-time shape of a record.
//!
//! A [`RecordDefinition`] is built once per record shape, validated at
//! construction, and shared read-only across every validation run (wrap it in
//! an `Arc`). Field declaration order is semantically meaningful — it is the
//! only visibility-order guarantee rules get.

use crate::core::error::{DefinitionError, DefinitionResult};
use crate::core::types::{FieldType, Value};
use crate::eval::evaluator::RuleBody;
use crate::pipeline::stages::{default_chain, PipelineStage};
use crate::schema::rules::{BlockClause, Constraint, RuleSet};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Definition of one scalar field within a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Unique name within the record
    pub name: String,
    /// Type descriptor delegating coercion/dump
    pub field_type: FieldType,
    /// Default used when the raw input has no value for this field
    pub default: Option<Value>,
    /// Whether the field must have a value after coercion
    pub required: bool,
    /// Rules evaluated by the pipeline stages
    pub rules: RuleSet,
}

impl FieldDefinition {
    /// Create a field definition.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: None,
            required: false,
            rules: RuleSet::default(),
        }
    }

    /// Mark this field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the default value (coerced when the definition is built).
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Attach a derive rule (pre-validation transform).
    pub fn with_derive(mut self, body: RuleBody) -> Self {
        self.rules.derive = Some(body);
        self
    }

    /// Add a structured constraint.
    pub fn with_validation(mut self, constraint: Constraint) -> Self {
        self.rules.validations.push(constraint);
        self
    }

    /// Add a block clause (condition → outcome).
    pub fn with_block_clause(mut self, condition: RuleBody, outcome: RuleBody) -> Self {
        self.rules.block.push(BlockClause::new(condition, outcome));
        self
    }

    /// Attach a boolean guard.
    pub fn with_when(mut self, body: RuleBody) -> Self {
        self.rules.when = Some(body);
        self
    }

    /// Attach a map rule (post-validation transform).
    pub fn with_map(mut self, body: RuleBody) -> Self {
        self.rules.map = Some(body);
        self
    }
}

/// Cardinality of a nested record relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// A single nested record
    One,
    /// A collection of nested records
    Many,
}

/// Definition of a nested record field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedDefinition {
    /// The nested record's own definition
    pub definition: Arc<RecordDefinition>,
    /// One nested record or a collection
    pub cardinality: Cardinality,
    /// Whether an absent nested input is an error
    pub required: bool,
    /// For `One`: materialize a default-valued nested entity instead of null
    /// when the input is absent
    pub default_entity: bool,
}

/// Immutable description of a record shape.
///
/// Holds the ordered scalar fields, the nested relationships, and the active
/// pipeline stage chain. Construct through [`RecordDefinition::builder`];
/// a definition that builds successfully never fails definition checks at
/// run time.
#[derive(Clone, Serialize, Deserialize)]
pub struct RecordDefinition {
    name: String,
    fields: IndexMap<String, FieldDefinition>,
    nested: IndexMap<String, NestedDefinition>,
    /// The active extension chain; not serialized, restored to the default
    /// chain on deserialization
    #[serde(skip, default = "default_chain")]
    stages: Vec<Arc<dyn PipelineStage>>,
}

impl RecordDefinition {
    /// Start building a definition.
    pub fn builder(name: impl Into<String>) -> RecordDefinitionBuilder {
        RecordDefinitionBuilder::new(name)
    }

    /// Record-type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scalar fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    /// Look up a scalar field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    /// Declaration index of a scalar field.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.get_index_of(name)
    }

    /// Names of required scalar fields, in declaration order.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .values()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
    }

    /// Nested relationships in declaration order.
    pub fn nested(&self) -> impl Iterator<Item = (&String, &NestedDefinition)> {
        self.nested.iter()
    }

    /// Look up a nested relationship by name.
    pub fn nested_field(&self, name: &str) -> Option<&NestedDefinition> {
        self.nested.get(name)
    }

    /// The active pipeline stage chain.
    pub fn stages(&self) -> &[Arc<dyn PipelineStage>] {
        &self.stages
    }

    /// Number of scalar fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

impl std::fmt::Debug for RecordDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordDefinition")
            .field("name", &self.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("nested", &self.nested.keys().collect::<Vec<_>>())
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`RecordDefinition`].
pub struct RecordDefinitionBuilder {
    name: String,
    fields: Vec<FieldDefinition>,
    nested: Vec<(String, NestedDefinition)>,
    stages: Vec<Arc<dyn PipelineStage>>,
}

impl RecordDefinitionBuilder {
    /// Create a builder with the default stage chain.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            nested: Vec::new(),
            stages: default_chain(),
        }
    }

    /// Add a scalar field.
    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Add an optional single nested record (null when absent).
    pub fn has_one(mut self, name: impl Into<String>, definition: Arc<RecordDefinition>) -> Self {
        self.nested.push((
            name.into(),
            NestedDefinition {
                definition,
                cardinality: Cardinality::One,
                required: false,
                default_entity: false,
            },
        ));
        self
    }

    /// Add a required single nested record.
    pub fn has_one_required(
        mut self,
        name: impl Into<String>,
        definition: Arc<RecordDefinition>,
    ) -> Self {
        self.nested.push((
            name.into(),
            NestedDefinition {
                definition,
                cardinality: Cardinality::One,
                required: true,
                default_entity: false,
            },
        ));
        self
    }

    /// Add an optional single nested record that materializes as a
    /// default-valued entity when absent.
    pub fn has_one_with_default(
        mut self,
        name: impl Into<String>,
        definition: Arc<RecordDefinition>,
    ) -> Self {
        self.nested.push((
            name.into(),
            NestedDefinition {
                definition,
                cardinality: Cardinality::One,
                required: false,
                default_entity: true,
            },
        ));
        self
    }

    /// Add a nested collection (empty when absent).
    pub fn has_many(mut self, name: impl Into<String>, definition: Arc<RecordDefinition>) -> Self {
        self.nested.push((
            name.into(),
            NestedDefinition {
                definition,
                cardinality: Cardinality::Many,
                required: false,
                default_entity: false,
            },
        ));
        self
    }

    /// Add a required nested collection (absent input is an error).
    pub fn has_many_required(
        mut self,
        name: impl Into<String>,
        definition: Arc<RecordDefinition>,
    ) -> Self {
        self.nested.push((
            name.into(),
            NestedDefinition {
                definition,
                cardinality: Cardinality::Many,
                required: true,
                default_entity: false,
            },
        ));
        self
    }

    /// Append an extension stage after the current chain.
    pub fn stage(mut self, stage: Arc<dyn PipelineStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Replace the entire stage chain.
    pub fn with_stages(mut self, stages: Vec<Arc<dyn PipelineStage>>) -> Self {
        self.stages = stages;
        self
    }

    /// Validate and build the definition.
    pub fn build(self) -> DefinitionResult<RecordDefinition> {
        let mut fields: IndexMap<String, FieldDefinition> = IndexMap::new();

        for mut field in self.fields {
            if fields.contains_key(&field.name) {
                return Err(DefinitionError::DuplicateField(field.name));
            }

            // Defaults are coerced once here so runs can apply them directly.
            if let Some(default) = &field.default {
                let coerced =
                    field
                        .field_type
                        .coerce(default)
                        .map_err(|source| DefinitionError::BadDefault {
                            field: field.name.clone(),
                            source,
                        })?;
                field.default = Some(coerced);
            }

            for (rule, body) in field.rules.bodies() {
                if !body.arity_consistent() {
                    return Err(DefinitionError::RuleArity {
                        field: field.name.clone(),
                        rule: rule.to_string(),
                    });
                }
            }

            for constraint in &field.rules.validations {
                if let Constraint::Format(pattern) = constraint {
                    Regex::new(pattern).map_err(|_| DefinitionError::BadFormat {
                        field: field.name.clone(),
                        pattern: pattern.clone(),
                    })?;
                }
            }

            fields.insert(field.name.clone(), field);
        }

        let mut nested: IndexMap<String, NestedDefinition> = IndexMap::new();
        for (name, definition) in self.nested {
            if fields.contains_key(&name) {
                return Err(DefinitionError::NestedNameCollision(name));
            }
            if nested.contains_key(&name) {
                return Err(DefinitionError::DuplicateField(name));
            }
            nested.insert(name, definition);
        }

        Ok(RecordDefinition {
            name: self.name,
            fields,
            nested,
            stages: self.stages,
        })
    }

    /// Validate and build, wrapped in an `Arc` for sharing.
    pub fn build_shared(self) -> DefinitionResult<Arc<RecordDefinition>> {
        self.build().map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::evaluator::{Arity, RuleBody};
    use crate::eval::expr::Expr;
    use crate::schema::rules::Operand;

    #[test]
    fn test_builder_preserves_declaration_order() {
        let def = RecordDefinition::builder("person")
            .field(FieldDefinition::new("name", FieldType::String))
            .field(FieldDefinition::new("age", FieldType::Integer))
            .field(FieldDefinition::new("email", FieldType::String))
            .build()
            .unwrap();

        let names: Vec<&str> = def.fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["name", "age", "email"]);
        assert_eq!(def.field_index("age"), Some(1));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = RecordDefinition::builder("person")
            .field(FieldDefinition::new("name", FieldType::String))
            .field(FieldDefinition::new("name", FieldType::String))
            .build();

        assert_eq!(
            result.err(),
            Some(DefinitionError::DuplicateField("name".into()))
        );
    }

    #[test]
    fn test_nested_name_collision_rejected() {
        let address = RecordDefinition::builder("address")
            .field(FieldDefinition::new("city", FieldType::String))
            .build_shared()
            .unwrap();

        let result = RecordDefinition::builder("person")
            .field(FieldDefinition::new("address", FieldType::String))
            .has_one("address", address)
            .build();

        assert_eq!(
            result.err(),
            Some(DefinitionError::NestedNameCollision("address".into()))
        );
    }

    #[test]
    fn test_default_is_coerced_at_build() {
        let def = RecordDefinition::builder("config")
            .field(
                FieldDefinition::new("retries", FieldType::Integer)
                    .with_default(Value::String("3".into())),
            )
            .build()
            .unwrap();

        assert_eq!(
            def.field("retries").unwrap().default,
            Some(Value::Integer(3))
        );
    }

    #[test]
    fn test_bad_default_rejected() {
        let result = RecordDefinition::builder("config")
            .field(
                FieldDefinition::new("retries", FieldType::Integer)
                    .with_default(Value::String("many".into())),
            )
            .build();

        assert!(matches!(
            result,
            Err(DefinitionError::BadDefault { field, .. }) if field == "retries"
        ));
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let result = RecordDefinition::builder("person")
            .field(
                FieldDefinition::new("age", FieldType::Integer).with_derive(
                    RuleBody::expr_with_arity(Arity::Nullary, Expr::self_value()),
                ),
            )
            .build();

        assert_eq!(
            result.err(),
            Some(DefinitionError::RuleArity {
                field: "age".into(),
                rule: "derive".into(),
            })
        );
    }

    #[test]
    fn test_bad_format_pattern_rejected() {
        let result = RecordDefinition::builder("person")
            .field(
                FieldDefinition::new("email", FieldType::String)
                    .with_validation(Constraint::Format("[unclosed".into())),
            )
            .build();

        assert!(matches!(
            result,
            Err(DefinitionError::BadFormat { field, .. }) if field == "email"
        ));
    }

    #[test]
    fn test_required_fields_iterator() {
        let def = RecordDefinition::builder("person")
            .field(FieldDefinition::new("name", FieldType::String).required())
            .field(FieldDefinition::new("age", FieldType::Integer))
            .field(
                FieldDefinition::new("email", FieldType::String)
                    .required()
                    .with_validation(Constraint::LessThan(Operand::from("max"))),
            )
            .build()
            .unwrap();

        let required: Vec<&str> = def.required_fields().collect();
        assert_eq!(required, vec!["name", "email"]);
    }
}
