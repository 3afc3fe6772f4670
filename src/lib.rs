//! # Remold - Declarative Record Validation and Transformation
//!
//! Remold converts untrusted input data into validated, internally-typed
//! entities — or a structured set of errors. A record shape is declared once
//! as a [`RecordDefinition`](schema::RecordDefinition); every run takes raw
//! input plus per-call bindings and threads a session through a composable
//! pipeline of stages.
//!
//! ## Features
//!
//! - **Declarative definitions**: fields, defaults, requiredness, nesting,
//!   and rules described as data built once and shared across runs
//! - **Composable stage chain**: derive → validations → block → guard → map,
//!   extensible with custom stages through the `PipelineStage` trait
//! - **Error accumulation**: no short-circuiting — every field and every
//!   constraint is checked and reported together
//! - **Deferred rules**: expression trees or closures evaluated against an
//!   explicit per-run scope of bindings and sibling values
//! - **Nested records**: one/many relationships validated recursively with
//!   their own sessions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use remold::prelude::*;
//!
//! // Declare the record shape once
//! let person = RecordDefinition::builder("person")
//!     .field(
//!         FieldDefinition::new("age", FieldType::Integer)
//!             .required()
//!             .with_validation(Constraint::GreaterThan(Operand::from(0)))
//!             .with_validation(Constraint::LessThan(Operand::from("max_age"))),
//!     )
//!     .build_shared()
//!     .unwrap();
//!
//! // Validate input against it, parameterized per call
//! let bindings = Bindings::new().with("max_age", Value::Integer(100));
//! let input = input_from_json(serde_json::json!({"age": 36})).unwrap();
//!
//! let entity = Entity::try_new(&person, input, &bindings)?;
//! assert_eq!(entity.get("age"), Some(&Value::Integer(36)));
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`core`]: Values, the coercion contract, errors, scopes, and bindings
//! - [`eval`]: The expression tree and rule-body evaluator
//! - [`schema`]: Record definitions, rules, and the definition registry
//! - [`pipeline`]: The session, the stage chain, and the runner
//! - [`entity`]: Entity materialization and dumping
//!
//! ## Custom Stages
//!
//! Implement the [`PipelineStage`](pipeline::PipelineStage) trait to extend
//! the chain:
//!
//! ```rust,ignore
//! use remold::prelude::*;
//!
//! struct TrimStrings;
//!
//! impl PipelineStage for TrimStrings {
//!     fn name(&self) -> &str {
//!         "trim_strings"
//!     }
//!
//!     fn run(&self, session: &mut ValidationSession, _bindings: &Bindings) {
//!         let definition = session.definition().clone();
//!         for field in definition.fields() {
//!             if let Some(Value::String(s)) = session.change(&field.name) {
//!                 let trimmed = s.trim().to_string();
//!                 session.set_change(field.name.clone(), Value::String(trimmed));
//!             }
//!         }
//!     }
//! }
//!
//! let def = RecordDefinition::builder("comment")
//!     .field(FieldDefinition::new("body", FieldType::String))
//!     .stage(std::sync::Arc::new(TrimStrings))
//!     .build_shared()
//!     .unwrap();
//! ```
//!
//! ## Concurrency
//!
//! A run is single-threaded and synchronous. Definitions are immutable and
//! shared read-only (`Arc`), so independent runs may execute concurrently;
//! sessions and scopes are per-run and never shared. Evaluation time is not
//! bounded — a user rule that loops forever is the caller's responsibility.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod entity;
pub mod eval;
pub mod pipeline;
pub mod schema;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use remold::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::context::{Bindings, EvalScope};
    pub use crate::core::error::{
        CoerceError, DefinitionError, ErrorKind, EvalError, FieldError, InvalidRecord,
        RemoldError, RemoldResult,
    };
    pub use crate::core::types::{Coercer, FieldType, Value};

    // Rules and expressions
    pub use crate::eval::evaluator::{Arity, RuleBody};
    pub use crate::eval::expr::{BinaryOp, Expr, UnaryOp};
    pub use crate::schema::rules::{BlockClause, Constraint, Operand, RuleSet};

    // Definitions
    pub use crate::schema::definition::{
        Cardinality, FieldDefinition, NestedDefinition, RecordDefinition,
        RecordDefinitionBuilder,
    };
    pub use crate::schema::registry::DefinitionRegistry;

    // Pipeline
    pub use crate::pipeline::runner::run;
    pub use crate::pipeline::session::{
        NestedSessions, RunReport, SessionState, ValidationSession,
    };
    pub use crate::pipeline::stages::{
        default_chain, BlockStage, DeriveStage, GuardStage, MapStage, PipelineStage,
        ValidateStage,
    };

    // Entities
    pub use crate::entity::{input_from_json, Entity, NestedValue};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use indexmap::IndexMap;
    use proptest::prelude::*;

    fn input(entries: &[(&str, Value)]) -> IndexMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "remold");
    }

    #[test]
    fn test_age_example_end_to_end() {
        init_logging();
        let person = RecordDefinition::builder("person")
            .field(
                FieldDefinition::new("age", FieldType::Integer)
                    .required()
                    .with_validation(Constraint::GreaterThan(Operand::from(0)))
                    .with_validation(Constraint::LessThan(Operand::from("max_age"))),
            )
            .build_shared()
            .unwrap();
        let bindings = Bindings::new().with("max_age", Value::Integer(100));

        // Present but out of bounds: the bound fires, requiredness does not
        let session = run(&person, input(&[("age", Value::Integer(-1))]), &bindings);
        assert_eq!(session.errors().len(), 1);
        assert_eq!(
            session.errors()[0].kind,
            ErrorKind::Constraint("greater_than".into())
        );

        // Absent: exactly one required error
        let session = run(&person, input(&[]), &bindings);
        assert_eq!(session.errors().len(), 1);
        assert_eq!(session.errors()[0].kind, ErrorKind::Required);

        // Both bounds can fire together on the right input
        let session = run(&person, input(&[("age", Value::Integer(200))]), &bindings);
        assert_eq!(session.errors().len(), 1);
        assert_eq!(session.errors()[0].rendered(), "must be less than 100");
    }

    #[test]
    fn test_registry_backed_validation() {
        let mut registry = DefinitionRegistry::new();
        registry.register(
            RecordDefinition::builder("login")
                .field(
                    FieldDefinition::new("email", FieldType::String)
                        .required()
                        .with_validation(Constraint::Format(r"^[^@\s]+@[^@\s]+$".into())),
                )
                .build_shared()
                .unwrap(),
        );

        let def = registry.get("login").unwrap();
        let session = run(
            &def,
            input(&[("email", Value::String("bad address".into()))]),
            &Bindings::new(),
        );
        assert!(!session.valid());
        assert_eq!(session.errors()[0].rendered(), "has invalid format");
    }

    #[test]
    fn test_run_report_surface() {
        let def = RecordDefinition::builder("thing")
            .field(FieldDefinition::new("n", FieldType::Integer).required())
            .build_shared()
            .unwrap();

        let report = run(&def, input(&[]), &Bindings::new()).report();
        assert!(!report.valid);
        assert!(report.changes.is_empty());
        assert_eq!(report.errors.len(), 1);

        // The report serializes for API payloads
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["valid"], serde_json::Value::Bool(false));
    }

    proptest! {
        #[test]
        fn prop_derive_is_a_pure_function_of_siblings(
            rating in -1000i64..1000,
            category in -1000i64..1000,
            raw_score in proptest::option::of(-1000i64..1000),
        ) {
            let def = RecordDefinition::builder("exam")
                .field(FieldDefinition::new("rating", FieldType::Integer))
                .field(FieldDefinition::new("category", FieldType::Integer))
                .field(
                    FieldDefinition::new("score", FieldType::Integer).with_derive(
                        RuleBody::expr(Expr::name("rating").add(Expr::name("category"))),
                    ),
                )
                .build_shared()
                .unwrap();

            let mut entries = vec![
                ("rating", Value::Integer(rating)),
                ("category", Value::Integer(category)),
            ];
            if let Some(score) = raw_score {
                entries.push(("score", Value::Integer(score)));
            }

            let session = run(&def, input(&entries), &Bindings::new());
            prop_assert_eq!(
                session.change("score"),
                Some(&Value::Integer(rating + category))
            );
        }

        #[test]
        fn prop_integer_strings_coerce(n in -100000i64..100000) {
            let coerced = FieldType::Integer
                .coerce(&Value::String(n.to_string()))
                .unwrap();
            prop_assert_eq!(coerced, Value::Integer(n));
        }
    }
}
