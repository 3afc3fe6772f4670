//! Individual pipeline stages.
//!
//! A [`PipelineStage`] is one composable unit of the validation and
//! transformation chain. Stages compose by explicit sequencing — the
//! definition holds an ordered list that the runner folds over the session —
//! rather than by subclassing or wrapping. Each stage decides which fields
//! it touches (the fields whose rule set carries options it recognizes) and
//! must not assume earlier stages ran. None of them short-circuit sibling
//! checks: errors accumulate.
//!
//! All stages skip fields whose coercion failed — a coercion failure is
//! terminal for that field.

use crate::core::context::Bindings;
use crate::core::error::{ErrorKind, FieldError};
use crate::core::types::Value;
use crate::pipeline::session::ValidationSession;
use std::fmt;
use std::sync::Arc;

/// Trait for pipeline stages.
///
/// A stage receives the session and the run's external bindings and mutates
/// the session in place: recording errors, overwriting changes, or both.
pub trait PipelineStage: Send + Sync {
    /// Name of this stage, for diagnostics.
    fn name(&self) -> &str;

    /// Run the stage over the session.
    fn run(&self, session: &mut ValidationSession, bindings: &Bindings);
}

impl fmt::Debug for dyn PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipelineStage({})", self.name())
    }
}

/// The default stage chain: derive → validations → block → guard → map.
pub fn default_chain() -> Vec<Arc<dyn PipelineStage>> {
    vec![
        Arc::new(DeriveStage),
        Arc::new(ValidateStage),
        Arc::new(BlockStage),
        Arc::new(GuardStage),
        Arc::new(MapStage),
    ]
}

/// Derive stage - computes pre-validation values.
///
/// Evaluates each field's derive rule against the bindings plus every change
/// made so far in this pass, and overwrites the field's value with the
/// result — even when coercion already supplied one. This is how a field
/// becomes a pure function of its siblings.
pub struct DeriveStage;

impl PipelineStage for DeriveStage {
    fn name(&self) -> &str {
        "derive"
    }

    fn run(&self, session: &mut ValidationSession, bindings: &Bindings) {
        let definition = session.definition().clone();
        for field in definition.fields() {
            let Some(body) = &field.rules.derive else {
                continue;
            };
            if session.field_failed(&field.name) {
                continue;
            }

            let scope = session.scope_for_derive(bindings, &field.name);
            match body.evaluate(&scope) {
                Ok(value) => session.set_change(field.name.clone(), value),
                Err(e) => session.add_error(FieldError::new(
                    field.name.clone(),
                    ErrorKind::Evaluator,
                    e.to_string(),
                )),
            }
        }
    }
}

/// Standard-validations stage - checks structured constraints.
///
/// Every applicable constraint is checked even after one fails; a field with
/// three failing constraints yields three distinct errors. Fields without a
/// value are skipped (requiredness already covered their absence).
pub struct ValidateStage;

impl PipelineStage for ValidateStage {
    fn name(&self) -> &str {
        "validations"
    }

    fn run(&self, session: &mut ValidationSession, bindings: &Bindings) {
        let definition = session.definition().clone();
        for field in definition.fields() {
            if field.rules.validations.is_empty() || session.field_failed(&field.name) {
                continue;
            }
            let Some(value) = session.change(&field.name).cloned() else {
                continue;
            };

            let scope = session.scope_for_rule(bindings, &field.name);
            for constraint in &field.rules.validations {
                match constraint.check(&value, &scope) {
                    Ok(None) => {}
                    Ok(Some(failure)) => {
                        let mut error = FieldError::new(
                            field.name.clone(),
                            ErrorKind::Constraint(constraint.kind().to_string()),
                            failure.message,
                        );
                        error.params = failure.params;
                        session.add_error(error);
                    }
                    Err(e) => session.add_error(FieldError::new(
                        field.name.clone(),
                        ErrorKind::Evaluator,
                        e.to_string(),
                    )),
                }
            }
        }
    }
}

/// Block stage - ordered condition→outcome clauses.
///
/// Every pair is evaluated regardless of earlier pairs' results, and each
/// error records its clause index for diagnostics.
pub struct BlockStage;

/// How an outcome value reads.
enum Outcome {
    Pass,
    Fail(String),
    Unsupported(&'static str),
}

/// Outcome contract: `Null`/`true` pass, a string or an `["error", reason]`
/// pair fail with that message, anything else is an evaluator error.
fn interpret_outcome(value: &Value) -> Outcome {
    match value {
        Value::Null | Value::Boolean(true) => Outcome::Pass,
        Value::String(message) => Outcome::Fail(message.clone()),
        Value::List(items) => match items.as_slice() {
            [Value::String(tag), Value::String(reason)] if tag == "error" => {
                Outcome::Fail(reason.clone())
            }
            _ => Outcome::Unsupported(value.kind_name()),
        },
        other => Outcome::Unsupported(other.kind_name()),
    }
}

impl PipelineStage for BlockStage {
    fn name(&self) -> &str {
        "block"
    }

    fn run(&self, session: &mut ValidationSession, bindings: &Bindings) {
        let definition = session.definition().clone();
        for field in definition.fields() {
            if field.rules.block.is_empty() || session.field_failed(&field.name) {
                continue;
            }
            if session.change(&field.name).is_none() {
                continue;
            }

            let scope = session.scope_for_rule(bindings, &field.name);
            for (index, clause) in field.rules.block.iter().enumerate() {
                let condition = match clause.condition.evaluate(&scope) {
                    Ok(value) => value,
                    Err(e) => {
                        session.add_error(
                            FieldError::new(
                                field.name.clone(),
                                ErrorKind::Evaluator,
                                e.to_string(),
                            )
                            .with_clause(index),
                        );
                        continue;
                    }
                };
                if !condition.is_truthy() {
                    continue;
                }

                match clause.outcome.evaluate(&scope) {
                    Ok(outcome) => match interpret_outcome(&outcome) {
                        Outcome::Pass => {}
                        Outcome::Fail(message) => session.add_error(
                            FieldError::new(
                                field.name.clone(),
                                ErrorKind::BlockClause,
                                message,
                            )
                            .with_clause(index),
                        ),
                        Outcome::Unsupported(kind) => session.add_error(
                            FieldError::new(
                                field.name.clone(),
                                ErrorKind::Evaluator,
                                format!("block outcome has unsupported shape: {}", kind),
                            )
                            .with_clause(index),
                        ),
                    },
                    Err(e) => session.add_error(
                        FieldError::new(field.name.clone(), ErrorKind::Evaluator, e.to_string())
                            .with_clause(index),
                    ),
                }
            }
        }
    }
}

/// Guard stage - the boolean `when` rule.
///
/// Any falsy or failed result yields the same generic error; callers that
/// need detail should prefer standard validations or a block.
pub struct GuardStage;

impl PipelineStage for GuardStage {
    fn name(&self) -> &str {
        "guard"
    }

    fn run(&self, session: &mut ValidationSession, bindings: &Bindings) {
        let definition = session.definition().clone();
        for field in definition.fields() {
            let Some(body) = &field.rules.when else {
                continue;
            };
            if session.field_failed(&field.name) || session.change(&field.name).is_none() {
                continue;
            }

            let scope = session.scope_for_rule(bindings, &field.name);
            let pass = body
                .evaluate(&scope)
                .map(|value| value.is_truthy())
                .unwrap_or(false);
            if !pass {
                session.add_error(FieldError::new(
                    field.name.clone(),
                    ErrorKind::GuardFailed,
                    "guard failed",
                ));
            }
        }
    }
}

/// Map stage - post-validation transform.
///
/// Runs last, after all validation, and overwrites the field's value with
/// the result. Mapping happens even when the field accumulated errors —
/// errors and the mapped value are independent outputs.
pub struct MapStage;

impl PipelineStage for MapStage {
    fn name(&self) -> &str {
        "map"
    }

    fn run(&self, session: &mut ValidationSession, bindings: &Bindings) {
        let definition = session.definition().clone();
        for field in definition.fields() {
            let Some(body) = &field.rules.map else {
                continue;
            };
            if session.field_failed(&field.name) || session.change(&field.name).is_none() {
                continue;
            }

            let scope = session.scope_for_rule(bindings, &field.name);
            match body.evaluate(&scope) {
                Ok(value) => session.set_change(field.name.clone(), value),
                Err(e) => session.add_error(FieldError::new(
                    field.name.clone(),
                    ErrorKind::Evaluator,
                    e.to_string(),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FieldType;
    use crate::eval::evaluator::RuleBody;
    use crate::eval::expr::Expr;
    use crate::schema::definition::{FieldDefinition, RecordDefinition};
    use crate::schema::rules::{Constraint, Operand};
    use indexmap::IndexMap;
    use std::sync::Arc;

    fn session_with_changes(
        definition: Arc<RecordDefinition>,
        changes: &[(&str, Value)],
    ) -> ValidationSession {
        let mut session = ValidationSession::new(definition, IndexMap::new());
        for (name, value) in changes {
            session.set_change(name.to_string(), value.clone());
        }
        session
    }

    #[test]
    fn test_derive_overwrites_coerced_value() {
        let def = RecordDefinition::builder("exam")
            .field(FieldDefinition::new("rating", FieldType::Integer))
            .field(FieldDefinition::new("category", FieldType::Integer))
            .field(
                FieldDefinition::new("score", FieldType::Integer)
                    .with_derive(RuleBody::expr(Expr::name("rating").add(Expr::name("category")))),
            )
            .build_shared()
            .unwrap();

        let mut session = session_with_changes(
            def,
            &[
                ("rating", Value::Integer(4)),
                ("category", Value::Integer(2)),
                ("score", Value::Integer(999)),
            ],
        );

        DeriveStage.run(&mut session, &Bindings::new());
        assert_eq!(session.change("score"), Some(&Value::Integer(6)));
        assert!(session.valid());
    }

    #[test]
    fn test_validations_accumulate_without_short_circuit() {
        let def = RecordDefinition::builder("exam")
            .field(
                FieldDefinition::new("code", FieldType::String)
                    .with_validation(Constraint::MinLength(10))
                    .with_validation(Constraint::Format("^[0-9]+$".into()))
                    .with_validation(Constraint::Exclusion(vec![Value::String("abc".into())])),
            )
            .build_shared()
            .unwrap();

        let mut session = session_with_changes(def, &[("code", Value::String("abc".into()))]);
        ValidateStage.run(&mut session, &Bindings::new());

        assert_eq!(session.errors().len(), 3);
    }

    #[test]
    fn test_validations_skip_absent_fields() {
        let def = RecordDefinition::builder("exam")
            .field(
                FieldDefinition::new("age", FieldType::Integer)
                    .with_validation(Constraint::GreaterThan(Operand::from(0))),
            )
            .build_shared()
            .unwrap();

        let mut session = session_with_changes(def, &[]);
        ValidateStage.run(&mut session, &Bindings::new());
        assert!(session.valid());
    }

    #[test]
    fn test_constraint_bound_from_binding() {
        let def = RecordDefinition::builder("person")
            .field(
                FieldDefinition::new("age", FieldType::Integer)
                    .with_validation(Constraint::LessThan(Operand::from("max_age"))),
            )
            .build_shared()
            .unwrap();

        let mut session = session_with_changes(def, &[("age", Value::Integer(130))]);
        let bindings = Bindings::new().with("max_age", Value::Integer(100));
        ValidateStage.run(&mut session, &bindings);

        assert_eq!(session.errors().len(), 1);
        assert_eq!(session.errors()[0].rendered(), "must be less than 100");
    }

    #[test]
    fn test_block_records_clause_index_and_checks_all_pairs() {
        let fail_first = RuleBody::expr(Expr::lit("too small"));
        let fail_third = RuleBody::expr(Expr::lit(Value::List(vec![
            Value::String("error".into()),
            Value::String("not even".into()),
        ])));

        let def = RecordDefinition::builder("exam")
            .field(
                FieldDefinition::new("n", FieldType::Integer)
                    // clause 0: fires and fails
                    .with_block_clause(
                        RuleBody::expr(Expr::self_value().lt(Expr::lit(10))),
                        fail_first,
                    )
                    // clause 1: condition falsy, skipped
                    .with_block_clause(
                        RuleBody::expr(Expr::self_value().gt(Expr::lit(100))),
                        RuleBody::expr(Expr::lit("too big")),
                    )
                    // clause 2: fires and fails with an (error, reason) pair
                    .with_block_clause(RuleBody::expr(Expr::lit(true)), fail_third),
            )
            .build_shared()
            .unwrap();

        let mut session = session_with_changes(def, &[("n", Value::Integer(3))]);
        BlockStage.run(&mut session, &Bindings::new());

        let errors = session.errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].clause, Some(0));
        assert_eq!(errors[0].rendered(), "too small");
        assert_eq!(errors[1].clause, Some(2));
        assert_eq!(errors[1].rendered(), "not even");
    }

    #[test]
    fn test_block_unsupported_outcome_is_evaluator_error() {
        let def = RecordDefinition::builder("exam")
            .field(FieldDefinition::new("n", FieldType::Integer).with_block_clause(
                RuleBody::expr(Expr::lit(true)),
                RuleBody::expr(Expr::lit(42)),
            ))
            .build_shared()
            .unwrap();

        let mut session = session_with_changes(def, &[("n", Value::Integer(1))]);
        BlockStage.run(&mut session, &Bindings::new());

        assert_eq!(session.errors().len(), 1);
        assert_eq!(session.errors()[0].kind, ErrorKind::Evaluator);
        assert_eq!(session.errors()[0].clause, Some(0));
    }

    #[test]
    fn test_guard_failure_is_generic() {
        let def = RecordDefinition::builder("exam")
            .field(
                FieldDefinition::new("n", FieldType::Integer)
                    .with_when(RuleBody::expr(Expr::self_value().gt(Expr::lit(0)))),
            )
            .build_shared()
            .unwrap();

        let mut session = session_with_changes(def, &[("n", Value::Integer(-5))]);
        GuardStage.run(&mut session, &Bindings::new());

        assert_eq!(session.errors().len(), 1);
        assert_eq!(session.errors()[0].kind, ErrorKind::GuardFailed);
        assert_eq!(session.errors()[0].message, "guard failed");
    }

    #[test]
    fn test_guard_eval_failure_is_also_generic() {
        let def = RecordDefinition::builder("exam")
            .field(
                FieldDefinition::new("n", FieldType::Integer)
                    .with_when(RuleBody::expr(Expr::name("missing"))),
            )
            .build_shared()
            .unwrap();

        let mut session = session_with_changes(def, &[("n", Value::Integer(1))]);
        GuardStage.run(&mut session, &Bindings::new());

        assert_eq!(session.errors().len(), 1);
        assert_eq!(session.errors()[0].kind, ErrorKind::GuardFailed);
    }

    #[test]
    fn test_map_runs_despite_errors() {
        let def = RecordDefinition::builder("exam")
            .field(
                FieldDefinition::new("name", FieldType::String)
                    .with_map(RuleBody::expr(Expr::self_value().concat(Expr::lit("!")))),
            )
            .build_shared()
            .unwrap();

        let mut session = session_with_changes(def, &[("name", Value::String("ada".into()))]);
        session.add_error(FieldError::new(
            "name",
            ErrorKind::Constraint("min_length".into()),
            "too short",
        ));

        MapStage.run(&mut session, &Bindings::new());
        assert_eq!(session.change("name"), Some(&Value::String("ada!".into())));
        assert!(!session.valid());
    }

    #[test]
    fn test_stages_skip_coercion_failed_fields() {
        let def = RecordDefinition::builder("exam")
            .field(
                FieldDefinition::new("n", FieldType::Integer)
                    .with_validation(Constraint::GreaterThan(Operand::from(0)))
                    .with_map(RuleBody::expr(Expr::self_value().add(Expr::lit(1)))),
            )
            .build_shared()
            .unwrap();

        let mut session = session_with_changes(def, &[]);
        session.mark_coercion_failure("n");

        ValidateStage.run(&mut session, &Bindings::new());
        MapStage.run(&mut session, &Bindings::new());
        assert!(session.errors().is_empty());
        assert!(session.change("n").is_none());
    }
}
