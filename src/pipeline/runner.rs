//! The pipeline runner.
//!
//! One run is single-threaded and synchronous: coerce every scalar field,
//! check requiredness, recurse into nested records, then fold the
//! definition's stage chain over the session. Everything completes before
//! the call returns; there are no suspension points and no I/O.

use crate::core::context::Bindings;
use crate::core::error::{ErrorKind, FieldError};
use crate::core::types::Value;
use crate::pipeline::session::{NestedSessions, SessionState, ValidationSession};
use crate::schema::definition::{Cardinality, NestedDefinition, RecordDefinition};
use indexmap::IndexMap;
use std::sync::Arc;

/// Run the full pipeline over raw input.
///
/// Returns the finalized session: inspect `changes`/`errors`/`valid()`, or
/// hand it to the entity materializer. Unknown input keys are ignored.
pub fn run(
    definition: &Arc<RecordDefinition>,
    input: IndexMap<String, Value>,
    bindings: &Bindings,
) -> ValidationSession {
    let mut session = ValidationSession::new(definition.clone(), input);
    log::debug!("validating record '{}'", definition.name());

    coerce(&mut session);
    session.advance(SessionState::Coerced);

    check_required(&mut session);
    dispatch_nested(&mut session, bindings);

    for stage in definition.stages() {
        log::debug!("running stage '{}'", stage.name());
        stage.run(&mut session, bindings);
    }
    session.advance(SessionState::Staged);

    session.advance(SessionState::Finalized);
    log::debug!("record '{}': {}", definition.name(), session.summary());
    session
}

/// Coerce every scalar field: raw value, or the default when absent.
///
/// An explicit null in the input counts as absent. Coercion failure is
/// terminal for the field — the error is recorded and later stages skip it.
fn coerce(session: &mut ValidationSession) {
    let definition = session.definition().clone();
    for field in definition.fields() {
        match session.input().get(&field.name).cloned() {
            None | Some(Value::Null) => {
                if let Some(default) = &field.default {
                    session.set_change(field.name.clone(), default.clone());
                }
            }
            Some(raw) => match field.field_type.coerce(&raw) {
                Ok(value) => session.set_change(field.name.clone(), value),
                Err(e) => {
                    session.mark_coercion_failure(field.name.clone());
                    session.add_error(
                        FieldError::new(field.name.clone(), ErrorKind::Coercion, "is invalid")
                            .with_param("expected", Value::String(e.expected))
                            .with_param("got", Value::String(e.got)),
                    );
                }
            },
        }
    }
}

/// Record a required error for every required field with no entry in
/// changes after coercion.
///
/// Runs before derive, so a required field absent from input errors even
/// when derive supplies a value later. Fields whose coercion failed were
/// supplied, just badly — they get the coercion error only.
fn check_required(session: &mut ValidationSession) {
    let definition = session.definition().clone();
    for name in definition.required_fields() {
        if session.change(name).is_none() && !session.field_failed(name) {
            session.add_error(FieldError::new(name, ErrorKind::Required, "can't be blank"));
        }
    }
}

/// Recursively run the entire pipeline for each nested record field.
fn dispatch_nested(session: &mut ValidationSession, bindings: &Bindings) {
    let definition = session.definition().clone();
    for (name, nested) in definition.nested() {
        let raw = session.input().get(name).cloned();
        match nested.cardinality {
            Cardinality::One => dispatch_one(session, bindings, name, nested, raw),
            Cardinality::Many => dispatch_many(session, bindings, name, nested, raw),
        }
    }
}

/// Absent means: key missing, explicit null, or an empty map (no key of the
/// nested record was supplied).
fn is_blank(raw: &Option<Value>) -> bool {
    match raw {
        None | Some(Value::Null) => true,
        Some(Value::Map(map)) => map.is_empty(),
        Some(_) => false,
    }
}

fn dispatch_one(
    session: &mut ValidationSession,
    bindings: &Bindings,
    name: &str,
    nested: &NestedDefinition,
    raw: Option<Value>,
) {
    if is_blank(&raw) {
        // Fully absent input short-circuits the nested run entirely: a
        // non-required nested record with required sub-fields stays silent.
        if nested.required {
            session.add_error(FieldError::new(name, ErrorKind::Required, "can't be blank"));
        }
        session.set_nested(name.to_string(), NestedSessions::One(None));
        return;
    }

    match raw {
        Some(Value::Map(map)) => {
            let child = run(&nested.definition, map, bindings);
            session.set_nested(name.to_string(), NestedSessions::One(Some(Box::new(child))));
        }
        _ => {
            session.add_error(
                FieldError::new(name, ErrorKind::Coercion, "is invalid")
                    .with_param("expected", Value::String("map".to_string())),
            );
            session.set_nested(name.to_string(), NestedSessions::One(None));
        }
    }
}

fn dispatch_many(
    session: &mut ValidationSession,
    bindings: &Bindings,
    name: &str,
    nested: &NestedDefinition,
    raw: Option<Value>,
) {
    match raw {
        None | Some(Value::Null) => {
            if nested.required {
                session.add_error(FieldError::new(name, ErrorKind::Required, "can't be blank"));
            }
            session.set_nested(name.to_string(), NestedSessions::Many(Vec::new()));
        }
        Some(Value::List(items)) => {
            let mut sessions = Vec::with_capacity(items.len());
            let mut bad_elements = 0usize;
            for item in items {
                match item {
                    Value::Map(map) => sessions.push(run(&nested.definition, map, bindings)),
                    _ => bad_elements += 1,
                }
            }
            if bad_elements > 0 {
                session.add_error(
                    FieldError::new(name, ErrorKind::Coercion, "is invalid")
                        .with_param("expected", Value::String("list of maps".to_string())),
                );
            }
            session.set_nested(name.to_string(), NestedSessions::Many(sessions));
        }
        Some(_) => {
            session.add_error(
                FieldError::new(name, ErrorKind::Coercion, "is invalid")
                    .with_param("expected", Value::String("list".to_string())),
            );
            session.set_nested(name.to_string(), NestedSessions::Many(Vec::new()));
        }
    }
}
