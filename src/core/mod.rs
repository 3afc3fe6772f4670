//! Core types for the Remold validation engine.
//!
//! This module contains the foundational types shared by every other part of
//! the pipeline:
//! - Runtime values and the type coercion contract
//! - Error types
//! - External bindings and the per-rule evaluation scope

pub mod context;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use context::{Bindings, EvalScope};
pub use error::{
    CoerceError, DefinitionError, ErrorKind, EvalError, FieldError, InvalidRecord, RemoldError,
};
pub use types::{Coercer, FieldType, Value};
