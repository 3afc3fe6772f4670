//! Record definition model.
//!
//! Declaration-time description of a record: fields, nesting, rules, and the
//! active stage chain. Definitions are immutable once built and shared
//! read-only across validation runs.

pub mod definition;
pub mod registry;
pub mod rules;

pub use definition::{
    Cardinality, FieldDefinition, NestedDefinition, RecordDefinition, RecordDefinitionBuilder,
};
pub use registry::DefinitionRegistry;
pub use rules::{BlockClause, Constraint, Operand, RuleSet};
