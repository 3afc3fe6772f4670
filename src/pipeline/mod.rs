//! The validation/transformation pipeline.
//!
//! One run: coerce → requiredness → nested dispatch → the definition's stage
//! chain. The session accumulates changes and errors without ever aborting
//! early; validity is derived at the end.

pub mod runner;
pub mod session;
pub mod stages;

pub use runner::run;
pub use session::{NestedSessions, RunReport, SessionState, ValidationSession};
pub use stages::{
    default_chain, BlockStage, DeriveStage, GuardStage, MapStage, PipelineStage, ValidateStage,
};
