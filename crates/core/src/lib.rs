//! labflow core data models.
//!
//! This crate defines the values every other labflow crate passes around:
//! context identifiers, parameter values, configurations drawn from a
//! parameter space, and the metadata recorded for each task execution.

#![warn(missing_docs)]

// Identities
mod id;

// Parameters
mod value;
mod configuration;
mod space;

// Executions
mod discriminator;
mod metadata;

// Re-exports
pub use id::{ContextId, ParseContextIdError};
pub use value::Value;
pub use configuration::Configuration;
pub use space::{Constraint, Dimension, ParameterSpace, ParameterSpaceIter};
pub use discriminator::{match_constraints, Discriminators, MatchMode};
pub use metadata::ExecutionMetadata;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
