//! Core types for the releval search relevance evaluation system
//!
//! This crate provides the foundational abstractions used throughout the
//! releval workspace, including:
//!
//! - **Experiments**: specs, lifecycle records, tasks and outcomes
//! - **Query sets**: named query collections with optional reference answers
//! - **Judgments**: per-query document relevance grades
//! - **Configuration**: system configuration management
//! - **Error handling**: unified error types
//!

pub mod config;
pub mod error;
pub mod experiment;
pub mod judgment;
pub mod query_set;

// Re-export main types for convenience
pub use config::{BackendConfig, Config, EvaluationConfig, StorageConfig};
pub use error::{Error, Result, ResultExt};
pub use experiment::{
    EvaluationOutcome, EvaluationTask, Experiment, ExperimentSpec, ExperimentStatus,
    ExperimentType, SubExperiment,
};
pub use judgment::{DocumentRating, Judgment};
pub use query_set::{QuerySet, QueryWithReference, QUERY_REFERENCE_DELIMITER};

/// Version of the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Result, ResultExt};
    pub use crate::experiment::{Experiment, ExperimentSpec, ExperimentStatus, ExperimentType};
}
