//! Experiment evaluation engine for the releval system
//!
//! This crate orchestrates search relevance experiments end to end:
//!
//! - **Aggregator**: fans an experiment out into per-(query, configuration)
//!   tasks, runs them concurrently, and finalizes the experiment exactly once
//! - **Judgment resolver**: merges document grades across judgment sets
//! - **Query executor**: one search attempt per task against a backend
//! - **Import adapter**: normalizes externally-computed evaluation results
//! - **Record writer**: persists experiments and sub-experiments through the
//!   generic document store
//!

pub mod aggregator;
pub mod backend;
pub mod error;
pub mod executor;
pub mod import;
pub mod judgments;
pub mod writer;

pub use aggregator::ExperimentRunner;
pub use backend::{FixtureSearchBackend, HttpSearchBackend, SearchBackend};
pub use error::{EngineError, Result};
pub use executor::QueryExecutor;
pub use import::{flatten_imported_record, FlattenedRecord};
pub use judgments::JudgmentResolver;
pub use writer::RecordWriter;
