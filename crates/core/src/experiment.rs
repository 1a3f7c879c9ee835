//! Experiment data model: specs, lifecycle records, tasks and outcomes.
//!
//! An [`Experiment`] is the aggregate root of one evaluation run. It owns its
//! [`SubExperiment`] records (one per scored task) through the `experimentId`
//! foreign key. [`EvaluationTask`] and [`EvaluationOutcome`] are transient,
//! in-memory forms that only live for the duration of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::query_set::QueryWithReference;

/// Kinds of experiments callers can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentType {
    PairwiseComparison,
    PointwiseEvaluation,
    HybridOptimizer,
    PointwiseEvaluationImport,
}

impl ExperimentType {
    /// Import experiments carry pre-computed results and bypass the
    /// query/judgment/metric pipeline entirely.
    pub fn is_import(&self) -> bool {
        matches!(self, Self::PointwiseEvaluationImport)
    }

    /// Number of search configurations the type requires.
    pub fn required_search_configurations(&self) -> usize {
        match self {
            Self::PairwiseComparison => 2,
            Self::PointwiseEvaluation | Self::HybridOptimizer | Self::PointwiseEvaluationImport => {
                1
            }
        }
    }
}

/// Lifecycle states of an experiment.
///
/// `PENDING -> PROCESSING -> {COMPLETED, FAILED}`. Terminal states are
/// reached exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ExperimentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Immutable input describing one requested experiment.
///
/// Exactly one of `size` (computed flow) and `evaluation_results` (import
/// flow) is active; [`ExperimentSpec::validate`] enforces this before any
/// task is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSpec {
    #[serde(rename = "type")]
    pub experiment_type: ExperimentType,
    #[serde(rename = "querySetId")]
    pub query_set_id: String,
    #[serde(rename = "searchConfigurationList")]
    pub search_configuration_ids: Vec<String>,
    #[serde(rename = "judgmentList", default)]
    pub judgment_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(
        rename = "evaluationResultList",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub evaluation_results: Option<Vec<Value>>,
}

impl ExperimentSpec {
    /// Validates the request shape. All failures here are request-validation
    /// errors, rejected synchronously before any task exists.
    pub fn validate(&self) -> Result<()> {
        if self.query_set_id.trim().is_empty() {
            return Err(Error::invalid_input("querySetId must not be empty"));
        }

        let required = self.experiment_type.required_search_configurations();
        if self.search_configuration_ids.len() != required {
            return Err(Error::invalid_input(format!(
                "{} requires exactly {} search configuration(s), got {}",
                self.experiment_type,
                required,
                self.search_configuration_ids.len()
            )));
        }

        if self.experiment_type.is_import() {
            if self.evaluation_results.is_none() {
                return Err(Error::invalid_input(
                    "import experiments require evaluationResultList",
                ));
            }
            if self.size.is_some() {
                return Err(Error::invalid_input(
                    "size and evaluationResultList are mutually exclusive",
                ));
            }
        } else {
            if self.evaluation_results.is_some() {
                return Err(Error::invalid_input(format!(
                    "evaluationResultList is only valid for {}",
                    ExperimentType::PointwiseEvaluationImport
                )));
            }
            match self.size {
                Some(size) if size > 0 => {}
                Some(_) => return Err(Error::invalid_input("size must be greater than zero")),
                None => {
                    return Err(Error::invalid_input(
                        "size is required for computed experiments",
                    ))
                }
            }
            if self.judgment_ids.is_empty() {
                return Err(Error::invalid_input(
                    "judgmentList must not be empty for computed experiments",
                ));
            }
        }

        Ok(())
    }
}

/// The aggregate root persisted for one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    #[serde(rename = "type")]
    pub experiment_type: ExperimentType,
    pub status: ExperimentStatus,
    pub timestamp: DateTime<Utc>,
    pub spec: ExperimentSpec,
    /// Tasks that produced a successful outcome.
    pub completed: usize,
    /// Tasks that produced a failure outcome.
    pub failed: usize,
    /// Total tasks enumerated for this experiment.
    pub total: usize,
    /// Mean of each metric across successful tasks, populated at finalization.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub summary: BTreeMap<String, f64>,
}

impl Experiment {
    /// Creates a new PENDING experiment for the given spec.
    pub fn new(spec: ExperimentSpec) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            experiment_type: spec.experiment_type,
            status: ExperimentStatus::Pending,
            timestamp: Utc::now(),
            spec,
            completed: 0,
            failed: 0,
            total: 0,
            summary: BTreeMap::new(),
        }
    }
}

/// Persisted form of one task outcome, owned by its experiment.
///
/// The free-form `body` carries the query-identifying field, the metric
/// values hoisted to the top level, and any passthrough fields from imported
/// records. Never mutated after its single write except by an explicit
/// update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubExperiment {
    pub id: String,
    #[serde(rename = "experimentId")]
    pub experiment_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub body: serde_json::Map<String, Value>,
}

impl SubExperiment {
    pub fn new(
        id: String,
        experiment_id: impl Into<String>,
        body: serde_json::Map<String, Value>,
    ) -> Self {
        Self {
            id,
            experiment_id: experiment_id.into(),
            timestamp: Utc::now(),
            body,
        }
    }
}

/// One (query, search configuration) pair to be scored.
///
/// Immutable once created by task enumeration.
#[derive(Debug, Clone)]
pub struct EvaluationTask {
    pub query: QueryWithReference,
    pub search_configuration_id: String,
    pub judgment_ids: Vec<String>,
}

impl EvaluationTask {
    /// Deterministic composite key over (experiment, query identity,
    /// configuration), so re-running the same spec yields distinguishable
    /// sub-experiment ids per run.
    pub fn key(&self, experiment_id: &str) -> String {
        let material = format!(
            "{experiment_id}/{}/{}",
            self.query.combined(),
            self.search_configuration_id
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, material.as_bytes()).to_string()
    }
}

/// Result of one evaluation task, produced exactly once per task.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Success {
        metrics: BTreeMap<String, f64>,
        judgment_ids: Vec<String>,
        document_ids: Vec<String>,
    },
    Failure {
        reason: String,
    },
}

impl EvaluationOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}
