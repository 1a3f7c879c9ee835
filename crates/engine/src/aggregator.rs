//! Evaluation task aggregator: the experiment fan-out/fan-in state machine.
//!
//! An accepted spec becomes a PENDING experiment, its (query, configuration)
//! tasks are dispatched concurrently, and each outcome is appended as a
//! sub-experiment before the per-experiment counters advance. The decrement
//! that drains the pending counter wins a compare-and-set and performs the
//! terminal write exactly once. Individual task failures are recorded, never
//! fatal; only precondition failures before dispatch fail the experiment.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use futures::future::join_all;
use releval_core::{
    EvaluationOutcome, EvaluationTask, Experiment, ExperimentSpec, ExperimentStatus, QuerySet,
    SubExperiment,
};
use releval_storage::{indices, DocumentStore, StorageError};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::SearchBackend;
use crate::error::{EngineError, Result};
use crate::executor::QueryExecutor;
use crate::import::flatten_imported_record;
use crate::judgments::JudgmentResolver;
use crate::writer::RecordWriter;

/// Mutable shared state for one in-flight experiment.
///
/// The counters are the only hot-path shared state; finalization is guarded
/// by a compare-and-set so exactly one caller performs the terminal write
/// even when the last two tasks complete simultaneously.
struct AggregationContext {
    total: usize,
    pending: AtomicUsize,
    failed: AtomicUsize,
    finalized: AtomicBool,
    metric_sums: Mutex<BTreeMap<String, (f64, usize)>>,
}

impl AggregationContext {
    fn new(total: usize) -> Self {
        Self {
            total,
            pending: AtomicUsize::new(total),
            failed: AtomicUsize::new(0),
            finalized: AtomicBool::new(false),
            metric_sums: Mutex::new(BTreeMap::new()),
        }
    }

    /// Records one task outcome. Returns true when this call drained the
    /// last pending task and won the finalization claim.
    fn record_outcome(&self, task_failed: bool) -> bool {
        if task_failed {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        let previous = self.pending.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "pending counter must never go negative");
        previous == 1 && self.try_claim_finalization()
    }

    /// Single-winner completion check: true exactly once, and only after
    /// every task is accounted for.
    fn try_claim_finalization(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
            && self
                .finalized
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    fn accumulate_metrics(&self, metrics: &BTreeMap<String, f64>) {
        let mut sums = match self.metric_sums.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (name, value) in metrics {
            let entry = sums.entry(name.clone()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }

    fn accumulate_numeric_fields(&self, fields: &Map<String, Value>) {
        let numeric: BTreeMap<String, f64> = fields
            .iter()
            .filter_map(|(name, value)| value.as_f64().map(|v| (name.clone(), v)))
            .collect();
        if !numeric.is_empty() {
            self.accumulate_metrics(&numeric);
        }
    }

    /// `(completed, failed, total)` snapshot. Stable once pending is zero.
    fn tally(&self) -> (usize, usize, usize) {
        let pending = self.pending.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let completed = (self.total - pending).saturating_sub(failed);
        (completed, failed, self.total)
    }

    /// Mean of each accumulated metric across successful tasks.
    fn summary(&self) -> BTreeMap<String, f64> {
        let sums = match self.metric_sums.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sums.iter()
            .map(|(name, (sum, count))| (name.clone(), sum / *count as f64))
            .collect()
    }
}

/// Orchestrates experiment runs end to end.
///
/// `submit` returns the PENDING experiment immediately; the caller polls the
/// experiment and sub-experiment records for progress. Multiple experiments
/// run concurrently without interference, each with its own aggregation
/// context.
#[derive(Clone)]
pub struct ExperimentRunner {
    store: Arc<dyn DocumentStore>,
    writer: RecordWriter,
    resolver: JudgmentResolver,
    executor: QueryExecutor,
    metric_depth: usize,
    contexts: Arc<DashMap<String, Arc<AggregationContext>>>,
}

impl ExperimentRunner {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        backend: Arc<dyn SearchBackend>,
        metric_depth: usize,
    ) -> Self {
        Self {
            writer: RecordWriter::new(store.clone()),
            resolver: JudgmentResolver::new(store.clone()),
            executor: QueryExecutor::new(backend),
            store,
            metric_depth,
            contexts: Arc::new(DashMap::new()),
        }
    }

    pub fn writer(&self) -> &RecordWriter {
        &self.writer
    }

    /// Validates and accepts an experiment spec.
    ///
    /// The PENDING experiment is persisted and returned before any task
    /// runs; evaluation proceeds on a background task.
    pub async fn submit(&self, spec: ExperimentSpec) -> Result<Experiment> {
        spec.validate()?;
        self.writer.ensure_indices().await?;

        let experiment = Experiment::new(spec);
        self.writer.create_experiment(&experiment).await?;
        info!(
            "Accepted experiment [{}] ({})",
            experiment.id, experiment.experiment_type
        );

        let runner = self.clone();
        let driven = experiment.clone();
        tokio::spawn(async move { runner.drive(driven).await });

        Ok(experiment)
    }

    async fn drive(&self, mut experiment: Experiment) {
        let result = if experiment.experiment_type.is_import() {
            self.run_import(&mut experiment).await
        } else {
            self.run_evaluation(&mut experiment).await
        };

        if let Err(e) = result {
            // Precondition or infrastructure failure before task dispatch;
            // task-level errors never propagate here.
            error!("Experiment [{}] failed: {e}", experiment.id);
            experiment.status = ExperimentStatus::Failed;
            if let Err(write_error) = self.writer.finalize_experiment(&experiment).await {
                error!(
                    "Failed to persist FAILED status for experiment [{}]: {write_error}",
                    experiment.id
                );
            }
        }

        self.contexts.remove(&experiment.id);
    }

    async fn run_evaluation(&self, experiment: &mut Experiment) -> Result<()> {
        let spec = experiment.spec.clone();

        let query_set = self.fetch_query_set(&spec.query_set_id).await?;
        query_set.validate().map_err(EngineError::Core)?;
        self.verify_search_configurations(&spec.search_configuration_ids)
            .await?;

        // Cartesian product of queries and configurations, one task per pair
        let mut tasks = Vec::new();
        for query in query_set.normalized_queries() {
            for configuration_id in &spec.search_configuration_ids {
                tasks.push(EvaluationTask {
                    query: query.clone(),
                    search_configuration_id: configuration_id.clone(),
                    judgment_ids: spec.judgment_ids.clone(),
                });
            }
        }

        let context = Arc::new(AggregationContext::new(tasks.len()));
        self.contexts
            .insert(experiment.id.clone(), context.clone());
        experiment.total = tasks.len();

        if tasks.is_empty() {
            info!(
                "Experiment [{}] has no tasks, finalizing immediately",
                experiment.id
            );
            if context.try_claim_finalization() {
                self.finalize(experiment, &context).await?;
            }
            return Ok(());
        }

        experiment.status = ExperimentStatus::Processing;
        self.writer.update_experiment(experiment).await?;
        info!(
            "Experiment [{}] dispatching {} task(s)",
            experiment.id,
            tasks.len()
        );

        let size = spec.size.unwrap_or(self.metric_depth);
        let base = Arc::new(experiment.clone());

        // All tasks run concurrently with no internal cap; the search
        // backend is the natural throttle. The futures are not spawned
        // individually, so they complete within this driver task.
        let task_futures: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let base = base.clone();
                let context = context.clone();
                async move { self.run_task(&base, task, size, context).await }
            })
            .collect();
        join_all(task_futures).await;

        // Backstop completion check; a no-op when the last task already won
        // the finalization claim.
        if context.try_claim_finalization() {
            self.finalize(&base, &context).await?;
        }
        Ok(())
    }

    async fn run_task(
        &self,
        base: &Experiment,
        task: EvaluationTask,
        size: usize,
        context: Arc<AggregationContext>,
    ) {
        let outcome = self.evaluate_task(&task, size).await;
        let sub_experiment = sub_experiment_for_task(base, &task, &outcome);

        let mut task_failed = outcome.is_failure();
        if let Err(e) = self.writer.write_sub_experiment(&sub_experiment).await {
            // The outcome could not be made durable; account it as a failed
            // task rather than stalling the experiment.
            warn!(
                "Recording sub-experiment [{}] failed: {e}",
                sub_experiment.id
            );
            task_failed = true;
        } else if let EvaluationOutcome::Success { metrics, .. } = &outcome {
            context.accumulate_metrics(metrics);
        }

        if context.record_outcome(task_failed) {
            if let Err(e) = self.finalize(base, &context).await {
                error!("Failed to finalize experiment [{}]: {e}", base.id);
            }
        }
    }

    /// Scores one task, converting every task-level error into a failure
    /// outcome. Produces exactly one outcome per task.
    async fn evaluate_task(&self, task: &EvaluationTask, size: usize) -> EvaluationOutcome {
        match self.score_task(task, size).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Task for query '{}' on [{}] failed: {e}",
                    task.query.search_text(),
                    task.search_configuration_id
                );
                EvaluationOutcome::failure(e.to_string())
            }
        }
    }

    async fn score_task(&self, task: &EvaluationTask, size: usize) -> Result<EvaluationOutcome> {
        let judgments = self
            .resolver
            .resolve(task.query.search_text(), &task.judgment_ids)
            .await?;
        let document_ids = self
            .executor
            .execute(&task.query, &task.search_configuration_id, size)
            .await?;
        let metrics = releval_metrics::evaluate(&document_ids, &judgments, self.metric_depth);
        debug!(
            "Scored query '{}' on [{}]: {} result(s)",
            task.query.search_text(),
            task.search_configuration_id,
            document_ids.len()
        );
        Ok(EvaluationOutcome::Success {
            metrics,
            judgment_ids: task.judgment_ids.clone(),
            document_ids,
        })
    }

    async fn run_import(&self, experiment: &mut Experiment) -> Result<()> {
        let records = experiment.spec.evaluation_results.clone().unwrap_or_default();

        let context = Arc::new(AggregationContext::new(records.len()));
        self.contexts
            .insert(experiment.id.clone(), context.clone());
        experiment.total = records.len();

        if records.is_empty() {
            info!(
                "Experiment [{}] imported no records, finalizing immediately",
                experiment.id
            );
            if context.try_claim_finalization() {
                self.finalize(experiment, &context).await?;
            }
            return Ok(());
        }

        experiment.status = ExperimentStatus::Processing;
        self.writer.update_experiment(experiment).await?;
        info!(
            "Experiment [{}] importing {} record(s)",
            experiment.id,
            records.len()
        );

        for (position, record) in records.iter().enumerate() {
            let mut task_failed = false;
            let body = match flatten_imported_record(record) {
                Ok(flattened) => {
                    context.accumulate_numeric_fields(&flattened.fields);
                    flattened.into_body()
                }
                Err(e) => {
                    // Each record normalizes independently; a malformed one
                    // becomes a failed sub-experiment, never a failed import.
                    warn!(
                        "Imported record {position} for experiment [{}] rejected: {e}",
                        experiment.id
                    );
                    task_failed = true;
                    let mut body = Map::new();
                    body.insert("failed".to_string(), Value::Bool(true));
                    body.insert("error".to_string(), Value::from(e.to_string()));
                    body.insert("record".to_string(), record.clone());
                    body
                }
            };

            let id = import_record_id(&experiment.id, position);
            let sub_experiment = SubExperiment::new(id, &experiment.id, body);
            if let Err(e) = self.writer.write_sub_experiment(&sub_experiment).await {
                warn!(
                    "Recording imported sub-experiment [{}] failed: {e}",
                    sub_experiment.id
                );
                task_failed = true;
            }

            if context.record_outcome(task_failed) {
                self.finalize(experiment, &context).await?;
            }
        }
        Ok(())
    }

    /// The terminal write: status, tally and metric summary, issued exactly
    /// once per experiment and only after all sub-experiments are durable.
    async fn finalize(&self, base: &Experiment, context: &AggregationContext) -> Result<()> {
        let (completed, failed, total) = context.tally();

        let mut experiment = base.clone();
        experiment.completed = completed;
        experiment.failed = failed;
        experiment.total = total;
        experiment.summary = context.summary();
        experiment.status = if total > 0 && failed == total {
            // every dispatched task failed; there is nothing to report on
            ExperimentStatus::Failed
        } else {
            ExperimentStatus::Completed
        };

        self.writer.finalize_experiment(&experiment).await?;
        info!(
            "Experiment [{}] finalized as {} ({failed}/{total} task(s) failed)",
            experiment.id, experiment.status
        );
        Ok(())
    }

    async fn fetch_query_set(&self, query_set_id: &str) -> Result<QuerySet> {
        let document = self
            .store
            .get(indices::QUERY_SETS, query_set_id)
            .await
            .map_err(|e| match e {
                StorageError::NotFound { .. } => EngineError::precondition(format!(
                    "query set [{query_set_id}] does not exist"
                )),
                other => EngineError::Storage(other),
            })?;
        serde_json::from_value(document).map_err(|e| {
            EngineError::precondition(format!("query set [{query_set_id}] is malformed: {e}"))
        })
    }

    async fn verify_search_configurations(&self, configuration_ids: &[String]) -> Result<()> {
        for configuration_id in configuration_ids {
            self.store
                .get(indices::SEARCH_CONFIGURATIONS, configuration_id)
                .await
                .map_err(|e| match e {
                    StorageError::NotFound { .. } => EngineError::precondition(format!(
                        "search configuration [{configuration_id}] does not exist"
                    )),
                    other => EngineError::Storage(other),
                })?;
        }
        Ok(())
    }
}

/// Builds the persisted record for one computed task outcome. Metric values
/// live at the top level of the body, matching the flattened import shape.
fn sub_experiment_for_task(
    base: &Experiment,
    task: &EvaluationTask,
    outcome: &EvaluationOutcome,
) -> SubExperiment {
    let mut body = Map::new();
    body.insert("searchText".to_string(), Value::from(task.query.combined()));
    body.insert(
        "searchConfigurationId".to_string(),
        Value::from(task.search_configuration_id.clone()),
    );
    match outcome {
        EvaluationOutcome::Success {
            metrics,
            judgment_ids,
            document_ids,
        } => {
            for (name, value) in metrics {
                body.insert(name.clone(), Value::from(*value));
            }
            body.insert("judgmentIds".to_string(), json!(judgment_ids));
            body.insert("documentIds".to_string(), json!(document_ids));
        }
        EvaluationOutcome::Failure { reason } => {
            body.insert("failed".to_string(), Value::Bool(true));
            body.insert("error".to_string(), Value::from(reason.clone()));
        }
    }
    SubExperiment::new(task.key(&base.id), &base.id, body)
}

/// Deterministic id for the imported record at `position`.
fn import_record_id(experiment_id: &str, position: usize) -> String {
    let material = format!("{experiment_id}/import/{position}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, material.as_bytes()).to_string()
}
