//! Experiment record writer: persistence of experiments and their
//! sub-experiments through the generic document store.

use std::sync::Arc;

use releval_core::{Error, Experiment, SubExperiment};
use releval_storage::{indices, DocumentStore, SearchQuery};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;

/// Writes experiment and sub-experiment records.
///
/// Writes are idempotent with respect to document identity: putting the same
/// sub-experiment id twice overwrites rather than duplicates.
#[derive(Clone)]
pub struct RecordWriter {
    store: Arc<dyn DocumentStore>,
}

impl RecordWriter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Creates the experiment and sub-experiment indices. Already-existing
    /// indices are success.
    pub async fn ensure_indices(&self) -> Result<()> {
        self.store
            .create_index_if_absent(indices::EXPERIMENTS)
            .await?;
        self.store
            .create_index_if_absent(indices::SUB_EXPERIMENTS)
            .await?;
        Ok(())
    }

    /// First write of a PENDING experiment; create-only so an id collision
    /// surfaces as a conflict instead of silently overwriting.
    pub async fn create_experiment(&self, experiment: &Experiment) -> Result<()> {
        let document = to_document(experiment)?;
        self.store
            .put(indices::EXPERIMENTS, &experiment.id, &document, true)
            .await?;
        Ok(())
    }

    /// Overwrites the experiment record with its current state.
    pub async fn update_experiment(&self, experiment: &Experiment) -> Result<()> {
        let document = to_document(experiment)?;
        self.store
            .put(indices::EXPERIMENTS, &experiment.id, &document, false)
            .await?;
        Ok(())
    }

    /// Persists one task outcome. An unexpected storage failure is retried
    /// once at this call site; a second failure propagates to the caller,
    /// which records the task as failed without broader experiment impact.
    pub async fn write_sub_experiment(&self, sub_experiment: &SubExperiment) -> Result<()> {
        let document = to_document(sub_experiment)?;
        match self
            .store
            .put(indices::SUB_EXPERIMENTS, &sub_experiment.id, &document, false)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    "Sub-experiment [{}] write failed, retrying once: {e}",
                    sub_experiment.id
                );
                self.store
                    .put(indices::SUB_EXPERIMENTS, &sub_experiment.id, &document, false)
                    .await?;
                Ok(())
            }
        }
    }

    /// Terminal write of the experiment with its final status, tally and
    /// metric summary. Issued only after every sub-experiment is durably
    /// written.
    pub async fn finalize_experiment(&self, experiment: &Experiment) -> Result<()> {
        debug_assert!(experiment.status.is_terminal());
        debug!(
            "Finalizing experiment [{}] as {} ({}/{} failed)",
            experiment.id, experiment.status, experiment.failed, experiment.total
        );
        self.update_experiment(experiment).await
    }

    /// Fetches an experiment by id. A missing experiment surfaces as
    /// [`releval_core::Error::NotFound`], distinct from internal errors.
    pub async fn get_experiment(&self, experiment_id: &str) -> Result<Experiment> {
        let document = self.store.get(indices::EXPERIMENTS, experiment_id).await?;
        let experiment = serde_json::from_value(document)
            .map_err(|e| Error::serialization(format!("invalid experiment record: {e}")))?;
        Ok(experiment)
    }

    /// All sub-experiments owned by an experiment, in no guaranteed order.
    pub async fn list_sub_experiments(&self, experiment_id: &str) -> Result<Vec<Value>> {
        let query = SearchQuery::all().term("experimentId", experiment_id);
        Ok(self.store.search(indices::SUB_EXPERIMENTS, &query).await?)
    }

    /// Deletes one sub-experiment. Used by the cascade-deleting collaborator
    /// that owns experiment deletion, never by the aggregator.
    pub async fn delete_sub_experiment(&self, sub_experiment_id: &str) -> Result<()> {
        self.store
            .delete(indices::SUB_EXPERIMENTS, sub_experiment_id)
            .await?;
        Ok(())
    }

    /// Deletes an experiment record and cascades over its sub-experiments.
    pub async fn delete_experiment(&self, experiment_id: &str) -> Result<()> {
        for sub_experiment in self.list_sub_experiments(experiment_id).await? {
            if let Some(id) = sub_experiment.get("id").and_then(Value::as_str) {
                self.delete_sub_experiment(id).await?;
            }
        }
        self.store.delete(indices::EXPERIMENTS, experiment_id).await?;
        Ok(())
    }
}

fn to_document<T: serde::Serialize>(record: &T) -> Result<Value> {
    serde_json::to_value(record)
        .map_err(|e| Error::serialization(format!("failed to serialize record: {e}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use releval_core::{ExperimentSpec, ExperimentStatus, ExperimentType};
    use releval_storage::{MemoryDocumentStore, StorageError};
    use serde_json::Map;

    fn writer() -> RecordWriter {
        RecordWriter::new(Arc::new(MemoryDocumentStore::new()))
    }

    fn experiment() -> Experiment {
        Experiment::new(ExperimentSpec {
            experiment_type: ExperimentType::PointwiseEvaluation,
            query_set_id: "qs1".to_string(),
            search_configuration_ids: vec!["cfg1".to_string()],
            judgment_ids: vec!["j1".to_string()],
            size: Some(10),
            evaluation_results: None,
        })
    }

    fn sub_experiment(id: &str, experiment_id: &str) -> SubExperiment {
        let mut body = Map::new();
        body.insert("searchText".to_string(), Value::from("q1"));
        body.insert("ndcg@10".to_string(), Value::from(0.5));
        SubExperiment::new(id.to_string(), experiment_id, body)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let writer = writer();
        writer.ensure_indices().await.unwrap();
        let experiment = experiment();
        writer.create_experiment(&experiment).await.unwrap();

        let fetched = writer.get_experiment(&experiment.id).await.unwrap();
        assert_eq!(fetched.id, experiment.id);
        assert_eq!(fetched.status, ExperimentStatus::Pending);
    }

    #[tokio::test]
    async fn missing_experiment_is_not_found() {
        let writer = writer();
        writer.ensure_indices().await.unwrap();
        let err = writer.get_experiment("absent").await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Storage(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn sub_experiment_writes_are_idempotent_by_id() {
        let writer = writer();
        writer.ensure_indices().await.unwrap();

        writer
            .write_sub_experiment(&sub_experiment("s1", "exp-1"))
            .await
            .unwrap();
        writer
            .write_sub_experiment(&sub_experiment("s1", "exp-1"))
            .await
            .unwrap();

        let listed = writer.list_sub_experiments("exp-1").await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_owning_experiment() {
        let writer = writer();
        writer.ensure_indices().await.unwrap();
        writer
            .write_sub_experiment(&sub_experiment("s1", "exp-1"))
            .await
            .unwrap();
        writer
            .write_sub_experiment(&sub_experiment("s2", "exp-2"))
            .await
            .unwrap();

        let listed = writer.list_sub_experiments("exp-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["experimentId"], "exp-1");
    }

    #[tokio::test]
    async fn delete_experiment_cascades_over_sub_experiments() {
        let writer = writer();
        writer.ensure_indices().await.unwrap();
        let mut experiment = experiment();
        experiment.status = ExperimentStatus::Completed;
        writer.create_experiment(&experiment).await.unwrap();
        writer
            .write_sub_experiment(&sub_experiment("s1", &experiment.id))
            .await
            .unwrap();
        writer
            .write_sub_experiment(&sub_experiment("s2", &experiment.id))
            .await
            .unwrap();

        writer.delete_experiment(&experiment.id).await.unwrap();
        assert!(writer.get_experiment(&experiment.id).await.is_err());
        assert!(writer
            .list_sub_experiments(&experiment.id)
            .await
            .unwrap()
            .is_empty());
    }
}
