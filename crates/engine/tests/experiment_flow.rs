//! End-to-end experiment flows over the in-memory store and a fixture
//! search backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use releval_core::{Experiment, ExperimentSpec, ExperimentStatus, ExperimentType};
use releval_engine::{EngineError, ExperimentRunner, FixtureSearchBackend, SearchBackend};
use releval_storage::{indices, DocumentStore, MemoryDocumentStore, SearchQuery};
use serde_json::{json, Value};

const METRIC_DEPTH: usize = 10;

async fn seed_query_set(store: &dyn DocumentStore, id: &str, queries: &[&str]) {
    seed_query_set_with_sampling(store, id, queries, "manual").await;
}

async fn seed_query_set_with_sampling(
    store: &dyn DocumentStore,
    id: &str,
    queries: &[&str],
    sampling: &str,
) {
    let query_entries: Vec<Value> = queries
        .iter()
        .map(|q| json!({"queryText": q}))
        .collect();
    let doc = json!({
        "id": id,
        "name": format!("{id} query set"),
        "description": "",
        "sampling": sampling,
        "timestamp": "2025-06-01T00:00:00Z",
        "querySetQueries": query_entries,
    });
    store
        .put(indices::QUERY_SETS, id, &doc, false)
        .await
        .unwrap();
}

async fn seed_judgments(store: &dyn DocumentStore, id: &str, per_query: &[(&str, &[(&str, f64)])]) {
    let mut scores = serde_json::Map::new();
    for (query, ratings) in per_query {
        let entries: Vec<Value> = ratings
            .iter()
            .map(|(doc_id, rating)| json!({"docId": doc_id, "rating": rating}))
            .collect();
        scores.insert(query.to_string(), Value::Array(entries));
    }
    let doc = json!({"id": id, "name": id, "scores": scores});
    store
        .put(indices::JUDGMENTS, id, &doc, false)
        .await
        .unwrap();
}

async fn seed_search_configuration(store: &dyn DocumentStore, id: &str) {
    let doc = json!({"id": id, "name": format!("{id} config"), "index": "products"});
    store
        .put(indices::SEARCH_CONFIGURATIONS, id, &doc, false)
        .await
        .unwrap();
}

async fn wait_for_terminal(runner: &ExperimentRunner, experiment_id: &str) -> Experiment {
    for _ in 0..500 {
        if let Ok(experiment) = runner.writer().get_experiment(experiment_id).await {
            if experiment.status.is_terminal() {
                return experiment;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("experiment [{experiment_id}] never reached a terminal state");
}

fn pointwise_spec(query_set_id: &str, configs: &[&str], judgments: &[&str]) -> ExperimentSpec {
    ExperimentSpec {
        experiment_type: ExperimentType::PointwiseEvaluation,
        query_set_id: query_set_id.to_string(),
        search_configuration_ids: configs.iter().map(|s| s.to_string()).collect(),
        judgment_ids: judgments.iter().map(|s| s.to_string()).collect(),
        size: Some(10),
        evaluation_results: None,
    }
}

fn import_spec(records: Vec<Value>) -> ExperimentSpec {
    ExperimentSpec {
        experiment_type: ExperimentType::PointwiseEvaluationImport,
        query_set_id: "qs-import".to_string(),
        search_configuration_ids: vec!["cfg1".to_string()],
        judgment_ids: vec![],
        size: None,
        evaluation_results: Some(records),
    }
}

/// Backend that counts calls, for proving the import flow never touches the
/// query executor.
struct CountingBackend {
    calls: AtomicUsize,
}

#[async_trait]
impl SearchBackend for CountingBackend {
    async fn search(
        &self,
        _configuration_id: &str,
        _query_text: &str,
        _size: usize,
    ) -> releval_engine::Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![])
    }
}

#[tokio::test]
async fn pointwise_experiment_completes_with_one_sub_experiment_per_query() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let queries = ["q1", "q2", "q3", "q4", "q5"];
    seed_query_set(store.as_ref(), "qs1", &queries).await;
    seed_search_configuration(store.as_ref(), "cfg1").await;
    let ratings: &[(&str, f64)] = &[("d1", 2.0), ("d2", 1.0)];
    seed_judgments(
        store.as_ref(),
        "j1",
        &queries.map(|q| (q, ratings)),
    )
    .await;

    let mut backend = FixtureSearchBackend::new();
    for q in queries {
        backend.insert_response("cfg1", q, vec!["d1".to_string(), "d2".to_string()]);
    }
    let runner = ExperimentRunner::new(store, Arc::new(backend), METRIC_DEPTH);

    let accepted = runner
        .submit(pointwise_spec("qs1", &["cfg1"], &["j1"]))
        .await
        .unwrap();
    assert_eq!(accepted.status, ExperimentStatus::Pending);

    let experiment = wait_for_terminal(&runner, &accepted.id).await;
    assert_eq!(experiment.status, ExperimentStatus::Completed);
    assert_eq!(experiment.total, 5);
    assert_eq!(experiment.completed, 5);
    assert_eq!(experiment.failed, 0);

    let sub_experiments = runner
        .writer()
        .list_sub_experiments(&experiment.id)
        .await
        .unwrap();
    assert_eq!(sub_experiments.len(), 5);
    for sub in &sub_experiments {
        assert_eq!(sub["experimentId"], experiment.id);
        assert!(sub.get("ndcg@10").is_some());
        assert_eq!(sub["judgmentIds"], json!(["j1"]));
    }

    // perfect ranking for every query: mean ndcg is 1.0
    assert!((experiment.summary["ndcg@10"] - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn pairwise_experiment_produces_tasks_for_both_configurations() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let queries = ["q1", "q2", "q3"];
    seed_query_set(store.as_ref(), "qs1", &queries).await;
    seed_search_configuration(store.as_ref(), "cfg1").await;
    seed_search_configuration(store.as_ref(), "cfg2").await;
    let ratings: &[(&str, f64)] = &[("d1", 1.0)];
    seed_judgments(store.as_ref(), "j1", &queries.map(|q| (q, ratings))).await;

    let mut backend = FixtureSearchBackend::new();
    for q in queries {
        backend.insert_response("cfg1", q, vec!["d1".to_string()]);
        backend.insert_response("cfg2", q, vec!["d9".to_string(), "d1".to_string()]);
    }
    let runner = ExperimentRunner::new(store, Arc::new(backend), METRIC_DEPTH);

    let mut spec = pointwise_spec("qs1", &["cfg1", "cfg2"], &["j1"]);
    spec.experiment_type = ExperimentType::PairwiseComparison;
    let accepted = runner.submit(spec).await.unwrap();

    let experiment = wait_for_terminal(&runner, &accepted.id).await;
    assert_eq!(experiment.status, ExperimentStatus::Completed);
    assert_eq!(experiment.total, 6);

    let sub_experiments = runner
        .writer()
        .list_sub_experiments(&experiment.id)
        .await
        .unwrap();
    assert_eq!(sub_experiments.len(), 6);
    let for_cfg2 = sub_experiments
        .iter()
        .filter(|s| s["searchConfigurationId"] == "cfg2")
        .count();
    assert_eq!(for_cfg2, 3);
}

#[tokio::test]
async fn failed_judgment_lookup_still_completes_the_experiment() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    seed_query_set(store.as_ref(), "qs1", &["covered", "uncovered"]).await;
    seed_search_configuration(store.as_ref(), "cfg1").await;
    // judgments exist only for one of the two queries
    seed_judgments(store.as_ref(), "j1", &[("covered", &[("d1", 1.0)])]).await;

    let mut backend = FixtureSearchBackend::new();
    backend.insert_response("cfg1", "covered", vec!["d1".to_string()]);
    backend.insert_response("cfg1", "uncovered", vec!["d2".to_string()]);
    let runner = ExperimentRunner::new(store, Arc::new(backend), METRIC_DEPTH);

    let accepted = runner
        .submit(pointwise_spec("qs1", &["cfg1"], &["j1"]))
        .await
        .unwrap();
    let experiment = wait_for_terminal(&runner, &accepted.id).await;

    assert_eq!(experiment.status, ExperimentStatus::Completed);
    assert_eq!(experiment.total, 2);
    assert_eq!(experiment.completed, 1);
    assert_eq!(experiment.failed, 1);

    let sub_experiments = runner
        .writer()
        .list_sub_experiments(&experiment.id)
        .await
        .unwrap();
    assert_eq!(sub_experiments.len(), 2);
    let failed_sub = sub_experiments
        .iter()
        .find(|s| s["failed"] == json!(true))
        .expect("a failed sub-experiment should be recorded");
    assert!(failed_sub["error"]
        .as_str()
        .unwrap()
        .contains("no judgments found"));
}

#[tokio::test]
async fn backend_failure_is_a_task_failure_not_an_experiment_failure() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    seed_query_set(store.as_ref(), "qs1", &["ok", "broken"]).await;
    seed_search_configuration(store.as_ref(), "cfg1").await;
    let ratings: &[(&str, f64)] = &[("d1", 1.0)];
    seed_judgments(
        store.as_ref(),
        "j1",
        &[("ok", ratings), ("broken", ratings)],
    )
    .await;

    let mut backend = FixtureSearchBackend::new();
    backend.insert_response("cfg1", "ok", vec!["d1".to_string()]);
    backend.insert_failure("cfg1", "broken");
    let runner = ExperimentRunner::new(store, Arc::new(backend), METRIC_DEPTH);

    let accepted = runner
        .submit(pointwise_spec("qs1", &["cfg1"], &["j1"]))
        .await
        .unwrap();
    let experiment = wait_for_terminal(&runner, &accepted.id).await;

    assert_eq!(experiment.status, ExperimentStatus::Completed);
    assert_eq!((experiment.completed, experiment.failed), (1, 1));
}

#[tokio::test]
async fn empty_query_set_finalizes_immediately_as_completed() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    seed_query_set(store.as_ref(), "qs-empty", &[]).await;
    seed_search_configuration(store.as_ref(), "cfg1").await;
    seed_judgments(store.as_ref(), "j1", &[("q", &[("d", 1.0)])]).await;

    let runner = ExperimentRunner::new(
        store,
        Arc::new(FixtureSearchBackend::new()),
        METRIC_DEPTH,
    );
    let accepted = runner
        .submit(pointwise_spec("qs-empty", &["cfg1"], &["j1"]))
        .await
        .unwrap();
    let experiment = wait_for_terminal(&runner, &accepted.id).await;

    assert_eq!(experiment.status, ExperimentStatus::Completed);
    assert_eq!(experiment.total, 0);
    assert!(runner
        .writer()
        .list_sub_experiments(&experiment.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn missing_query_set_fails_before_any_task_is_dispatched() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    seed_search_configuration(store.as_ref(), "cfg1").await;

    let runner = ExperimentRunner::new(
        store,
        Arc::new(FixtureSearchBackend::new()),
        METRIC_DEPTH,
    );
    let accepted = runner
        .submit(pointwise_spec("nowhere", &["cfg1"], &["j1"]))
        .await
        .unwrap();
    let experiment = wait_for_terminal(&runner, &accepted.id).await;

    assert_eq!(experiment.status, ExperimentStatus::Failed);
    assert!(runner
        .writer()
        .list_sub_experiments(&experiment.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unresolvable_search_configuration_fails_the_experiment() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    seed_query_set(store.as_ref(), "qs1", &["q1"]).await;
    seed_judgments(store.as_ref(), "j1", &[("q1", &[("d1", 1.0)])]).await;

    let runner = ExperimentRunner::new(
        store,
        Arc::new(FixtureSearchBackend::new()),
        METRIC_DEPTH,
    );
    let accepted = runner
        .submit(pointwise_spec("qs1", &["ghost-config"], &["j1"]))
        .await
        .unwrap();
    let experiment = wait_for_terminal(&runner, &accepted.id).await;
    assert_eq!(experiment.status, ExperimentStatus::Failed);
}

#[tokio::test]
async fn unsupported_sampling_mode_fails_the_experiment() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    seed_query_set_with_sampling(store.as_ref(), "qs-random", &["q1"], "random").await;
    seed_search_configuration(store.as_ref(), "cfg1").await;
    seed_judgments(store.as_ref(), "j1", &[("q1", &[("d1", 1.0)])]).await;

    let runner = ExperimentRunner::new(
        store,
        Arc::new(FixtureSearchBackend::new()),
        METRIC_DEPTH,
    );
    let accepted = runner
        .submit(pointwise_spec("qs-random", &["cfg1"], &["j1"]))
        .await
        .unwrap();
    let experiment = wait_for_terminal(&runner, &accepted.id).await;
    assert_eq!(experiment.status, ExperimentStatus::Failed);
}

#[tokio::test]
async fn experiment_with_only_failing_tasks_ends_failed() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    seed_query_set(store.as_ref(), "qs1", &["q1", "q2"]).await;
    seed_search_configuration(store.as_ref(), "cfg1").await;
    // no judgment docs at all: every task fails its judgment lookup

    let runner = ExperimentRunner::new(
        store,
        Arc::new(FixtureSearchBackend::new()),
        METRIC_DEPTH,
    );
    let accepted = runner
        .submit(pointwise_spec("qs1", &["cfg1"], &["missing-judgment"]))
        .await
        .unwrap();
    let experiment = wait_for_terminal(&runner, &accepted.id).await;

    assert_eq!(experiment.status, ExperimentStatus::Failed);
    assert_eq!(experiment.failed, 2);
    // failed tasks are still recorded as sub-experiments
    assert_eq!(
        runner
            .writer()
            .list_sub_experiments(&experiment.id)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn import_flow_produces_one_sub_experiment_per_record() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let backend = Arc::new(CountingBackend {
        calls: AtomicUsize::new(0),
    });
    let runner = ExperimentRunner::new(store, backend.clone(), METRIC_DEPTH);

    let accepted = runner
        .submit(import_spec(vec![
            json!({"searchText": "q1", "dcg@10": 0.8}),
            json!({
                "searchText": "q2",
                "metrics": {"ndcg@10": 0.85},
                "judgmentIds": ["j1"]
            }),
        ]))
        .await
        .unwrap();
    let experiment = wait_for_terminal(&runner, &accepted.id).await;

    assert_eq!(experiment.status, ExperimentStatus::Completed);
    assert_eq!((experiment.completed, experiment.failed), (2, 0));

    let sub_experiments = runner
        .writer()
        .list_sub_experiments(&experiment.id)
        .await
        .unwrap();
    assert_eq!(sub_experiments.len(), 2);

    let q1 = sub_experiments
        .iter()
        .find(|s| s["searchText"] == "q1")
        .unwrap();
    assert_eq!(q1["dcg@10"], 0.8);
    assert!(q1.get("metrics").is_none());

    let q2 = sub_experiments
        .iter()
        .find(|s| s["searchText"] == "q2")
        .unwrap();
    assert_eq!(q2["ndcg@10"], 0.85);
    assert_eq!(q2["judgmentIds"], json!(["j1"]));
    assert!(q2.get("metrics").is_none());

    // the import path never touches the search backend
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_import_record_is_recorded_not_fatal() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let runner = ExperimentRunner::new(
        store,
        Arc::new(FixtureSearchBackend::new()),
        METRIC_DEPTH,
    );

    let accepted = runner
        .submit(import_spec(vec![
            json!({"searchText": "good", "ndcg@10": 0.9}),
            json!({"noQueryField": true}),
        ]))
        .await
        .unwrap();
    let experiment = wait_for_terminal(&runner, &accepted.id).await;

    assert_eq!(experiment.status, ExperimentStatus::Completed);
    assert_eq!((experiment.completed, experiment.failed, experiment.total), (1, 1, 2));

    let sub_experiments = runner
        .writer()
        .list_sub_experiments(&experiment.id)
        .await
        .unwrap();
    assert_eq!(sub_experiments.len(), 2);
    assert!(sub_experiments.iter().any(|s| s["failed"] == json!(true)));
}

#[tokio::test]
async fn empty_import_list_yields_completed_experiment_with_no_sub_experiments() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let runner = ExperimentRunner::new(
        store,
        Arc::new(FixtureSearchBackend::new()),
        METRIC_DEPTH,
    );

    let accepted = runner.submit(import_spec(vec![])).await.unwrap();
    let experiment = wait_for_terminal(&runner, &accepted.id).await;

    assert_eq!(experiment.status, ExperimentStatus::Completed);
    assert_eq!(experiment.total, 0);
    assert!(runner
        .writer()
        .list_sub_experiments(&experiment.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn invalid_spec_is_rejected_synchronously_and_persists_nothing() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let runner = ExperimentRunner::new(
        store.clone(),
        Arc::new(FixtureSearchBackend::new()),
        METRIC_DEPTH,
    );

    // import spec carrying a size: mutually exclusive fields
    let mut spec = import_spec(vec![]);
    spec.size = Some(10);
    let err = runner.submit(spec).await.unwrap_err();
    assert!(matches!(err, EngineError::Core(_)));

    let experiments = store
        .search(indices::EXPERIMENTS, &SearchQuery::all())
        .await
        .unwrap();
    assert!(experiments.is_empty());
}

#[tokio::test]
async fn concurrent_experiments_do_not_interfere() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    seed_query_set(store.as_ref(), "qs1", &["q1", "q2"]).await;
    seed_search_configuration(store.as_ref(), "cfg1").await;
    let ratings: &[(&str, f64)] = &[("d1", 1.0)];
    seed_judgments(
        store.as_ref(),
        "j1",
        &[("q1", ratings), ("q2", ratings)],
    )
    .await;

    let mut backend = FixtureSearchBackend::new();
    backend.insert_response("cfg1", "q1", vec!["d1".to_string()]);
    backend.insert_response("cfg1", "q2", vec!["d1".to_string()]);
    let runner = ExperimentRunner::new(store, Arc::new(backend), METRIC_DEPTH);

    let first = runner
        .submit(pointwise_spec("qs1", &["cfg1"], &["j1"]))
        .await
        .unwrap();
    let second = runner
        .submit(pointwise_spec("qs1", &["cfg1"], &["j1"]))
        .await
        .unwrap();
    assert_ne!(first.id, second.id);

    let first = wait_for_terminal(&runner, &first.id).await;
    let second = wait_for_terminal(&runner, &second.id).await;
    assert_eq!(first.status, ExperimentStatus::Completed);
    assert_eq!(second.status, ExperimentStatus::Completed);

    // each experiment owns exactly its own sub-experiments
    assert_eq!(
        runner
            .writer()
            .list_sub_experiments(&first.id)
            .await
            .unwrap()
            .len(),
        2
    );
    assert_eq!(
        runner
            .writer()
            .list_sub_experiments(&second.id)
            .await
            .unwrap()
            .len(),
        2
    );
}
