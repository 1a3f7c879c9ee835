//! Workspace fixture loading for fixture-driven experiment runs.
//!
//! A fixture file seeds the document store with query sets, judgments and
//! search configurations, and provides the canned backend responses one
//! `releval run` invocation evaluates against.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use releval_engine::FixtureSearchBackend;
use releval_storage::{indices, DocumentStore};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

/// One canned backend response: the ranked document ids a configuration
/// returns for a query, or a simulated failure.
#[derive(Debug, Deserialize)]
pub struct BackendResponse {
    #[serde(rename = "searchConfigurationId")]
    pub search_configuration_id: String,
    #[serde(rename = "queryText")]
    pub query_text: String,
    #[serde(rename = "documentIds", default)]
    pub document_ids: Vec<String>,
    #[serde(default)]
    pub fail: bool,
}

/// Parsed fixture workspace.
#[derive(Debug, Deserialize)]
pub struct FixtureWorkspace {
    #[serde(rename = "querySets", default)]
    pub query_sets: Vec<Value>,
    #[serde(default)]
    pub judgments: Vec<Value>,
    #[serde(rename = "searchConfigurations", default)]
    pub search_configurations: Vec<Value>,
    #[serde(rename = "backendResponses", default)]
    pub backend_responses: Vec<BackendResponse>,
}

impl FixtureWorkspace {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse fixture file {}", path.display()))
    }

    /// Seeds the document store with every fixture document, keyed by each
    /// document's `id` field.
    pub async fn seed(&self, store: &Arc<dyn DocumentStore>) -> Result<()> {
        seed_index(store, indices::QUERY_SETS, &self.query_sets).await?;
        seed_index(store, indices::JUDGMENTS, &self.judgments).await?;
        seed_index(
            store,
            indices::SEARCH_CONFIGURATIONS,
            &self.search_configurations,
        )
        .await?;
        info!(
            "Seeded {} query set(s), {} judgment set(s), {} search configuration(s)",
            self.query_sets.len(),
            self.judgments.len(),
            self.search_configurations.len()
        );
        Ok(())
    }

    /// Builds the fixture backend from the canned responses.
    pub fn backend(&self) -> FixtureSearchBackend {
        let mut backend = FixtureSearchBackend::new();
        for response in &self.backend_responses {
            if response.fail {
                backend.insert_failure(&response.search_configuration_id, &response.query_text);
            } else {
                backend.insert_response(
                    &response.search_configuration_id,
                    &response.query_text,
                    response.document_ids.clone(),
                );
            }
        }
        backend
    }
}

async fn seed_index(
    store: &Arc<dyn DocumentStore>,
    index: &str,
    documents: &[Value],
) -> Result<()> {
    store
        .create_index_if_absent(index)
        .await
        .with_context(|| format!("failed to create index {index}"))?;
    for document in documents {
        let id = document
            .get("id")
            .and_then(Value::as_str)
            .with_context(|| format!("fixture document in {index} is missing an 'id' field"))?;
        store
            .put(index, id, document, false)
            .await
            .with_context(|| format!("failed to seed {index}/{id}"))?;
    }
    Ok(())
}
