//! Query executor: one search attempt per task.

use std::sync::Arc;

use releval_core::QueryWithReference;
use tracing::debug;

use crate::backend::SearchBackend;
use crate::error::Result;

/// Issues one search request against one search configuration.
///
/// Single attempt per call; a failure surfaces as a per-task failure and is
/// never retried by the orchestrator. Retries, if desired, are an explicit
/// re-submission of a fresh spec by the caller.
#[derive(Clone)]
pub struct QueryExecutor {
    backend: Arc<dyn SearchBackend>,
}

impl QueryExecutor {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// Runs the query's bare search text (reference answer stripped) and
    /// returns at most `size` ranked document ids.
    pub async fn execute(
        &self,
        query: &QueryWithReference,
        configuration_id: &str,
        size: usize,
    ) -> Result<Vec<String>> {
        let text = query.search_text();
        debug!("Executing query '{text}' against [{configuration_id}]");
        let mut document_ids = self.backend.search(configuration_id, text, size).await?;
        document_ids.truncate(size);
        Ok(document_ids)
    }
}
