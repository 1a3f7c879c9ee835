//! In-memory document store used by tests and the CLI.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{DocumentStore, Result, SearchQuery, StorageError};

/// A process-local [`DocumentStore`] holding documents in nested hash maps.
///
/// Writes are immediately visible to subsequent reads. Document ids are
/// unique per index; a put overwrites unless `create_only` is set.
#[derive(Default)]
pub struct MemoryDocumentStore {
    indices: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create_index_if_absent(&self, index: &str) -> Result<()> {
        let mut indices = self.indices.write().await;
        if indices.contains_key(index) {
            debug!("Index [{index}] already exists, skipping creation");
        } else {
            indices.insert(index.to_string(), HashMap::new());
            debug!("Created index [{index}]");
        }
        Ok(())
    }

    async fn put(
        &self,
        index: &str,
        doc_id: &str,
        document: &Value,
        create_only: bool,
    ) -> Result<()> {
        let mut indices = self.indices.write().await;
        // Writes create the target index on demand
        let docs = indices.entry(index.to_string()).or_default();
        if create_only && docs.contains_key(doc_id) {
            return Err(StorageError::Conflict {
                index: index.to_string(),
                doc_id: doc_id.to_string(),
            });
        }
        docs.insert(doc_id.to_string(), document.clone());
        Ok(())
    }

    async fn get(&self, index: &str, doc_id: &str) -> Result<Value> {
        let indices = self.indices.read().await;
        indices
            .get(index)
            .and_then(|docs| docs.get(doc_id))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                index: index.to_string(),
                doc_id: doc_id.to_string(),
            })
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> Result<Vec<Value>> {
        let indices = self.indices.read().await;
        let Some(docs) = indices.get(index) else {
            // Unknown index is an empty result, never an error
            return Ok(Vec::new());
        };
        let mut results: Vec<Value> = docs
            .values()
            .filter(|doc| query.matches(doc))
            .cloned()
            .collect();
        if let Some(size) = query.max_results() {
            results.truncate(size);
        }
        Ok(results)
    }

    async fn delete(&self, index: &str, doc_id: &str) -> Result<()> {
        let mut indices = self.indices.write().await;
        let removed = indices
            .get_mut(index)
            .and_then(|docs| docs.remove(doc_id))
            .is_some();
        if !removed {
            return Err(StorageError::NotFound {
                index: index.to_string(),
                doc_id: doc_id.to_string(),
            });
        }
        Ok(())
    }
}
