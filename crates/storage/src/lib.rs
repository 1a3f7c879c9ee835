//! Generic document-store interface backing the releval system indices.
//!
//! The evaluation engine consumes this interface but does not own it: any
//! store that can create indices, put/get/delete documents by id, and answer
//! simple field-equality searches can back an experiment run. The in-memory
//! implementation here is used by tests and the CLI.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod error;
mod factory;
mod memory;

pub use error::StorageError;
pub use factory::create_document_store;
pub use memory::MemoryDocumentStore;

use async_trait::async_trait;
use serde_json::Value;

/// Result type for document-store operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Names of the system indices owned by the releval components.
pub mod indices {
    pub const EXPERIMENTS: &str = "search-relevance-experiment";
    pub const SUB_EXPERIMENTS: &str = "search-relevance-sub-experiment";
    pub const QUERY_SETS: &str = "search-relevance-query-set";
    pub const JUDGMENTS: &str = "search-relevance-judgment";
    pub const SEARCH_CONFIGURATIONS: &str = "search-relevance-search-config";
}

/// A simple field-equality search over one index.
///
/// Matches documents whose top-level fields equal every term filter. An
/// empty query matches everything. Results are finite and the search is
/// restartable by re-issuing the query.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    term_filters: Vec<(String, Value)>,
    size: Option<usize>,
}

impl SearchQuery {
    /// Match-all query.
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds a top-level field equality filter.
    pub fn term(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.term_filters.push((field.into(), value.into()));
        self
    }

    /// Caps the number of returned documents.
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn max_results(&self) -> Option<usize> {
        self.size
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.term_filters
            .iter()
            .all(|(field, value)| document.get(field) == Some(value))
    }
}

/// Generic document store consumed by the evaluation engine.
///
/// All writes use immediate-visibility semantics: a write is observable by a
/// subsequent read issued by the same process without additional delay.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates an index if it does not already exist. An already-existing
    /// index is success, not an error.
    async fn create_index_if_absent(&self, index: &str) -> Result<()>;

    /// Writes a document under `doc_id`. With `create_only`, an existing
    /// document is a [`StorageError::Conflict`]; otherwise the write
    /// overwrites.
    async fn put(&self, index: &str, doc_id: &str, document: &Value, create_only: bool)
        -> Result<()>;

    /// Fetches a document by id, [`StorageError::NotFound`] when absent.
    async fn get(&self, index: &str, doc_id: &str) -> Result<Value>;

    /// Returns all documents matching the query. An unknown index yields an
    /// empty list, never an error.
    async fn search(&self, index: &str, query: &SearchQuery) -> Result<Vec<Value>>;

    /// Deletes a document by id, [`StorageError::NotFound`] when absent.
    async fn delete(&self, index: &str, doc_id: &str) -> Result<()>;
}
