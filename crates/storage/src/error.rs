use releval_core::Error as CoreError;
use thiserror::Error;

/// Storage-specific error types
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("document already exists: {index}/{doc_id}")]
    Conflict { index: String, doc_id: String },

    #[error("document not found: {index}/{doc_id}")]
    NotFound { index: String, doc_id: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { index, doc_id } => {
                CoreError::not_found("document", format!("{index}/{doc_id}"))
            }
            other => CoreError::storage(other.to_string()),
        }
    }
}
