//! Factory for creating document-store clients from configuration.

use std::sync::Arc;

use releval_core::config::StorageConfig;
use tracing::info;

use crate::{DocumentStore, MemoryDocumentStore, Result, StorageError};

/// Creates a document store for the configured provider.
pub fn create_document_store(config: &StorageConfig) -> Result<Arc<dyn DocumentStore>> {
    match config.provider.as_str() {
        "memory" => {
            info!("Creating in-memory document store");
            Ok(Arc::new(MemoryDocumentStore::new()))
        }
        other => Err(StorageError::InvalidConfig(format!(
            "unknown storage provider '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_provider_is_supported() {
        let config = StorageConfig {
            provider: "memory".to_string(),
        };
        assert!(create_document_store(&config).is_ok());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = StorageConfig {
            provider: "postgres".to_string(),
        };
        assert!(matches!(
            create_document_store(&config),
            Err(StorageError::InvalidConfig(_))
        ));
    }
}
