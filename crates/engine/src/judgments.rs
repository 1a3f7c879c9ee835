//! Judgment resolution: merging per-query grades across judgment sets.

use std::collections::HashMap;
use std::sync::Arc;

use releval_core::Judgment;
use releval_storage::{indices, DocumentStore, StorageError};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Resolves the document→grade map for one query across one or more
/// judgment sets.
#[derive(Clone)]
pub struct JudgmentResolver {
    store: Arc<dyn DocumentStore>,
}

impl JudgmentResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Merges grades from the given judgment sets in list order with
    /// last-set-wins precedence. A judgment set that is missing, malformed,
    /// or has no entries for the query contributes nothing; if no set yields
    /// any entry the lookup fails with [`EngineError::JudgmentNotFound`], a
    /// recoverable per-task failure.
    pub async fn resolve(
        &self,
        query_text: &str,
        judgment_ids: &[String],
    ) -> Result<HashMap<String, f64>> {
        let mut merged: HashMap<String, f64> = HashMap::new();
        let mut any_entries = false;

        for judgment_id in judgment_ids {
            let document = match self.store.get(indices::JUDGMENTS, judgment_id).await {
                Ok(document) => document,
                Err(StorageError::NotFound { .. }) => {
                    warn!("Judgment set [{judgment_id}] not found, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let judgment: Judgment = match serde_json::from_value(document) {
                Ok(judgment) => judgment,
                Err(e) => {
                    warn!("Judgment set [{judgment_id}] is malformed, skipping: {e}");
                    continue;
                }
            };

            if let Some(grades) = judgment.grades_for(query_text) {
                debug!(
                    "Judgment set [{judgment_id}] contributed {} grade(s) for '{query_text}'",
                    grades.len()
                );
                any_entries = true;
                merged.extend(grades);
            }
        }

        if !any_entries {
            return Err(EngineError::JudgmentNotFound {
                query: query_text.to_string(),
            });
        }
        Ok(merged)
    }
}
