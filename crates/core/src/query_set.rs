//! Query sets: named collections of queries with optional reference answers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator between a query text and its reference answer when both are
/// carried in a single combined string.
pub const QUERY_REFERENCE_DELIMITER: &str = "#";

/// The only sampling mode accepted for stored query sets. Anything else is
/// rejected as invalid input rather than logged and persisted.
pub const SAMPLING_MANUAL: &str = "manual";

/// One query, optionally augmented with a reference answer used by
/// answer-aware judgment generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWithReference {
    #[serde(rename = "queryText")]
    pub query_text: String,
    #[serde(
        rename = "referenceAnswer",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reference_answer: Option<String>,
}

impl QueryWithReference {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            reference_answer: None,
        }
    }

    pub fn with_reference(query_text: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            reference_answer: Some(reference.into()),
        }
    }

    /// Combined `{queryText}#{referenceAnswer}` form used as the stored query
    /// string when a reference answer is present.
    pub fn combined(&self) -> String {
        match &self.reference_answer {
            Some(reference) if !reference.is_empty() => {
                format!(
                    "{}{QUERY_REFERENCE_DELIMITER}{}",
                    self.query_text, reference
                )
            }
            _ => self.query_text.clone(),
        }
    }

    /// Splits a possibly-combined string back into query text and reference
    /// answer. Splits on the first delimiter only.
    pub fn from_combined(combined: &str) -> Self {
        match combined.split_once(QUERY_REFERENCE_DELIMITER) {
            Some((query, reference)) if !reference.is_empty() => {
                Self::with_reference(query, reference)
            }
            _ => Self::new(combined),
        }
    }

    /// The bare query text sent to a search backend, with any reference
    /// answer stripped.
    pub fn search_text(&self) -> &str {
        &self.query_text
    }
}

/// A named, persisted collection of queries to evaluate against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub sampling: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "querySetQueries", default)]
    pub queries: Vec<QueryWithReference>,
}

impl QuerySet {
    /// Rejects query sets with an unsupported sampling mode.
    pub fn validate(&self) -> Result<()> {
        if self.sampling != SAMPLING_MANUAL {
            return Err(Error::invalid_input(format!(
                "unsupported sampling mode '{}', only '{SAMPLING_MANUAL}' is accepted",
                self.sampling
            )));
        }
        Ok(())
    }

    /// Queries normalized from their stored form: entries persisted as
    /// combined `query#reference` strings are split back apart.
    pub fn normalized_queries(&self) -> Vec<QueryWithReference> {
        self.queries
            .iter()
            .map(|q| {
                if q.reference_answer.is_none() {
                    QueryWithReference::from_combined(&q.query_text)
                } else {
                    q.clone()
                }
            })
            .collect()
    }
}
