//! Relevance judgments: per-query document grade maps.
//!
//! A judgment document groups graded (query, document) pairs under the query
//! text. Ratings may arrive as JSON numbers or as strings (external judgment
//! tooling exports both); both parse to `f64`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// One graded document within a query's rating list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRating {
    #[serde(rename = "docId")]
    pub doc_id: String,
    #[serde(alias = "score", deserialize_with = "rating_from_number_or_string")]
    pub rating: f64,
}

fn rating_from_number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid rating '{s}': {e}"))),
    }
}

/// A persisted judgment set: document grades keyed by query text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub scores: HashMap<String, Vec<DocumentRating>>,
}

impl Judgment {
    /// Document→grade map for one query, or `None` when this set has no
    /// entries for it.
    pub fn grades_for(&self, query_text: &str) -> Option<HashMap<String, f64>> {
        self.scores.get(query_text).map(|ratings| {
            ratings
                .iter()
                .map(|r| (r.doc_id.clone(), r.rating))
                .collect()
        })
    }
}
