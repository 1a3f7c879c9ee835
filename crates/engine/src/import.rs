//! Import adapter: normalizing externally-computed evaluation results.
//!
//! Import experiments supply records already shaped as metric maps. Each
//! record is normalized independently into the same sub-experiment form the
//! computed flow produces; a malformed record becomes a failed
//! sub-experiment and never aborts the import.

use serde_json::{Map, Value};

use crate::error::{EngineError, Result};

/// Preferred query-identifying field on imported records.
pub const SEARCH_TEXT_FIELD: &str = "searchText";
/// Legacy query-identifying field, still accepted.
pub const QUERY_TEXT_FIELD: &str = "queryText";

const METRICS_FIELD: &str = "metrics";

/// One normalized import record.
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedRecord {
    /// The original key the query text arrived under (`searchText` or
    /// `queryText`); preserved as-is, never renamed.
    pub query_key: &'static str,
    pub query_text: String,
    /// All remaining fields with any nested `metrics` mapping hoisted to the
    /// top level and the query-identifying field removed.
    pub fields: Map<String, Value>,
}

impl FlattenedRecord {
    /// The persisted sub-experiment body: the query field under its original
    /// key plus the flattened fields.
    pub fn into_body(self) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert(self.query_key.to_string(), Value::from(self.query_text));
        body.extend(self.fields);
        body
    }
}

/// Normalizes one imported evaluation record.
///
/// Rules, each applied independently per record:
/// - the query-identifying field may be `searchText` (preferred) or the
///   legacy `queryText`; whichever is present is used as the record key;
/// - a nested `metrics` mapping is hoisted to the top level and removed;
/// - all other fields (`judgmentIds`, `documentIds`, free-form `metadata`,
///   ...) pass through unchanged.
pub fn flatten_imported_record(record: &Value) -> Result<FlattenedRecord> {
    let object = record
        .as_object()
        .ok_or_else(|| EngineError::invalid_record("record must be a JSON object"))?;

    let (query_key, query_value) = if let Some(value) = object.get(SEARCH_TEXT_FIELD) {
        (SEARCH_TEXT_FIELD, value)
    } else if let Some(value) = object.get(QUERY_TEXT_FIELD) {
        (QUERY_TEXT_FIELD, value)
    } else {
        return Err(EngineError::invalid_record(format!(
            "record has neither '{SEARCH_TEXT_FIELD}' nor '{QUERY_TEXT_FIELD}'"
        )));
    };
    let query_text = query_value
        .as_str()
        .ok_or_else(|| {
            EngineError::invalid_record(format!("'{query_key}' must be a string"))
        })?
        .to_string();

    let mut fields = Map::new();
    for (key, value) in object {
        if key.as_str() == query_key {
            continue;
        }
        if key.as_str() == METRICS_FIELD {
            let metrics = value.as_object().ok_or_else(|| {
                EngineError::invalid_record("'metrics' must be a mapping")
            })?;
            for (metric_key, metric_value) in metrics {
                fields.insert(metric_key.clone(), metric_value.clone());
            }
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }

    Ok(FlattenedRecord {
        query_key,
        query_text,
        fields,
    })
}
