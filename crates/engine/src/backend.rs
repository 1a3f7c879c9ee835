//! Search backend trait and implementations.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};

/// One search request against one search configuration.
///
/// Backend-specific timeout and error semantics are opaque to the engine
/// beyond "succeeded with a ranked list" vs "failed with a reason".
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Returns at most `size` ranked document ids for the query.
    async fn search(
        &self,
        configuration_id: &str,
        query_text: &str,
        size: usize,
    ) -> Result<Vec<String>>;
}

#[derive(Serialize)]
struct SearchRequestBody<'a> {
    #[serde(rename = "searchConfigurationId")]
    configuration_id: &'a str,
    query: &'a str,
    size: usize,
}

#[derive(Deserialize)]
struct SearchResponseBody {
    #[serde(rename = "documentIds", default)]
    document_ids: Vec<String>,
}

/// Backend that posts search requests to a remote HTTP endpoint.
///
/// The request timeout bounds one attempt; the engine never retries a
/// failed call.
pub struct HttpSearchBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSearchBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::search_backend(format!("failed to build client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(
        &self,
        configuration_id: &str,
        query_text: &str,
        size: usize,
    ) -> Result<Vec<String>> {
        let url = format!("{}/search", self.endpoint.trim_end_matches('/'));
        debug!("Searching [{configuration_id}] for '{query_text}' (size {size})");

        let body = SearchRequestBody {
            configuration_id,
            query: query_text,
            size,
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::search_backend(format!("request failed: {e}")))?
            .error_for_status()
            .map_err(|e| EngineError::search_backend(format!("backend returned error: {e}")))?;

        let parsed: SearchResponseBody = response
            .json()
            .await
            .map_err(|e| EngineError::search_backend(format!("malformed response: {e}")))?;

        let mut document_ids = parsed.document_ids;
        document_ids.truncate(size);
        Ok(document_ids)
    }
}

/// Backend serving canned responses, used by tests and fixture-driven CLI
/// runs. Queries with no canned entry return an empty list; queries marked
/// as failures return a backend error.
#[derive(Default)]
pub struct FixtureSearchBackend {
    responses: HashMap<String, Vec<String>>,
    failures: HashSet<String>,
}

impl FixtureSearchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(configuration_id: &str, query_text: &str) -> String {
        format!("{configuration_id}::{query_text}")
    }

    pub fn with_response(
        mut self,
        configuration_id: &str,
        query_text: &str,
        document_ids: Vec<String>,
    ) -> Self {
        self.responses
            .insert(Self::key(configuration_id, query_text), document_ids);
        self
    }

    pub fn with_failure(mut self, configuration_id: &str, query_text: &str) -> Self {
        self.failures.insert(Self::key(configuration_id, query_text));
        self
    }

    pub fn insert_response(
        &mut self,
        configuration_id: &str,
        query_text: &str,
        document_ids: Vec<String>,
    ) {
        self.responses
            .insert(Self::key(configuration_id, query_text), document_ids);
    }

    pub fn insert_failure(&mut self, configuration_id: &str, query_text: &str) {
        self.failures.insert(Self::key(configuration_id, query_text));
    }
}

#[async_trait]
impl SearchBackend for FixtureSearchBackend {
    async fn search(
        &self,
        configuration_id: &str,
        query_text: &str,
        size: usize,
    ) -> Result<Vec<String>> {
        let key = Self::key(configuration_id, query_text);
        if self.failures.contains(&key) {
            return Err(EngineError::search_backend(format!(
                "configured failure for [{configuration_id}] query '{query_text}'"
            )));
        }
        let mut document_ids = self.responses.get(&key).cloned().unwrap_or_default();
        document_ids.truncate(size);
        Ok(document_ids)
    }
}
