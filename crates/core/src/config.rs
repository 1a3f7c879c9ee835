//! Configuration for the releval system.
//!
//! Configuration can be loaded from a TOML file and/or environment
//! variables. Environment variables are prefixed with `RELEVAL_` and use
//! double underscores for nested values, e.g.
//! `RELEVAL_BACKEND__ENDPOINT=http://search:9200`.

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

fn default_storage_provider() -> String {
    "memory".to_string()
}

fn default_backend_provider() -> String {
    "fixture".to_string()
}

fn default_backend_endpoint() -> String {
    String::new()
}

fn default_backend_timeout_secs() -> u64 {
    30
}

fn default_result_size() -> usize {
    10
}

fn default_metric_depth() -> usize {
    10
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Provider type: "memory"
    #[serde(default = "default_storage_provider")]
    pub provider: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: default_storage_provider(),
        }
    }
}

/// Search backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Provider type: "http" or "fixture"
    #[serde(default = "default_backend_provider")]
    pub provider: String,

    /// Base URL of the HTTP search endpoint (http provider only)
    #[serde(default = "default_backend_endpoint")]
    pub endpoint: String,

    /// Request timeout for one search call
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: default_backend_provider(),
            endpoint: default_backend_endpoint(),
            timeout_secs: default_backend_timeout_secs(),
        }
    }
}

/// Evaluation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Result list size requested per query when the experiment request
    /// omits one
    #[serde(default = "default_result_size")]
    pub default_size: usize,

    /// Cutoff `k` used for dcg@k / ndcg@k / precision@k / map@k
    #[serde(default = "default_metric_depth")]
    pub metric_depth: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            default_size: default_result_size(),
            metric_depth: default_metric_depth(),
        }
    }
}

/// Main configuration structure for the releval system
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

impl Config {
    /// Loads configuration from a TOML file with environment variable
    /// overrides. A missing file falls back to defaults plus environment.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut builder = ConfigLib::builder();

        if path.exists() {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path));
        } else {
            debug!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("RELEVAL")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to load configuration: {e}")))?
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to parse configuration: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.storage.provider.as_str() {
            "memory" => {}
            other => {
                return Err(Error::config(format!(
                    "unknown storage provider '{other}'"
                )))
            }
        }
        match self.backend.provider.as_str() {
            "fixture" => {}
            "http" => {
                if self.backend.endpoint.trim().is_empty() {
                    return Err(Error::config(
                        "backend.endpoint is required for the http provider",
                    ));
                }
            }
            other => {
                return Err(Error::config(format!(
                    "unknown backend provider '{other}'"
                )))
            }
        }
        if self.evaluation.metric_depth == 0 {
            return Err(Error::config("evaluation.metric_depth must be positive"));
        }
        if self.evaluation.default_size == 0 {
            return Err(Error::config("evaluation.default_size must be positive"));
        }
        Ok(())
    }
}
