use releval_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while running an experiment.
///
/// Task-level errors (judgment lookup, backend calls, malformed imported
/// records) are recovered locally and recorded as failed sub-experiments;
/// they never abort the experiment. Precondition and storage errors during
/// setup or finalization are experiment-fatal.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no judgments found for query '{query}'")]
    JudgmentNotFound { query: String },

    #[error("search backend error: {0}")]
    SearchBackend(String),

    #[error("invalid imported record: {0}")]
    InvalidRecord(String),

    #[error("experiment precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] releval_core::Error),
}

impl EngineError {
    pub fn search_backend(msg: impl Into<String>) -> Self {
        Self::SearchBackend(msg.into())
    }

    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Whether this error is recorded as a per-task failure rather than
    /// failing the whole experiment.
    pub fn is_task_failure(&self) -> bool {
        matches!(
            self,
            Self::JudgmentNotFound { .. } | Self::SearchBackend(_) | Self::InvalidRecord(_)
        )
    }
}

impl From<EngineError> for releval_core::Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::JudgmentNotFound { query } => {
                releval_core::Error::judgment(format!("no judgments found for query '{query}'"))
            }
            EngineError::SearchBackend(msg) => releval_core::Error::search_backend(msg),
            EngineError::InvalidRecord(msg) => releval_core::Error::invalid_input(msg),
            EngineError::Precondition(msg) => releval_core::Error::invalid_input(msg),
            EngineError::Storage(err) => err.into(),
            EngineError::Core(err) => err,
        }
    }
}
