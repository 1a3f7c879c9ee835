use thiserror::Error;

/// Result type for releval operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for releval operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input rejected before any work is dispatched
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// A looked-up resource does not exist, distinct from transient storage
    /// failures so callers can tell "never existed" from "try again"
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    /// Search backend errors
    #[error("Search backend error: {0}")]
    SearchBackend(String),

    /// Judgment resolution errors
    #[error("Judgment error: {0}")]
    Judgment(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Creates a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a not-found error for a named resource
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Creates a search backend error
    pub fn search_backend(msg: impl Into<String>) -> Self {
        Self::SearchBackend(msg.into())
    }

    /// Creates a judgment error
    pub fn judgment(msg: impl Into<String>) -> Self {
        Self::Judgment(msg.into())
    }

    /// Creates a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Adds context to any error
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error is a lookup miss rather than an internal failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::with_context(context, e))
    }
}
