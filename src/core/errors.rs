use thiserror::Error;

/// Error taxonomy for the RAG core.
///
/// The variants map onto how callers are expected to react:
/// `Configuration` and `NotFound` are fatal to the calling operation,
/// `ExternalService` may be retried while `retryable` is set, and
/// `AmbiguousGrouping` is resolved locally by the chunk grouper and only
/// surfaces in logs.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{provider} request failed: {message}")]
    ExternalService {
        provider: String,
        message: String,
        retryable: bool,
    },

    #[error("ambiguous grouping response: {0}")]
    AmbiguousGrouping(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl RagError {
    pub fn configuration<M: std::fmt::Display>(message: M) -> Self {
        RagError::Configuration(message.to_string())
    }

    /// Permanent external-service failure (bad request, malformed body).
    pub fn service<M: std::fmt::Display>(provider: &str, message: M) -> Self {
        RagError::ExternalService {
            provider: provider.to_string(),
            message: message.to_string(),
            retryable: false,
        }
    }

    /// Transient external-service failure (timeout, rate limit, 5xx).
    pub fn service_transient<M: std::fmt::Display>(provider: &str, message: M) -> Self {
        RagError::ExternalService {
            provider: provider.to_string(),
            message: message.to_string(),
            retryable: true,
        }
    }

    pub fn storage<M: std::fmt::Display>(message: M) -> Self {
        RagError::Storage(message.to_string())
    }

    /// Missing persisted store; the message should tell the caller to rebuild.
    pub fn not_found<M: std::fmt::Display>(message: M) -> Self {
        RagError::NotFound(message.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::ExternalService { retryable: true, .. })
    }
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        RagError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
