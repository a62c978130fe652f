//! Error types and result handling for the AIOps incident engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("LLM output parse error: {0}")]
    LlmParse(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if the error is retryable (transient per the propagation policy)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Store(_) | Error::Timeout(_)
        )
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Network(_) => "network",
            Error::Store(_) => "store",
            Error::Timeout(_) => "timeout",
            Error::LlmParse(_) => "llm_parse",
            Error::Execution(_) => "execution",
            Error::Notification(_) => "notification",
            Error::Serialization(_) => "serialization",
            Error::Internal(_) => "internal",
        }
    }
}
