//! Error types for the moderation engine.
//!
//! All errors are explicitly typed using thiserror. Detector failures are
//! recovered inside the pipeline; only configuration problems are fatal.

use thiserror::Error;

/// Central error type for all moderation-engine operations.
#[derive(Debug, Error)]
pub enum ModSentryError {
    /// Configuration error (missing env vars, invalid thresholds, malformed tables).
    ///
    /// Always fatal at startup: the engine refuses to run with undefined policy.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Regex pattern compilation error.
    #[error("Regex pattern error: {0}")]
    RegexPattern(#[from] regex::Error),

    /// Keyword automaton construction error.
    #[error("Keyword table error: {0}")]
    KeywordTable(String),

    /// Classifier API returned an error or unexpected response.
    #[error("Classifier API error: {0}")]
    ClassifierApi(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal state error (invalid state transitions).
    #[error("Internal state error: {0}")]
    InternalState(String),
}

/// Result type alias for moderation-engine operations.
pub type Result<T> = std::result::Result<T, ModSentryError>;
