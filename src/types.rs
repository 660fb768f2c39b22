//! Error types for Tally

use thiserror::Error;

/// Top-level error type
#[derive(Error, Debug)]
pub enum TallyError {
    /// MongoDB connection or query failure
    #[error("Database error: {0}")]
    Database(String),

    /// Authentication/authorization failure (hashing, tokens, credentials)
    #[error("Auth error: {0}")]
    Auth(String),

    /// HTTP protocol error (bad request body, invalid parameters)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Upstream provider returned an HTTP error status
    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// Outbound client used before initialize() or after shutdown()
    #[error("HTTP client is not initialized. Call initialize() during startup.")]
    NotInitialized,

    /// All retry attempts against an upstream exhausted
    #[error("Request to {url} failed after {attempts} attempt(s): {source}")]
    RequestFailed {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Email delivery failure
    #[error("Email error: {0}")]
    Email(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience result type
pub type Result<T> = std::result::Result<T, TallyError>;
