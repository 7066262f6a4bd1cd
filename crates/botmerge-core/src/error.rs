//! Error types for botmerge operations.
//!
//! The categorization helpers on [`Error`] drive the retry predicate: only
//! transient conditions (network failures, 5xx responses, HTTP 429, rate-limit
//! flavored 403s) are retried. Authentication failures and other 4xx responses
//! are permanent and surface immediately.

use thiserror::Error;

/// Main error type for botmerge operations.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport failed (connection, DNS, decode, ...)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication failed
    #[error("authentication error: {0}")]
    Auth(String),

    /// API returned an error response
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The operation was cancelled via its cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// A rate-limiter wait exceeded its configured timeout
    #[error("timed out after {waited_ms}ms waiting for rate limiter '{name}'")]
    RateLimitTimeout { name: String, waited_ms: u64 },

    /// All retry attempts were exhausted
    #[error("operation failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Provider not found / not configured
    #[error("provider not configured: {0}")]
    ProviderNotFound(String),

    /// No configured repository matched the requested scope
    #[error("no repositories matched the requested scope")]
    NoRepositoriesInScope,

    /// Credential storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Returns true if this error is a transient condition worth retrying.
    ///
    /// Retryable: network-level transport failures, HTTP 5xx, HTTP 429,
    /// 403 responses that carry rate-limit wording, and local rate-limiter
    /// timeouts. Everything else (auth, other 4xx, cancellation, config) is
    /// permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(message) => is_network_error(message),
            Error::Api { status, message } => match status {
                429 => true,
                403 => is_rate_limit_message(message),
                500..=599 => true,
                _ => false,
            },
            Error::RateLimitTimeout { .. } => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates rejected credentials.
    pub fn is_auth_error(&self) -> bool {
        match self {
            Error::Auth(_) => true,
            Error::Api {
                status: 401 | 403,
                message,
            } => !is_rate_limit_message(message),
            _ => false,
        }
    }

    /// Returns true if this is a cancellation error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias for botmerge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Checks if an error message indicates a rate limit.
pub fn is_rate_limit_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("rate limit")
        || message.contains("api rate")
        || message.contains("secondary rate")
        || message.contains("abuse detection")
}

/// Checks if an error message indicates a network-level failure.
pub fn is_network_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("timeout")
        || message.contains("timed out")
        || message.contains("connection")
        || message.contains("network")
        || message.contains("dns")
}
