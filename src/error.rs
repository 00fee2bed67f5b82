// src/error.rs

//! Unified error handling for the mirror.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Source answered with a status that will not improve on retry
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Timeout, connection reset or 5xx from the source
    #[error("Transient network failure for {context}: {message}")]
    TransientNetwork { context: String, message: String },

    /// Source asked us to slow down
    #[error("Rate limited by {context}")]
    RateLimited {
        context: String,
        retry_after: Option<Duration>,
    },

    /// Directory listing could not be interpreted
    #[error("Malformed listing at {url}: {message}")]
    MalformedListing { url: String, message: String },

    /// Object store rejected a write
    #[error("Destination write failed for {key}: {message}")]
    DestinationWrite { key: String, message: String },

    /// Object store read/list failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Message queue failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Completion message could not be delivered
    #[error("Publish failed after {attempts} attempts: {message}")]
    Publish { attempts: u32, message: String },

    /// Analytics input missing or unusable
    #[error("Dataset error for {key}: {message}")]
    Dataset { key: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error.
    pub fn storage(message: impl fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    /// Create a queue error.
    pub fn queue(message: impl fmt::Display) -> Self {
        Self::Queue(message.to_string())
    }

    pub fn transient(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::TransientNetwork {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn malformed(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::MalformedListing {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn destination_write(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::DestinationWrite {
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn dataset(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Dataset {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Whether a fresh attempt of the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientNetwork { .. } | Self::RateLimited { .. } => true,
            Self::DestinationWrite { .. } | Self::Queue(_) => true,
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            _ => false,
        }
    }

    /// Server-provided wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(AppError::transient("x", "reset").is_retryable());
        assert!(
            AppError::RateLimited {
                context: "x".into(),
                retry_after: None
            }
            .is_retryable()
        );
        assert!(
            !AppError::Status {
                url: "x".into(),
                status: 404
            }
            .is_retryable()
        );
        assert!(!AppError::malformed("x", "binary").is_retryable());
        assert!(!AppError::config("bad").is_retryable());
    }

    #[test]
    fn test_retry_after_only_for_rate_limit() {
        let err = AppError::RateLimited {
            context: "x".into(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(AppError::transient("x", "y").retry_after(), None);
    }
}
