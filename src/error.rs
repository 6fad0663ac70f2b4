//! Error handling for the AutoML client
//!
//! This module defines custom error types and a Result alias for use
//! throughout the crate. The taxonomy matters for orchestration policy:
//! `Validation` never reaches the network, `Transport` is retryable only
//! during status polling, and `NotFound` on a report means "not ready yet".

use thiserror::Error;

/// Main error type for AutoML client operations
#[derive(Error, Debug)]
pub enum AutomlError {
    /// Client-side validation failure, detected before any request is sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// The request could not complete (network failure, timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request completed but the service reported failure
    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// The referenced identifier is unknown to the service
    #[error("Not found: {0}")]
    NotFound(String),

    /// Status polling gave up after exhausting its retry budget
    #[error("Polling abandoned after {attempts} consecutive failed status checks")]
    PollingAbandoned { attempts: u32 },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AutomlError>,
    },
}

impl AutomlError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        AutomlError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error means the resource may simply not exist *yet*
    ///
    /// `NotFound` can be transient for freshly created resources (a report
    /// whose pipeline is still running), so callers treat it as retryable.
    pub fn is_not_ready(&self) -> bool {
        match self {
            AutomlError::NotFound(_) => true,
            AutomlError::WithContext { source, .. } => source.is_not_ready(),
            _ => false,
        }
    }
}

impl From<ureq::Error> for AutomlError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(404, response) => {
                let message = response
                    .into_string()
                    .unwrap_or_else(|_| "resource not found".to_string());
                AutomlError::NotFound(message)
            }
            ureq::Error::Status(status, response) => {
                let message = response
                    .into_string()
                    .unwrap_or_else(|_| "no response body".to_string());
                AutomlError::Server { status, message }
            }
            ureq::Error::Transport(transport) => AutomlError::Transport(transport.to_string()),
        }
    }
}

impl From<serde_json::Error> for AutomlError {
    fn from(err: serde_json::Error) -> Self {
        AutomlError::Serialization(err.to_string())
    }
}

/// Result type alias for AutoML client operations
pub type Result<T> = std::result::Result<T, AutomlError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AutomlError::Validation("target column is empty".to_string());
        assert_eq!(err.to_string(), "Validation error: target column is empty");
    }

    #[test]
    fn test_error_with_context() {
        let err = AutomlError::Transport("connection refused".to_string());
        let with_ctx = err.with_context("Failed to upload dataset");
        assert!(with_ctx.to_string().contains("Failed to upload dataset"));
    }

    #[test]
    fn test_server_error_display() {
        let err = AutomlError::Server {
            status: 500,
            message: "internal error".to_string(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("internal error"));
    }

    #[test]
    fn test_not_ready_detection() {
        assert!(AutomlError::NotFound("report r1".to_string()).is_not_ready());
        assert!(AutomlError::NotFound("report r1".to_string())
            .with_context("fetching report")
            .is_not_ready());
        assert!(!AutomlError::Transport("timeout".to_string()).is_not_ready());
    }
}
