//! Errors raised around the sizing engine
//!
//! The engine never fails: a VM the catalog cannot size gets the fallback
//! recommendation. Failures come from loading catalogs and VM lists, from S3,
//! from the completion endpoint and from the config file.
//!
//! Library functions return [`Result`]. `main.rs` wraps them in `anyhow` and
//! recovers the exit code by downcasting (see `exit_codes`).
//!
//! [`IsRetryable`] marks what `RetryPolicy` may attempt again: completion
//! failures, timeouts and I/O. A bad catalog or an invalid flag fails at once.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SizectlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {source_location} - {message}")]
    Catalog {
        source_location: String,
        message: String,
    },

    #[error("Input error: {source_location} - {message}")]
    Input {
        source_location: String,
        message: String,
    },

    #[error("Validation error: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("AI advisor error: {message}")]
    Advisor {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Timed out after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    #[error("Retryable error (attempt {attempt}/{max_attempts}): {reason}")]
    Retryable {
        attempt: u32,
        max_attempts: u32,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("S3 error: {0}")]
    S3(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, SizectlError>;

/// Whether another attempt could succeed
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for SizectlError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            SizectlError::Retryable { .. }
                | SizectlError::Advisor { .. }
                | SizectlError::Timeout { .. }
                | SizectlError::Io(_)
        )
    }
}

impl SizectlError {
    /// Shorthand for an advisor failure without an underlying source
    pub fn advisor(message: impl Into<String>) -> Self {
        SizectlError::Advisor {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a validation failure
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SizectlError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
