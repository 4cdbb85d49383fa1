// src/error.rs

//! Error taxonomy for the aggregation core.
//!
//! Source-scoped failures (`AuthFailure`, `SourceFetchFailure`) never cross the
//! adapter boundary; they are turned into an empty contribution plus a
//! diagnostic. `PersistenceConflict` is retryable by re-running reconciliation.
//! `FatalConcurrencyFault` means the fan-out itself broke and no partial result
//! exists.

use std::fmt;

use thiserror::Error;

/// Result type alias for aggregator operations.
pub type Result<T> = std::result::Result<T, AggregatorError>;

#[derive(Error, Debug)]
pub enum AggregatorError {
    /// Token issuance failed for an authenticated source
    #[error("auth failure for {provider}: {message}")]
    AuthFailure { provider: String, message: String },

    /// Network or parse error inside a source adapter
    #[error("fetch failure for {provider}: {message}")]
    SourceFetchFailure { provider: String, message: String },

    /// Uniqueness violation during a batch insert; the batch was rolled back
    #[error("persistence conflict: {0}")]
    PersistenceConflict(String),

    /// The orchestration primitive itself failed
    #[error("fatal concurrency fault: {0}")]
    FatalConcurrencyFault(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AggregatorError {
    pub fn auth(provider: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::AuthFailure {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn fetch(provider: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::SourceFetchFailure {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::PersistenceConflict(message.into())
    }

    pub fn storage(message: impl fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for failures a caller may retry with a fresh reconciliation pass.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::PersistenceConflict(_))
    }
}

impl From<rusqlite::Error> for AggregatorError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::PersistenceConflict(error.to_string())
            }
            _ => Self::Storage(error.to_string()),
        }
    }
}
