//! Error taxonomy for the incident pipeline.
//!
//! Errors fall into two classes the pipeline cares about:
//! - **Transient** (`Storage`, `Timeout`): the caller retries the whole
//!   per-alert unit with bounded attempts and backoff.
//! - **Permanent** (everything else): retrying cannot help; the error is
//!   logged and surfaced.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the incident pipeline and its stores
#[derive(Debug, Error)]
pub enum Error {
    /// Storage backend failure (connection reset, query failure)
    #[error("Storage error: {0}")]
    Storage(String),

    /// A store operation exceeded its bounded timeout
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Envelope failed structural validation
    #[error("Malformed alert envelope: {0}")]
    MalformedEnvelope(String),

    /// A status transition was rejected by the incident state machine
    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    /// Configuration validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Outbound incident event could not be published
    #[error("Failed to publish incident event: {0}")]
    Publish(String),

    /// Downstream analysis trigger call failed
    #[error("Failed to start analysis: {0}")]
    Analysis(String),

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a malformed-envelope error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEnvelope(msg.into())
    }

    /// Create an invalid-transition error
    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a publish error
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    /// Create an analysis-trigger error
    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis(msg.into())
    }

    /// Whether the failed unit of work may be retried.
    ///
    /// Malformed envelopes are never retried: retrying cannot fix a
    /// structurally invalid payload.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Timeout(_))
    }
}

/// Result alias used across all incident-manager crates
pub type Result<T> = std::result::Result<T, Error>;
