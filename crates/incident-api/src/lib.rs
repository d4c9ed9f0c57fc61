//! # Incident API
//!
//! HTTP surface for LLM-Incident-Manager:
//! - `POST /api/v1/alerts/:source` - ingest one source payload
//! - `GET  /api/v1/incidents` - list a user's incidents
//! - `GET  /api/v1/incidents/:id` - fetch one incident with attributions
//! - `POST /api/v1/incidents/:id/status` - external actor transition
//! - `GET  /health` - health probe

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod handlers;
pub mod routes;

use std::sync::Arc;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use llm_incident_core::Error;
use llm_incident_engine::pipeline::IngestPipeline;
use llm_incident_storage::IncidentStore;

/// API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Request timeout applied to every route (seconds)
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Shared state for all handlers
pub struct AppState {
    /// Per-alert ingestion pipeline
    pub pipeline: Arc<IngestPipeline>,
    /// Incident reads and external-actor transitions
    pub incidents: Arc<dyn IncidentStore>,
    /// Service version reported by the health probe
    pub version: String,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("version", &self.version)
            .finish()
    }
}

/// Standard success envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    /// Always true
    pub success: bool,
    /// Response payload
    pub data: T,
}

impl<T> SuccessResponse<T> {
    /// Wrap a payload
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Standard error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    /// Human-readable error
    pub error: String,
}

impl ErrorResponse {
    /// Wrap an error message
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Map a pipeline error onto an HTTP status
pub(crate) fn error_status(error: &Error) -> StatusCode {
    match error {
        Error::MalformedEnvelope(_) => StatusCode::BAD_REQUEST,
        Error::InvalidTransition(_) => StatusCode::CONFLICT,
        Error::Storage(_) | Error::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::routes::create_router;
    pub use crate::{ApiConfig, AppState, ErrorResponse, SuccessResponse};
}
