//! Alert ingestion handler.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use llm_incident_core::types::{CorrelationStrategy, SourceType};
use llm_incident_engine::pipeline::IngestOutcome;
use llm_incident_ingestion::adapters::adapter_for;

use crate::{error_status, AppState, ErrorResponse, SuccessResponse};

/// Request to ingest one source payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Owning user
    pub user_id: Uuid,
    /// Source-shaped webhook payload
    pub payload: serde_json::Value,
}

/// What processing the alert did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    /// `duplicate`, `correlated`, or `opened`
    pub outcome: String,
    /// Stored alert row
    pub alert_id: Uuid,
    /// Incident the alert landed on, absent for duplicates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<Uuid>,
    /// Winning strategy for correlated alerts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<CorrelationStrategy>,
    /// Match score for correlated alerts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        match outcome {
            IngestOutcome::Duplicate { alert_id } => Self {
                outcome: "duplicate".to_string(),
                alert_id,
                incident_id: None,
                strategy: None,
                score: None,
            },
            IngestOutcome::Correlated {
                incident_id,
                alert_id,
                strategy,
                score,
            } => Self {
                outcome: "correlated".to_string(),
                alert_id,
                incident_id: Some(incident_id),
                strategy: Some(strategy),
                score: Some(score),
            },
            IngestOutcome::Opened {
                incident_id,
                alert_id,
            } => Self {
                outcome: "opened".to_string(),
                alert_id,
                incident_id: Some(incident_id),
                strategy: None,
                score: None,
            },
        }
    }
}

/// POST /api/v1/alerts/:source
#[instrument(skip(state, request), fields(source = %source, user_id = %request.user_id))]
pub async fn ingest_alert(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
    Json(request): Json<IngestRequest>,
) -> Response {
    let Some(source_type) = SourceType::parse(&source) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("unknown alert source: {source}"))),
        )
            .into_response();
    };
    let Some(adapter) = adapter_for(source_type) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(format!(
                "no adapter registered for source: {source_type}"
            ))),
        )
            .into_response();
    };

    let envelope = match adapter.normalize(request.user_id, request.payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response();
        }
    };

    match state.pipeline.process_with_retry(&envelope).await {
        Ok(outcome) => {
            info!(alert = %envelope.source_alert_id, "Alert ingested");
            (
                StatusCode::ACCEPTED,
                Json(SuccessResponse::new(IngestResponse::from(outcome))),
            )
                .into_response()
        }
        Err(e) => (
            error_status(&e),
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}
