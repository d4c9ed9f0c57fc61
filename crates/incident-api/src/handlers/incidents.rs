//! Incident query and transition handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use llm_incident_core::events::{Incident, IncidentAlert};
use llm_incident_core::types::IncidentStatus;

use crate::{error_status, AppState, ErrorResponse, SuccessResponse};

/// Query parameters for listing incidents
#[derive(Debug, Clone, Deserialize)]
pub struct ListIncidentsQuery {
    /// Owning user
    pub user_id: Uuid,
}

/// One incident with its attribution rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentDetail {
    /// The incident record
    pub incident: Incident,
    /// Attributed alerts in attach order
    pub alerts: Vec<IncidentAlert>,
}

/// Request to transition an incident's status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStatusRequest {
    /// Target status
    pub status: IncidentStatus,
}

/// GET /api/v1/incidents?user_id=...
#[instrument(skip(state))]
pub async fn list_incidents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListIncidentsQuery>,
) -> Response {
    match state.incidents.list_incidents(query.user_id).await {
        Ok(incidents) => (StatusCode::OK, Json(SuccessResponse::new(incidents))).into_response(),
        Err(e) => (error_status(&e), Json(ErrorResponse::new(e.to_string()))).into_response(),
    }
}

/// GET /api/v1/incidents/:id
#[instrument(skip(state))]
pub async fn get_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    let incident = match state.incidents.get(id).await {
        Ok(Some(incident)) => incident,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(format!("incident {id} not found"))),
            )
                .into_response();
        }
        Err(e) => {
            return (error_status(&e), Json(ErrorResponse::new(e.to_string()))).into_response();
        }
    };
    match state.incidents.alerts_for_incident(id).await {
        Ok(alerts) => (
            StatusCode::OK,
            Json(SuccessResponse::new(IncidentDetail { incident, alerts })),
        )
            .into_response(),
        Err(e) => (error_status(&e), Json(ErrorResponse::new(e.to_string()))).into_response(),
    }
}

/// POST /api/v1/incidents/:id/status
#[instrument(skip(state, request), fields(status = %request.status))]
pub async fn set_incident_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetStatusRequest>,
) -> Response {
    match state.incidents.set_status(id, request.status).await {
        Ok(incident) => (StatusCode::OK, Json(SuccessResponse::new(incident))).into_response(),
        Err(e) => (error_status(&e), Json(ErrorResponse::new(e.to_string()))).into_response(),
    }
}
