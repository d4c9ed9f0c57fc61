//! API route definitions.
//!
//! All endpoints are exposed through a single service:
//!
//! ## Ingestion
//! - `POST /api/v1/alerts/:source` - ingest one source payload
//!
//! ## Incidents
//! - `GET  /api/v1/incidents` - list a user's incidents
//! - `GET  /api/v1/incidents/:id` - fetch one incident with attributions
//! - `POST /api/v1/incidents/:id/status` - external actor transition
//!
//! ## Infrastructure
//! - `GET /health` - health probe

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;

use crate::{
    handlers::{get_incident, health, ingest_alert, list_incidents, set_incident_status},
    ApiConfig, AppState,
};

/// Create the main API router
pub fn create_router(config: ApiConfig, state: Arc<AppState>) -> Router {
    let api_v1 = Router::new()
        .route("/alerts/:source", post(ingest_alert))
        .route("/incidents", get(list_incidents))
        .route("/incidents/:id", get(get_incident))
        .route("/incidents/:id/status", post(set_incident_status))
        .with_state(Arc::clone(&state));

    let health_routes = Router::new()
        .route("/health", get(health))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(health_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeout_secs)))
}
