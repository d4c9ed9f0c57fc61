//! Seams to the external collaborators the pipeline talks to.
//!
//! The core never delivers notifications, runs analysis, or writes
//! summaries itself; it calls these traits and moves on. Results are
//! written back by the external services, not awaited here.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use llm_incident_core::events::IncidentEvent;
use llm_incident_core::types::Severity;
use llm_incident_core::Result;

/// Parameters handed to the external root-cause-analysis pipeline
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Incident to analyze
    pub incident_id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Incident title
    pub title: String,
    /// Primary affected service
    pub service: String,
    /// Incident severity
    pub severity: Severity,
    /// Incident metadata snapshot
    pub metadata: HashMap<String, String>,
}

/// Notification fan-out for incident events.
///
/// The core does not know who is listening; a failed publish is logged and
/// absorbed, leaving downstream consumers eventually consistent.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one incident event
    async fn publish(&self, event: &IncidentEvent) -> Result<()>;
}

/// Entry point of the external root-cause-analysis pipeline.
#[async_trait]
pub trait AnalysisTrigger: Send + Sync {
    /// Start an analysis job; returns an opaque task handle.
    ///
    /// Fire-and-forget from the core's perspective: the analysis result is
    /// written back by the external pipeline, and retry/backoff for this
    /// call is owned out there too.
    async fn start_analysis(&self, request: &AnalysisRequest) -> Result<String>;
}

/// External incident summarizer, invoked on every create/update.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    /// Request a summary regeneration for the incident
    async fn request_summary(&self, incident_id: Uuid) -> Result<()>;
}

/// No-op publisher for tests and dry-run deployments
#[derive(Debug, Clone, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _event: &IncidentEvent) -> Result<()> {
        Ok(())
    }
}

/// Publisher that writes events to the structured log.
///
/// Used when no fan-out backend is wired in; keeps incident activity
/// observable in single-binary deployments.
#[derive(Debug, Clone, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &IncidentEvent) -> Result<()> {
        info!(
            incident_id = %event.incident_id,
            user_id = %event.user_id,
            source = %event.source,
            event_type = ?event.event_type,
            "Incident event"
        );
        Ok(())
    }
}

/// No-op analysis trigger for tests and dry-run deployments
#[derive(Debug, Clone, Default)]
pub struct NoopAnalysisTrigger;

#[async_trait]
impl AnalysisTrigger for NoopAnalysisTrigger {
    async fn start_analysis(&self, request: &AnalysisRequest) -> Result<String> {
        Ok(format!("noop-{}", request.incident_id))
    }
}

/// No-op summarizer for tests and dry-run deployments
#[derive(Debug, Clone, Default)]
pub struct NoopSummaryGenerator;

#[async_trait]
impl SummaryGenerator for NoopSummaryGenerator {
    async fn request_summary(&self, _incident_id: Uuid) -> Result<()> {
        Ok(())
    }
}
