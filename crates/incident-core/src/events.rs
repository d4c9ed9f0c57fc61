//! Alert, incident, and decision types flowing through the pipeline.
//!
//! - [`AlertEnvelope`]: normalized inbound alert, produced by an adapter,
//!   immutable, destroyed after idempotent persistence.
//! - [`Incident`]: the canonical aggregate one or more correlated alerts
//!   point to; mutated on every correlated alert.
//! - [`IncidentAlert`]: append-only attribution record, one per correlated
//!   alert, exactly one `primary` row per incident.
//! - [`CorrelationDecision`]: the correlator's verdict; never persisted as
//!   its own row.
//! - [`IncidentEvent`]: outbound notification emitted on create/update.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::hash;
use crate::types::{CorrelationStrategy, IncidentStatus, Severity, SourceType};

/// Well-known metadata keys carried on envelopes and attribution rows
pub mod meta {
    /// Source-provided stable grouping key for a recurring alert condition
    pub const FINGERPRINT: &str = "fingerprint";
    /// Distributed trace id linking alerts across sources
    pub const TRACE_ID: &str = "trace_id";
}

// =============================================================================
// ALERT ENVELOPE
// =============================================================================

/// Normalized representation of one inbound monitoring event, independent
/// of its originating platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEnvelope {
    /// Originating platform class
    pub source_type: SourceType,
    /// Source-local alert identifier
    pub source_alert_id: String,
    /// Owning user
    pub user_id: Uuid,
    /// Human-readable alert title
    pub title: String,
    /// Best-effort extracted subject service
    pub service: String,
    /// Normalized severity
    pub severity: Severity,
    /// Open key/value map (trace id, build number, host, query, ...)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Delivery receive time
    pub received_at: DateTime<Utc>,
    /// Stable hash over source-defining fields, used for dedup
    pub content_hash: String,
    /// Opaque source payload, stored for audit, never parsed downstream
    pub raw_payload: serde_json::Value,
}

impl AlertEnvelope {
    /// Build an envelope, computing its content hash.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_type: SourceType,
        source_alert_id: impl Into<String>,
        user_id: Uuid,
        title: impl Into<String>,
        service: impl Into<String>,
        severity: Severity,
        metadata: HashMap<String, String>,
        received_at: DateTime<Utc>,
        raw_payload: serde_json::Value,
    ) -> Self {
        let source_alert_id = source_alert_id.into();
        let title = title.into();
        let service = service.into();
        let content_hash = hash::content_hash(
            user_id,
            source_type,
            &source_alert_id,
            &title,
            &service,
            received_at,
        );
        Self {
            source_type,
            source_alert_id,
            user_id,
            title,
            service,
            severity,
            metadata,
            received_at,
            content_hash,
            raw_payload,
        }
    }

    /// Structural validation; a failing envelope is dropped, never retried.
    pub fn validate(&self) -> Result<()> {
        if self.user_id.is_nil() {
            return Err(Error::malformed("user_id is nil"));
        }
        if self.source_alert_id.is_empty() {
            return Err(Error::malformed("source_alert_id is empty"));
        }
        if self.title.is_empty() {
            return Err(Error::malformed("title is empty"));
        }
        if self.content_hash.is_empty() {
            return Err(Error::malformed("content_hash is empty"));
        }
        Ok(())
    }

    /// Natural key of the incident this envelope would open
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            user_id: self.user_id,
            source_type: self.source_type,
            source_alert_id: self.source_alert_id.clone(),
        }
    }

    /// Source-provided grouping fingerprint, if any
    pub fn fingerprint(&self) -> Option<&str> {
        self.metadata
            .get(meta::FINGERPRINT)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Trace id carried in the metadata, if any
    pub fn trace_id(&self) -> Option<&str> {
        self.metadata
            .get(meta::TRACE_ID)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Identity of the first alert that opened an incident.
///
/// Exactly one incident exists per natural key; concurrent "no match"
/// conclusions for the same key collapse through the store's upsert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    /// Owning user
    pub user_id: Uuid,
    /// Source of the founding alert
    pub source_type: SourceType,
    /// Source-local id of the founding alert
    pub source_alert_id: String,
}

// =============================================================================
// INCIDENT
// =============================================================================

/// The canonical incident aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    /// Generated identifier
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Source of the founding alert
    pub primary_source_type: SourceType,
    /// Source-local id of the founding alert
    pub primary_source_alert_id: String,
    /// Incident title, taken from the founding alert
    pub title: String,
    /// Primary affected service
    pub service: String,
    /// Severity of the founding alert
    pub severity: Severity,
    /// Lifecycle state
    pub status: IncidentStatus,
    /// When the incident opened; immutable once `status == analyzed`
    pub started_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Number of attributed alerts, including the primary
    pub correlated_alert_count: u64,
    /// Distinct services seen across attributed alerts
    pub affected_services: Vec<String>,
    /// Merged, most-recent-wins metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Opaque handle to the external RCA job, written back by that pipeline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_task_ref: Option<String>,
}

impl Incident {
    /// Create a fresh incident from its founding envelope.
    ///
    /// Counters and the service set start empty; the primary attribution
    /// seeds them.
    pub fn from_envelope(envelope: &AlertEnvelope) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: envelope.user_id,
            primary_source_type: envelope.source_type,
            primary_source_alert_id: envelope.source_alert_id.clone(),
            title: envelope.title.clone(),
            service: envelope.service.clone(),
            severity: envelope.severity,
            status: IncidentStatus::Investigating,
            started_at: now,
            updated_at: now,
            correlated_alert_count: 0,
            affected_services: Vec::new(),
            metadata: envelope.metadata.clone(),
            analysis_task_ref: None,
        }
    }

    /// Natural key of this incident
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            user_id: self.user_id,
            source_type: self.primary_source_type,
            source_alert_id: self.primary_source_alert_id.clone(),
        }
    }
}

// =============================================================================
// ATTRIBUTION
// =============================================================================

/// Append-only record attributing one alert to an incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentAlert {
    /// Generated identifier
    pub id: Uuid,
    /// Owning incident
    pub incident_id: Uuid,
    /// Source of the attributed alert
    pub source_type: SourceType,
    /// Source-local alert id
    pub source_alert_id: String,
    /// Alert title
    pub title: String,
    /// Alert service
    pub service: String,
    /// Alert severity
    pub severity: Severity,
    /// Matching strategy that attributed this alert
    pub strategy: CorrelationStrategy,
    /// Match confidence in [0, 1]
    pub score: f64,
    /// Strategy-specific explanation of the match
    #[serde(default)]
    pub details: HashMap<String, String>,
    /// Alert metadata snapshot
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// When the attribution was written
    pub attributed_at: DateTime<Utc>,
}

/// The fields of an attribution before the store assigns identity.
///
/// Built from the envelope plus the correlation decision; the store turns
/// it into an [`IncidentAlert`] row inside its atomic attach operation.
#[derive(Debug, Clone)]
pub struct Attribution {
    /// Source of the attributed alert
    pub source_type: SourceType,
    /// Source-local alert id
    pub source_alert_id: String,
    /// Alert title
    pub title: String,
    /// Alert service
    pub service: String,
    /// Alert severity
    pub severity: Severity,
    /// Matching strategy
    pub strategy: CorrelationStrategy,
    /// Match confidence in [0, 1]
    pub score: f64,
    /// Strategy-specific match explanation
    pub details: HashMap<String, String>,
    /// Alert metadata snapshot
    pub metadata: HashMap<String, String>,
}

impl Attribution {
    /// Attribution for a correlated alert
    pub fn correlated(
        envelope: &AlertEnvelope,
        strategy: CorrelationStrategy,
        score: f64,
        details: HashMap<String, String>,
    ) -> Self {
        Self {
            source_type: envelope.source_type,
            source_alert_id: envelope.source_alert_id.clone(),
            title: envelope.title.clone(),
            service: envelope.service.clone(),
            severity: envelope.severity,
            strategy,
            score,
            details,
            metadata: envelope.metadata.clone(),
        }
    }

    /// Attribution for the alert that opened the incident
    pub fn primary(envelope: &AlertEnvelope) -> Self {
        Self::correlated(envelope, CorrelationStrategy::Primary, 1.0, HashMap::new())
    }
}

// =============================================================================
// CORRELATION DECISION
// =============================================================================

/// The correlator's verdict for one envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationDecision {
    /// Whether the alert attaches to an existing incident
    pub is_correlated: bool,
    /// Target incident, present iff correlated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<Uuid>,
    /// Winning strategy, present iff correlated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<CorrelationStrategy>,
    /// Match confidence in [0, 1]; 0.0 when uncorrelated
    pub score: f64,
    /// Strategy-specific match explanation
    #[serde(default)]
    pub details: HashMap<String, String>,
}

impl CorrelationDecision {
    /// Decision attaching the alert to `incident_id`
    pub fn correlated(
        incident_id: Uuid,
        strategy: CorrelationStrategy,
        score: f64,
        details: HashMap<String, String>,
    ) -> Self {
        Self {
            is_correlated: true,
            incident_id: Some(incident_id),
            strategy: Some(strategy),
            score,
            details,
        }
    }

    /// Decision to open a new incident
    pub fn uncorrelated() -> Self {
        Self {
            is_correlated: false,
            incident_id: None,
            strategy: None,
            score: 0.0,
            details: HashMap::new(),
        }
    }
}

// =============================================================================
// OUTBOUND EVENTS
// =============================================================================

/// Kind of outbound incident notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentEventType {
    /// Incident created or its primary row updated
    IncidentUpdate,
    /// An alert was attributed to an existing incident
    AlertCorrelated,
}

/// Event emitted to the notification fan-out on every incident mutation.
///
/// The core does not know who is listening; delivery is eventually
/// consistent and a missed event is the pipeline's only externally
/// observable failure mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentEvent {
    /// Event kind
    #[serde(rename = "type")]
    pub event_type: IncidentEventType,
    /// Subject incident
    pub incident_id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Source of the alert that caused the event
    pub source: SourceType,
    /// Winning strategy for `alert_correlated` events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<CorrelationStrategy>,
    /// Match score for `alert_correlated` events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> AlertEnvelope {
        AlertEnvelope::new(
            SourceType::Metrics,
            "mon-42",
            Uuid::new_v4(),
            "p99 latency above threshold",
            "checkout-api",
            Severity::High,
            HashMap::from([(meta::TRACE_ID.to_string(), "trace-abc".to_string())]),
            Utc::now(),
            serde_json::json!({"monitor": 42}),
        )
    }

    #[test]
    fn test_envelope_validation() {
        let env = envelope();
        assert!(env.validate().is_ok());

        let mut bad = env.clone();
        bad.user_id = Uuid::nil();
        assert!(matches!(
            bad.validate(),
            Err(Error::MalformedEnvelope(_))
        ));

        let mut bad = env;
        bad.title.clear();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_metadata_accessors() {
        let env = envelope();
        assert_eq!(env.trace_id(), Some("trace-abc"));
        assert_eq!(env.fingerprint(), None);
    }

    #[test]
    fn test_natural_key_matches_incident() {
        let env = envelope();
        let incident = Incident::from_envelope(&env);
        assert_eq!(env.natural_key(), incident.natural_key());
        assert_eq!(incident.status, IncidentStatus::Investigating);
        assert_eq!(incident.correlated_alert_count, 0);
        assert!(incident.affected_services.is_empty());
    }

    #[test]
    fn test_primary_attribution() {
        let env = envelope();
        let attribution = Attribution::primary(&env);
        assert_eq!(attribution.strategy, CorrelationStrategy::Primary);
        assert_eq!(attribution.score, 1.0);
    }

    #[test]
    fn test_event_serde_shape() {
        let event = IncidentEvent {
            event_type: IncidentEventType::AlertCorrelated,
            incident_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            source: SourceType::Ci,
            strategy: Some(CorrelationStrategy::TraceMatch),
            score: Some(0.9),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "alert_correlated");
        assert_eq!(json["strategy"], "trace-match");
    }
}
