//! Metrics monitor adapter.
//!
//! Maps monitor-platform webhook payloads (threshold and anomaly
//! monitors) onto the normalized envelope. Monitor platforms issue a
//! stable alert id per condition, so redeliveries dedup on
//! `(user, source, alert_id)` alone.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use llm_incident_core::events::{meta, AlertEnvelope};
use llm_incident_core::types::{Severity, SourceType};
use llm_incident_core::{Error, Result};

use super::SourceAdapter;

/// Webhook payload of a metrics monitor alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsAlertPayload {
    /// Monitor identifier, stable per alert condition
    pub alert_id: String,
    /// Monitor title
    pub title: String,
    /// Scope the monitor fired on
    #[serde(default)]
    pub service: String,
    /// Source priority (p1..p5 or named level)
    #[serde(default)]
    pub priority: Option<String>,
    /// Grouping fingerprint assigned by the monitor platform
    #[serde(default)]
    pub fingerprint: Option<String>,
    /// Trace associated with the triggering request
    #[serde(default)]
    pub trace_id: Option<String>,
    /// Monitor tags
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// When the monitor transitioned to alerting
    #[serde(default)]
    pub triggered_at: Option<DateTime<Utc>>,
}

/// Adapter for metrics monitor alerts
#[derive(Debug, Clone, Default)]
pub struct MetricsAdapter;

impl MetricsAdapter {
    /// Create the adapter
    pub fn new() -> Self {
        Self
    }

    /// Monitor-platform priority vocabulary → normalized severity
    fn normalize_priority(priority: Option<&str>) -> Severity {
        match priority.map(str::to_lowercase).as_deref() {
            Some("p1") | Some("critical") => Severity::Critical,
            Some("p2") | Some("error") | Some("high") => Severity::High,
            Some("p3") | Some("warning") | Some("warn") | Some("medium") => Severity::Medium,
            Some("p4") | Some("p5") | Some("info") | Some("low") => Severity::Low,
            _ => Severity::Unknown,
        }
    }
}

impl SourceAdapter for MetricsAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Metrics
    }

    fn normalize(&self, user_id: Uuid, payload: serde_json::Value) -> Result<AlertEnvelope> {
        let alert: MetricsAlertPayload = serde_json::from_value(payload.clone())
            .map_err(|e| Error::malformed(format!("metrics payload: {e}")))?;

        let mut metadata = alert.tags.clone();
        if let Some(fingerprint) = &alert.fingerprint {
            metadata.insert(meta::FINGERPRINT.to_string(), fingerprint.clone());
        }
        if let Some(trace_id) = &alert.trace_id {
            metadata.insert(meta::TRACE_ID.to_string(), trace_id.clone());
        }

        Ok(AlertEnvelope::new(
            SourceType::Metrics,
            alert.alert_id,
            user_id,
            alert.title,
            alert.service,
            Self::normalize_priority(alert.priority.as_deref()),
            metadata,
            alert.triggered_at.unwrap_or_else(Utc::now),
            payload,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> serde_json::Value {
        serde_json::json!({
            "alert_id": "mon-118",
            "title": "p99 latency above 800ms",
            "service": "checkout-api",
            "priority": "P2",
            "fingerprint": "mon-118:latency",
            "trace_id": "trace-9f2",
            "tags": {"env": "prod", "region": "us-1"},
            "triggered_at": "2026-08-01T10:15:00Z",
        })
    }

    #[test]
    fn test_normalizes_monitor_alert() {
        let adapter = MetricsAdapter::new();
        let env = adapter.normalize(Uuid::new_v4(), payload()).unwrap();

        assert_eq!(env.source_type, SourceType::Metrics);
        assert_eq!(env.source_alert_id, "mon-118");
        assert_eq!(env.service, "checkout-api");
        assert_eq!(env.severity, Severity::High);
        assert_eq!(env.fingerprint(), Some("mon-118:latency"));
        assert_eq!(env.trace_id(), Some("trace-9f2"));
        assert_eq!(env.metadata.get("env").map(String::as_str), Some("prod"));
        assert!(env.validate().is_ok());
    }

    #[test]
    fn test_priority_table() {
        assert_eq!(
            MetricsAdapter::normalize_priority(Some("p1")),
            Severity::Critical
        );
        assert_eq!(
            MetricsAdapter::normalize_priority(Some("warning")),
            Severity::Medium
        );
        assert_eq!(MetricsAdapter::normalize_priority(Some("p5")), Severity::Low);
        assert_eq!(MetricsAdapter::normalize_priority(None), Severity::Unknown);
        assert_eq!(
            MetricsAdapter::normalize_priority(Some("page-me")),
            Severity::Unknown
        );
    }

    #[test]
    fn test_missing_alert_id_is_malformed() {
        let adapter = MetricsAdapter::new();
        let result = adapter.normalize(
            Uuid::new_v4(),
            serde_json::json!({"title": "no id here"}),
        );
        assert!(matches!(result, Err(Error::MalformedEnvelope(_))));
    }

    #[test]
    fn test_raw_payload_rides_along() {
        let adapter = MetricsAdapter::new();
        let env = adapter.normalize(Uuid::new_v4(), payload()).unwrap();
        assert_eq!(env.raw_payload["alert_id"], "mon-118");
    }
}
