//! Log-search trigger adapter.
//!
//! Saved searches fire on every matching poll, so the same condition
//! re-fires with a fresh delivery each time. The source therefore has no
//! stable alert id; dedup falls to the envelope's content hash, which
//! buckets the receive time coarsely for this source.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use llm_incident_core::events::AlertEnvelope;
use llm_incident_core::types::{Severity, SourceType};
use llm_incident_core::{Error, Result};

use super::SourceAdapter;

/// Webhook payload of a log-search trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSearchPayload {
    /// Saved-search identifier
    pub query_id: String,
    /// Saved-search name
    pub name: String,
    /// Search expression
    #[serde(default)]
    pub query: String,
    /// Service the search is scoped to
    #[serde(default)]
    pub service: String,
    /// Matches in the evaluation window
    pub match_count: u64,
    /// Trigger threshold
    #[serde(default)]
    pub threshold: Option<u64>,
    /// Severity label configured on the search
    #[serde(default)]
    pub severity: Option<String>,
    /// End of the evaluation window
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Adapter for log-search triggers
#[derive(Debug, Clone, Default)]
pub struct LogSearchAdapter;

impl LogSearchAdapter {
    /// Create the adapter
    pub fn new() -> Self {
        Self
    }

    fn normalize_severity(label: Option<&str>) -> Severity {
        match label.map(str::to_lowercase).as_deref() {
            Some("critical") | Some("fatal") => Severity::Critical,
            Some("error") | Some("high") => Severity::High,
            Some("warning") | Some("warn") | Some("medium") => Severity::Medium,
            Some("info") | Some("low") => Severity::Low,
            // Searches without a configured label still woke someone up
            None => Severity::Medium,
            Some(_) => Severity::Unknown,
        }
    }
}

impl SourceAdapter for LogSearchAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::LogSearch
    }

    fn normalize(&self, user_id: Uuid, payload: serde_json::Value) -> Result<AlertEnvelope> {
        let trigger: LogSearchPayload = serde_json::from_value(payload.clone())
            .map_err(|e| Error::malformed(format!("log-search payload: {e}")))?;

        let title = format!("{}: {} matches", trigger.name, trigger.match_count);

        let mut metadata = HashMap::from([
            ("query".to_string(), trigger.query.clone()),
            ("match_count".to_string(), trigger.match_count.to_string()),
        ]);
        if let Some(threshold) = trigger.threshold {
            metadata.insert("threshold".to_string(), threshold.to_string());
        }

        Ok(AlertEnvelope::new(
            SourceType::LogSearch,
            trigger.query_id,
            user_id,
            title,
            trigger.service,
            Self::normalize_severity(trigger.severity.as_deref()),
            metadata,
            trigger.last_seen.unwrap_or_else(Utc::now),
            payload,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> serde_json::Value {
        serde_json::json!({
            "query_id": "q-77",
            "name": "payment worker OOM",
            "query": "kubernetes.pod=payments* \"OOMKilled\"",
            "service": "payments",
            "match_count": 14,
            "threshold": 5,
            "severity": "error",
            "last_seen": "2026-08-01T09:30:00Z",
        })
    }

    #[test]
    fn test_normalizes_trigger() {
        let adapter = LogSearchAdapter::new();
        let env = adapter.normalize(Uuid::new_v4(), payload()).unwrap();

        assert_eq!(env.source_type, SourceType::LogSearch);
        assert_eq!(env.source_alert_id, "q-77");
        assert_eq!(env.title, "payment worker OOM: 14 matches");
        assert_eq!(env.severity, Severity::High);
        assert_eq!(
            env.metadata.get("match_count").map(String::as_str),
            Some("14")
        );
    }

    #[test]
    fn test_refire_in_same_bucket_shares_hash() {
        let adapter = LogSearchAdapter::new();
        let user = Uuid::new_v4();
        let a = adapter.normalize(user, payload()).unwrap();
        let b = adapter.normalize(user, payload()).unwrap();
        // Same condition, same evaluation window: identical content hash
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_unlabeled_search_defaults_to_medium() {
        assert_eq!(LogSearchAdapter::normalize_severity(None), Severity::Medium);
        assert_eq!(
            LogSearchAdapter::normalize_severity(Some("fatal")),
            Severity::Critical
        );
        assert_eq!(
            LogSearchAdapter::normalize_severity(Some("whatever")),
            Severity::Unknown
        );
    }

    #[test]
    fn test_missing_match_count_is_malformed() {
        let adapter = LogSearchAdapter::new();
        let result = adapter.normalize(
            Uuid::new_v4(),
            serde_json::json!({"query_id": "q-1", "name": "x"}),
        );
        assert!(matches!(result, Err(Error::MalformedEnvelope(_))));
    }
}
