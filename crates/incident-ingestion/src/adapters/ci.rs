//! CI pipeline adapter.
//!
//! Maps build/deploy failure webhooks onto the normalized envelope. The
//! deploy trace id, when present, is what lets the correlator tie a
//! failed rollout to the metrics alerts it causes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use llm_incident_core::events::{meta, AlertEnvelope};
use llm_incident_core::types::{Severity, SourceType};
use llm_incident_core::{Error, Result};

use super::SourceAdapter;

/// Webhook payload of a finished CI run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiBuildPayload {
    /// Build identifier, stable per run
    pub build_id: String,
    /// Pipeline name
    pub pipeline: String,
    /// Repository the run belongs to
    pub repository: String,
    /// Branch under build
    #[serde(default)]
    pub branch: String,
    /// Run conclusion (failure, infra_failure, timed_out, canceled, success)
    pub conclusion: String,
    /// Head commit of the run
    #[serde(default)]
    pub commit_sha: Option<String>,
    /// Deploy trace id propagated through the rollout
    #[serde(default)]
    pub trace_id: Option<String>,
    /// When the run finished
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Adapter for CI build failures
#[derive(Debug, Clone, Default)]
pub struct CiAdapter;

impl CiAdapter {
    /// Create the adapter
    pub fn new() -> Self {
        Self
    }

    fn normalize_conclusion(conclusion: &str) -> Severity {
        match conclusion {
            "infra_failure" => Severity::Critical,
            "failure" => Severity::High,
            "timed_out" => Severity::Medium,
            "canceled" | "cancelled" => Severity::Low,
            _ => Severity::Unknown,
        }
    }
}

impl SourceAdapter for CiAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Ci
    }

    fn normalize(&self, user_id: Uuid, payload: serde_json::Value) -> Result<AlertEnvelope> {
        let build: CiBuildPayload = serde_json::from_value(payload.clone())
            .map_err(|e| Error::malformed(format!("ci payload: {e}")))?;

        if build.conclusion == "success" {
            return Err(Error::malformed("ci run concluded successfully, not an alert"));
        }

        let title = if build.branch.is_empty() {
            format!("{} {}", build.pipeline, build.conclusion)
        } else {
            format!("{} {} on {}", build.pipeline, build.conclusion, build.branch)
        };

        let mut metadata = HashMap::from([
            ("pipeline".to_string(), build.pipeline.clone()),
            ("conclusion".to_string(), build.conclusion.clone()),
        ]);
        if !build.branch.is_empty() {
            metadata.insert("branch".to_string(), build.branch.clone());
        }
        if let Some(commit_sha) = &build.commit_sha {
            metadata.insert("commit_sha".to_string(), commit_sha.clone());
        }
        if let Some(trace_id) = &build.trace_id {
            metadata.insert(meta::TRACE_ID.to_string(), trace_id.clone());
        }

        Ok(AlertEnvelope::new(
            SourceType::Ci,
            build.build_id,
            user_id,
            title,
            build.repository,
            Self::normalize_conclusion(&build.conclusion),
            metadata,
            build.completed_at.unwrap_or_else(Utc::now),
            payload,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(conclusion: &str) -> serde_json::Value {
        serde_json::json!({
            "build_id": "run-5541",
            "pipeline": "deploy-prod",
            "repository": "shop/checkout",
            "branch": "main",
            "conclusion": conclusion,
            "commit_sha": "9ae41c7",
            "trace_id": "deploy-5541",
            "completed_at": "2026-08-01T12:00:00Z",
        })
    }

    #[test]
    fn test_normalizes_failed_run() {
        let adapter = CiAdapter::new();
        let env = adapter.normalize(Uuid::new_v4(), payload("failure")).unwrap();

        assert_eq!(env.source_type, SourceType::Ci);
        assert_eq!(env.source_alert_id, "run-5541");
        assert_eq!(env.title, "deploy-prod failure on main");
        assert_eq!(env.service, "shop/checkout");
        assert_eq!(env.severity, Severity::High);
        assert_eq!(env.trace_id(), Some("deploy-5541"));
        assert_eq!(
            env.metadata.get("commit_sha").map(String::as_str),
            Some("9ae41c7")
        );
    }

    #[test]
    fn test_conclusion_table() {
        assert_eq!(
            CiAdapter::normalize_conclusion("infra_failure"),
            Severity::Critical
        );
        assert_eq!(CiAdapter::normalize_conclusion("timed_out"), Severity::Medium);
        assert_eq!(CiAdapter::normalize_conclusion("canceled"), Severity::Low);
        assert_eq!(CiAdapter::normalize_conclusion("mystery"), Severity::Unknown);
    }

    #[test]
    fn test_successful_run_is_rejected() {
        let adapter = CiAdapter::new();
        let result = adapter.normalize(Uuid::new_v4(), payload("success"));
        assert!(matches!(result, Err(Error::MalformedEnvelope(_))));
    }
}
