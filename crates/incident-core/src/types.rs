//! Core enumerations shared across the incident pipeline.

use serde::{Deserialize, Serialize};

/// Originating platform class of an inbound alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Metrics monitor alerts (threshold and anomaly monitors)
    Metrics,
    /// CI build and deploy failures
    Ci,
    /// Log-search triggers that fire on every matching poll
    LogSearch,
    /// Source registered without a dedicated adapter
    Custom,
}

impl SourceType {
    /// Whether the source issues a stable per-condition alert id.
    ///
    /// Log-search triggers re-fire with a fresh id on every poll, so their
    /// envelopes are deduplicated on content and a coarse receive-time
    /// bucket instead.
    pub fn has_stable_ids(&self) -> bool {
        matches!(self, Self::Metrics | Self::Ci)
    }

    /// Stable string form used in hashes, routes, and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Ci => "ci",
            Self::LogSearch => "log_search",
            Self::Custom => "custom",
        }
    }

    /// Parse the route/string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "metrics" => Some(Self::Metrics),
            "ci" => Some(Self::Ci),
            "log_search" | "log-search" => Some(Self::LogSearch),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized alert severity, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Source did not provide a mappable severity
    #[default]
    Unknown,
    /// Informational / low urgency
    Low,
    /// Degradation worth looking at
    Medium,
    /// Significant user-facing impact
    High,
    /// Outage-level impact
    Critical,
}

impl Severity {
    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident lifecycle state.
///
/// `investigating` is the initial state. The external analysis pipeline
/// moves an incident to `analyzed`; a human or automation outside the core
/// moves it to `resolved` or `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// Newly opened, analysis may still be triggered
    Investigating,
    /// Root-cause analysis has summarized the incident
    Analyzed,
    /// Closed as handled
    Resolved,
    /// Closed as noise or duplicate
    Cancelled,
}

impl IncidentStatus {
    /// Open incidents are correlation candidates
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Investigating | Self::Analyzed)
    }

    /// Terminal statuses accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }

    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Investigating => "investigating",
            Self::Analyzed => "analyzed",
            Self::Resolved => "resolved",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an alert was attributed to its incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrelationStrategy {
    /// The alert that opened the incident
    Primary,
    /// Same service within the correlation window
    TemporalServiceMatch,
    /// Source-provided grouping key matched an attributed alert
    FingerprintMatch,
    /// Shared trace id with an attributed alert
    TraceMatch,
}

impl CorrelationStrategy {
    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::TemporalServiceMatch => "temporal-service-match",
            Self::FingerprintMatch => "fingerprint-match",
            Self::TraceMatch => "trace-match",
        }
    }
}

impl std::fmt::Display for CorrelationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
