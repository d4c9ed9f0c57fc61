//! Alert correlation engine.
//!
//! Given a new envelope and the user's currently open incidents, decides
//! whether the alert attaches to an existing incident or opens a new one.
//!
//! # Strategies
//!
//! Evaluated in priority order, first match wins; ties inside a strategy
//! break on highest score, then most recently updated incident:
//! 1. **Fingerprint match** (score 1.0) — the envelope carries a
//!    source-provided grouping key equal to one recorded on an open
//!    incident or any of its attributed alerts.
//! 2. **Trace match** (score 0.9) — the envelope's trace id equals one
//!    already attributed to an open incident of the same user; this is how
//!    a CI deploy event and the metrics alert it caused land on one
//!    incident.
//! 3. **Temporal + service match** (score 0.8 → 0.4, linear) — same
//!    service, incident updated within the correlation window of the
//!    envelope's receive time.
//!
//! # Failure semantics
//!
//! Lookup failures fail open: the decision degrades to "new incident" so
//! the alert is never dropped. A false "new incident" is recoverable
//! through the store's natural-key upsert; a dropped alert is not.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use llm_incident_core::events::{meta, AlertEnvelope, CorrelationDecision, Incident, IncidentAlert};
use llm_incident_core::types::CorrelationStrategy;
use llm_incident_core::{Error, Result};
use llm_incident_storage::IncidentStore;

/// Default correlation window (30 minutes)
pub const DEFAULT_WINDOW_SECS: u64 = 1800;

/// Correlator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    /// Temporal-service correlation window (seconds)
    pub window_secs: u64,
    /// Temporal score at zero elapsed time
    pub temporal_max_score: f64,
    /// Temporal score at the window boundary
    pub temporal_min_score: f64,
    /// Score assigned to trace matches
    pub trace_score: f64,
    /// Score assigned to fingerprint matches
    pub fingerprint_score: f64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
            temporal_max_score: 0.8,
            temporal_min_score: 0.4,
            trace_score: 0.9,
            fingerprint_score: 1.0,
        }
    }
}

impl CorrelatorConfig {
    fn validate(&self) -> Result<()> {
        if self.window_secs == 0 {
            return Err(Error::config("window_secs must be greater than 0"));
        }
        for (name, score) in [
            ("temporal_max_score", self.temporal_max_score),
            ("temporal_min_score", self.temporal_min_score),
            ("trace_score", self.trace_score),
            ("fingerprint_score", self.fingerprint_score),
        ] {
            if !(0.0..=1.0).contains(&score) {
                return Err(Error::config(format!(
                    "{name} must be between 0.0 and 1.0, got {score}"
                )));
            }
        }
        if self.temporal_min_score > self.temporal_max_score {
            return Err(Error::config(
                "temporal_min_score must not exceed temporal_max_score",
            ));
        }
        Ok(())
    }
}

/// The correlation decision engine
pub struct Correlator {
    config: CorrelatorConfig,
    store: Arc<dyn IncidentStore>,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("config", &self.config)
            .field("store", &"<IncidentStore>")
            .finish()
    }
}

impl Correlator {
    /// Create a correlator over the given incident store
    pub fn new(config: CorrelatorConfig, store: Arc<dyn IncidentStore>) -> Result<Self> {
        config.validate()?;
        info!(
            window_secs = config.window_secs,
            trace_score = config.trace_score,
            "Correlator initialized"
        );
        Ok(Self { config, store })
    }

    /// Decide whether `envelope` attaches to one of the user's open
    /// incidents. Never errors: lookup failures fail open to
    /// "new incident".
    pub async fn correlate(&self, envelope: &AlertEnvelope) -> CorrelationDecision {
        let open = match self.store.open_incidents(envelope.user_id).await {
            Ok(open) => open,
            Err(e) => {
                warn!(
                    user_id = %envelope.user_id,
                    error = %e,
                    "Open-incident lookup failed, failing open to new incident"
                );
                return CorrelationDecision::uncorrelated();
            }
        };
        if open.is_empty() {
            return CorrelationDecision::uncorrelated();
        }

        // Fingerprint and trace both scan attribution rows; fetch them once
        let mut candidates = Vec::with_capacity(open.len());
        for incident in open {
            match self.store.alerts_for_incident(incident.id).await {
                Ok(rows) => candidates.push((incident, rows)),
                Err(e) => {
                    warn!(
                        incident_id = %incident.id,
                        error = %e,
                        "Attribution lookup failed, failing open to new incident"
                    );
                    return CorrelationDecision::uncorrelated();
                }
            }
        }

        if let Some(decision) = self.match_fingerprint(envelope, &candidates) {
            return decision;
        }
        if let Some(decision) = self.match_trace(envelope, &candidates) {
            return decision;
        }
        if let Some(decision) = self.match_temporal_service(envelope, &candidates) {
            return decision;
        }

        debug!(
            user_id = %envelope.user_id,
            candidates = candidates.len(),
            "No strategy matched, opening new incident"
        );
        CorrelationDecision::uncorrelated()
    }

    fn match_fingerprint(
        &self,
        envelope: &AlertEnvelope,
        candidates: &[(Incident, Vec<IncidentAlert>)],
    ) -> Option<CorrelationDecision> {
        let fingerprint = envelope.fingerprint()?;
        let (incident, _) = candidates
            .iter()
            .filter(|(incident, rows)| {
                incident.metadata.get(meta::FINGERPRINT).map(String::as_str) == Some(fingerprint)
                    || rows.iter().any(|r| {
                        r.metadata.get(meta::FINGERPRINT).map(String::as_str) == Some(fingerprint)
                    })
            })
            .max_by_key(|(incident, _)| incident.updated_at)?;

        let details = HashMap::from([(meta::FINGERPRINT.to_string(), fingerprint.to_string())]);
        Some(CorrelationDecision::correlated(
            incident.id,
            CorrelationStrategy::FingerprintMatch,
            self.config.fingerprint_score,
            details,
        ))
    }

    fn match_trace(
        &self,
        envelope: &AlertEnvelope,
        candidates: &[(Incident, Vec<IncidentAlert>)],
    ) -> Option<CorrelationDecision> {
        let trace_id = envelope.trace_id()?;
        let (incident, _) = candidates
            .iter()
            .filter(|(_, rows)| {
                rows.iter()
                    .any(|r| r.metadata.get(meta::TRACE_ID).map(String::as_str) == Some(trace_id))
            })
            .max_by_key(|(incident, _)| incident.updated_at)?;

        let details = HashMap::from([(meta::TRACE_ID.to_string(), trace_id.to_string())]);
        Some(CorrelationDecision::correlated(
            incident.id,
            CorrelationStrategy::TraceMatch,
            self.config.trace_score,
            details,
        ))
    }

    fn match_temporal_service(
        &self,
        envelope: &AlertEnvelope,
        candidates: &[(Incident, Vec<IncidentAlert>)],
    ) -> Option<CorrelationDecision> {
        if envelope.service.is_empty() {
            return None;
        }
        let window = self.config.window_secs as i64;
        let (incident, elapsed) = candidates
            .iter()
            .map(|(incident, _)| incident)
            .filter(|incident| incident.service == envelope.service)
            .filter_map(|incident| {
                let elapsed = (envelope.received_at - incident.updated_at).num_seconds();
                // Out-of-order arrival (incident touched after the alert
                // fired) counts as zero elapsed rather than a rejection.
                (elapsed.abs() <= window).then_some((incident, elapsed.max(0)))
            })
            .max_by_key(|(incident, _)| incident.updated_at)?;

        let decay = self.config.temporal_max_score - self.config.temporal_min_score;
        let score = self.config.temporal_max_score - decay * (elapsed as f64 / window as f64);
        let details = HashMap::from([
            ("service".to_string(), envelope.service.clone()),
            ("elapsed_secs".to_string(), elapsed.to_string()),
            ("window_secs".to_string(), window.to_string()),
        ]);
        Some(CorrelationDecision::correlated(
            incident.id,
            CorrelationStrategy::TemporalServiceMatch,
            score,
            details,
        ))
    }
}
