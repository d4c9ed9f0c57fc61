//! Per-alert ingestion pipeline.
//!
//! One invocation handles one envelope end to end:
//! validate → store-once → correlate → upsert-or-attach → notify →
//! summary → (rate-gated) analysis trigger.
//!
//! The pipeline is invoked by many independent workers, potentially in
//! parallel for the same user. It holds no locks; duplicate "new incident"
//! conclusions are resolved by the store's natural-key upsert, and
//! duplicate deliveries stop at the idempotent alert insert. Every store
//! call runs under a bounded timeout; transient failures are retried with
//! bounded attempts and backoff, stage by stage, so a retry never
//! re-enters the already-completed idempotent insert as a false duplicate.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use llm_incident_core::events::{
    AlertEnvelope, Attribution, CorrelationDecision, Incident, IncidentEvent, IncidentEventType,
};
use llm_incident_core::types::{CorrelationStrategy, IncidentStatus, SourceType};
use llm_incident_core::{Error, Result};
use llm_incident_storage::{AlertStore, IncidentStore, StoreOnce};

use crate::collaborators::{AnalysisRequest, AnalysisTrigger, EventPublisher, SummaryGenerator};
use crate::correlator::Correlator;
use crate::rate_limit::TriggerRateLimiter;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bounded timeout applied to every store call (milliseconds)
    pub storage_timeout_ms: u64,
    /// Bounded attempts for transient failures
    pub retry_max_attempts: u32,
    /// Base backoff between attempts, scaled linearly (milliseconds)
    pub retry_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_timeout_ms: 2000,
            retry_max_attempts: 3,
            retry_backoff_ms: 100,
        }
    }
}

/// What processing one envelope did
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Duplicate delivery; nothing changed
    Duplicate {
        /// Previously stored alert row
        alert_id: Uuid,
    },
    /// Alert attributed to an existing incident
    Correlated {
        /// Target incident
        incident_id: Uuid,
        /// Stored alert row
        alert_id: Uuid,
        /// Winning strategy
        strategy: CorrelationStrategy,
        /// Match confidence
        score: f64,
    },
    /// Alert opened (or collapsed into) an incident via the upsert
    Opened {
        /// The incident
        incident_id: Uuid,
        /// Stored alert row
        alert_id: Uuid,
    },
}

/// Pipeline counters for monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    /// Envelopes processed to an outcome
    pub processed: u64,
    /// Duplicate deliveries absorbed
    pub duplicates: u64,
    /// Alerts attributed to existing incidents
    pub correlated: u64,
    /// Incidents opened or upsert-collapsed
    pub opened: u64,
    /// Malformed envelopes dropped
    pub malformed: u64,
    /// Analysis triggers admitted
    pub analyses_triggered: u64,
}

/// The per-alert ingestion orchestrator
pub struct IngestPipeline {
    config: PipelineConfig,
    alerts: Arc<dyn AlertStore>,
    incidents: Arc<dyn IncidentStore>,
    correlator: Correlator,
    limiter: TriggerRateLimiter,
    publisher: Arc<dyn EventPublisher>,
    analysis: Arc<dyn AnalysisTrigger>,
    summarizer: Arc<dyn SummaryGenerator>,
    stats: RwLock<PipelineStats>,
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("config", &self.config)
            .field("correlator", &self.correlator)
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl IngestPipeline {
    /// Wire a pipeline from its parts
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        alerts: Arc<dyn AlertStore>,
        incidents: Arc<dyn IncidentStore>,
        correlator: Correlator,
        limiter: TriggerRateLimiter,
        publisher: Arc<dyn EventPublisher>,
        analysis: Arc<dyn AnalysisTrigger>,
        summarizer: Arc<dyn SummaryGenerator>,
    ) -> Self {
        Self {
            config,
            alerts,
            incidents,
            correlator,
            limiter,
            publisher,
            analysis,
            summarizer,
            stats: RwLock::new(PipelineStats::default()),
        }
    }

    /// Process one envelope without retry. Prefer
    /// [`process_with_retry`](Self::process_with_retry) at the service
    /// boundary.
    pub async fn process(&self, envelope: &AlertEnvelope) -> Result<IngestOutcome> {
        self.check_envelope(envelope).await?;
        let stored = self.timed(self.alerts.store_once(envelope)).await?;
        if !stored.stored {
            return self.absorb_duplicate(envelope, stored).await;
        }
        self.apply(envelope, stored.alert_id).await
    }

    /// Process one envelope, retrying transient failures stage by stage.
    #[instrument(skip(self, envelope), fields(
        source = %envelope.source_type,
        user_id = %envelope.user_id,
        alert = %envelope.source_alert_id,
    ))]
    pub async fn process_with_retry(&self, envelope: &AlertEnvelope) -> Result<IngestOutcome> {
        self.check_envelope(envelope).await?;

        // Stage 1: idempotent insert. Retried in isolation so a transient
        // failure after the row landed does not replay the decision stage.
        let mut attempt = 1;
        let stored: StoreOnce = loop {
            match self.timed(self.alerts.store_once(envelope)).await {
                Ok(stored) => break stored,
                Err(e) if e.is_transient() && attempt < self.config.retry_max_attempts => {
                    warn!(error = %e, attempt, "store_once failed, retrying");
                    tokio::time::sleep(self.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };
        if !stored.stored {
            return self.absorb_duplicate(envelope, stored).await;
        }

        // Stage 2: decide and apply. Safe to replay as a whole: the
        // correlate read is repeatable and the attach/upsert either
        // applied atomically or not at all.
        let mut attempt = 1;
        loop {
            match self.apply(envelope, stored.alert_id).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transient() && attempt < self.config.retry_max_attempts => {
                    warn!(error = %e, attempt, "apply failed, retrying");
                    tokio::time::sleep(self.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Snapshot of the pipeline counters
    pub async fn stats(&self) -> PipelineStats {
        *self.stats.read().await
    }

    async fn check_envelope(&self, envelope: &AlertEnvelope) -> Result<()> {
        if let Err(e) = envelope.validate() {
            // Retrying cannot fix a structurally invalid payload
            warn!(
                source = %envelope.source_type,
                error = %e,
                "Dropping malformed envelope"
            );
            self.stats.write().await.malformed += 1;
            return Err(e);
        }
        Ok(())
    }

    async fn absorb_duplicate(
        &self,
        envelope: &AlertEnvelope,
        stored: StoreOnce,
    ) -> Result<IngestOutcome> {
        debug!(
            content_hash = %envelope.content_hash,
            alert_id = %stored.alert_id,
            "Duplicate delivery absorbed"
        );
        let mut stats = self.stats.write().await;
        stats.processed += 1;
        stats.duplicates += 1;
        Ok(IngestOutcome::Duplicate {
            alert_id: stored.alert_id,
        })
    }

    async fn apply(&self, envelope: &AlertEnvelope, alert_id: Uuid) -> Result<IngestOutcome> {
        let decision = self.correlator.correlate(envelope).await;

        let (incident, outcome) = match decision {
            CorrelationDecision {
                is_correlated: true,
                incident_id: Some(incident_id),
                strategy: Some(strategy),
                score,
                details,
            } => {
                let attribution = Attribution::correlated(envelope, strategy, score, details);
                self.timed(self.incidents.attach_alert(incident_id, attribution))
                    .await?;
                let incident = self
                    .timed(self.incidents.get(incident_id))
                    .await?
                    .ok_or_else(|| {
                        Error::storage(format!("correlated incident {incident_id} vanished"))
                    })?;
                self.emit(
                    IncidentEventType::AlertCorrelated,
                    &incident,
                    envelope.source_type,
                    Some(strategy),
                    Some(score),
                )
                .await;
                let outcome = IngestOutcome::Correlated {
                    incident_id,
                    alert_id,
                    strategy,
                    score,
                };
                (incident, outcome)
            }
            _ => {
                let incident = self.timed(self.incidents.upsert_primary(envelope)).await?;
                self.timed(
                    self.incidents
                        .attach_primary(incident.id, Attribution::primary(envelope)),
                )
                .await?;
                self.emit(
                    IncidentEventType::IncidentUpdate,
                    &incident,
                    envelope.source_type,
                    None,
                    None,
                )
                .await;
                let outcome = IngestOutcome::Opened {
                    incident_id: incident.id,
                    alert_id,
                };
                (incident, outcome)
            }
        };

        // Summary regeneration is unconditional and never gates the unit
        if let Err(e) = self.summarizer.request_summary(incident.id).await {
            warn!(incident_id = %incident.id, error = %e, "Summary request failed");
        }

        let analysis_triggered = self.maybe_trigger_analysis(&incident).await;

        let mut stats = self.stats.write().await;
        stats.processed += 1;
        match &outcome {
            IngestOutcome::Correlated { .. } => stats.correlated += 1,
            IngestOutcome::Opened { .. } => stats.opened += 1,
            IngestOutcome::Duplicate { .. } => {}
        }
        if analysis_triggered {
            stats.analyses_triggered += 1;
        }
        drop(stats);

        info!(
            incident_id = %incident.id,
            user_id = %envelope.user_id,
            outcome = outcome_label(&outcome),
            analysis_triggered,
            "Alert processed"
        );
        Ok(outcome)
    }

    /// Start downstream analysis when the incident is still under
    /// investigation and the per-user window admits it. Never fails the
    /// unit: trigger errors are the external pipeline's to retry.
    async fn maybe_trigger_analysis(&self, incident: &Incident) -> bool {
        if incident.status != IncidentStatus::Investigating {
            return false;
        }
        match self.limiter.try_admit(incident.user_id).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                // Fail closed: an unavailable counter must not let an
                // alert storm through to the analysis pipeline
                warn!(
                    user_id = %incident.user_id,
                    error = %e,
                    "Rate limiter unavailable, suppressing analysis trigger"
                );
                return false;
            }
        }

        let request = AnalysisRequest {
            incident_id: incident.id,
            user_id: incident.user_id,
            title: incident.title.clone(),
            service: incident.service.clone(),
            severity: incident.severity,
            metadata: incident.metadata.clone(),
        };
        match self.analysis.start_analysis(&request).await {
            Ok(task_ref) => {
                if let Err(e) = self
                    .timed(self.incidents.set_analysis_ref(incident.id, &task_ref))
                    .await
                {
                    warn!(incident_id = %incident.id, error = %e, "Failed to record analysis ref");
                }
                info!(incident_id = %incident.id, task_ref = %task_ref, "Analysis triggered");
                true
            }
            Err(e) => {
                warn!(incident_id = %incident.id, error = %e, "Analysis trigger failed");
                false
            }
        }
    }

    async fn emit(
        &self,
        event_type: IncidentEventType,
        incident: &Incident,
        source: SourceType,
        strategy: Option<CorrelationStrategy>,
        score: Option<f64>,
    ) {
        let event = IncidentEvent {
            event_type,
            incident_id: incident.id,
            user_id: incident.user_id,
            source,
            strategy,
            score,
        };
        // A missed notification is eventually-consistent noise, not a
        // processing failure
        if let Err(e) = self.publisher.publish(&event).await {
            warn!(incident_id = %incident.id, error = %e, "Event publish failed");
        }
    }

    async fn timed<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        let timeout = Duration::from_millis(self.config.storage_timeout_ms);
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.config.retry_backoff_ms * u64::from(attempt))
    }
}

fn outcome_label(outcome: &IngestOutcome) -> &'static str {
    match outcome {
        IngestOutcome::Duplicate { .. } => "duplicate",
        IngestOutcome::Correlated { .. } => "correlated",
        IngestOutcome::Opened { .. } => "opened",
    }
}
