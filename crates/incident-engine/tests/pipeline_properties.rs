//! End-to-end properties of the ingestion pipeline:
//! idempotent redelivery, race convergence on the natural key, window
//! correlation, strategy priority, analysis rate limiting, the
//! `started_at` freeze after analysis, and fail-open correlation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use llm_incident_core::events::{
    meta, AlertEnvelope, Attribution, Incident, IncidentAlert, IncidentEvent,
};
use llm_incident_core::types::{CorrelationStrategy, IncidentStatus, Severity, SourceType};
use llm_incident_core::{Error, Result};
use llm_incident_engine::prelude::*;
use llm_incident_storage::cache::MemoryCounterStore;
use llm_incident_storage::memory::MemoryStore;
use llm_incident_storage::{AlertStore, IncidentStore};

/// Publisher that records every event it sees
#[derive(Debug, Default)]
struct RecordingPublisher {
    events: Mutex<Vec<IncidentEvent>>,
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &IncidentEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Analysis trigger that counts admissions
#[derive(Debug, Default)]
struct CountingAnalysisTrigger {
    started: AtomicU64,
}

#[async_trait]
impl AnalysisTrigger for CountingAnalysisTrigger {
    async fn start_analysis(&self, request: &AnalysisRequest) -> Result<String> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(format!("task-{}", request.incident_id))
    }
}

/// Incident store whose correlation reads fail while writes pass through
#[derive(Debug)]
struct ReadBrokenStore {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl IncidentStore for ReadBrokenStore {
    async fn upsert_primary(&self, envelope: &AlertEnvelope) -> Result<Incident> {
        self.inner.upsert_primary(envelope).await
    }
    async fn attach_alert(
        &self,
        incident_id: Uuid,
        attribution: Attribution,
    ) -> Result<IncidentAlert> {
        self.inner.attach_alert(incident_id, attribution).await
    }
    async fn attach_primary(
        &self,
        incident_id: Uuid,
        attribution: Attribution,
    ) -> Result<Option<IncidentAlert>> {
        self.inner.attach_primary(incident_id, attribution).await
    }
    async fn get(&self, incident_id: Uuid) -> Result<Option<Incident>> {
        self.inner.get(incident_id).await
    }
    async fn open_incidents(&self, _user_id: Uuid) -> Result<Vec<Incident>> {
        Err(Error::storage("correlation read unavailable"))
    }
    async fn list_incidents(&self, user_id: Uuid) -> Result<Vec<Incident>> {
        self.inner.list_incidents(user_id).await
    }
    async fn alerts_for_incident(&self, incident_id: Uuid) -> Result<Vec<IncidentAlert>> {
        self.inner.alerts_for_incident(incident_id).await
    }
    async fn set_status(&self, incident_id: Uuid, status: IncidentStatus) -> Result<Incident> {
        self.inner.set_status(incident_id, status).await
    }
    async fn set_analysis_ref(&self, incident_id: Uuid, task_ref: &str) -> Result<()> {
        self.inner.set_analysis_ref(incident_id, task_ref).await
    }
}

struct Harness {
    pipeline: Arc<IngestPipeline>,
    store: Arc<MemoryStore>,
    publisher: Arc<RecordingPublisher>,
    analysis: Arc<CountingAnalysisTrigger>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    build_harness(Arc::clone(&store) as Arc<dyn IncidentStore>, store)
}

fn harness_with_broken_reads() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let broken = Arc::new(ReadBrokenStore {
        inner: Arc::clone(&store),
    });
    build_harness(broken, store)
}

fn build_harness(incidents: Arc<dyn IncidentStore>, store: Arc<MemoryStore>) -> Harness {
    let publisher = Arc::new(RecordingPublisher::default());
    let analysis = Arc::new(CountingAnalysisTrigger::default());
    let correlator =
        Correlator::new(CorrelatorConfig::default(), Arc::clone(&incidents)).unwrap();
    let limiter = TriggerRateLimiter::new(
        RateLimiterConfig { window_secs: 300 },
        Arc::new(MemoryCounterStore::with_defaults()),
    )
    .unwrap();
    let pipeline = IngestPipeline::new(
        PipelineConfig::default(),
        Arc::clone(&store) as Arc<dyn AlertStore>,
        incidents,
        correlator,
        limiter,
        Arc::clone(&publisher) as Arc<dyn EventPublisher>,
        Arc::clone(&analysis) as Arc<dyn AnalysisTrigger>,
        Arc::new(NoopSummaryGenerator),
    );
    Harness {
        pipeline: Arc::new(pipeline),
        store,
        publisher,
        analysis,
    }
}

fn envelope(
    user: Uuid,
    source: SourceType,
    alert_id: &str,
    title: &str,
    service: &str,
    metadata: HashMap<String, String>,
) -> AlertEnvelope {
    AlertEnvelope::new(
        source,
        alert_id,
        user,
        title,
        service,
        Severity::High,
        metadata,
        Utc::now(),
        serde_json::json!({"raw": title}),
    )
}

#[tokio::test]
async fn idempotent_redelivery_counts_once() {
    let h = harness();
    let user = Uuid::new_v4();
    let env = envelope(
        user,
        SourceType::Metrics,
        "mon-1",
        "cpu high",
        "api",
        HashMap::new(),
    );

    let first = h.pipeline.process_with_retry(&env).await.unwrap();
    let second = h.pipeline.process_with_retry(&env).await.unwrap();

    let incident_id = match first {
        IngestOutcome::Opened { incident_id, .. } => incident_id,
        other => panic!("expected Opened, got {other:?}"),
    };
    assert!(matches!(second, IngestOutcome::Duplicate { .. }));

    let incident = h.store.get(incident_id).await.unwrap().unwrap();
    assert_eq!(incident.correlated_alert_count, 1);
    assert_eq!(h.store.alerts_for_incident(incident_id).await.unwrap().len(), 1);
    assert_eq!(h.store.list_incidents(user).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_units_converge_on_one_incident() {
    let h = harness();
    let user = Uuid::new_v4();
    let n = 12;

    let mut handles = Vec::new();
    for i in 0..n {
        let pipeline = Arc::clone(&h.pipeline);
        handles.push(tokio::spawn(async move {
            // Same natural key, distinct content hashes
            let env = envelope(
                user,
                SourceType::LogSearch,
                "q-1",
                &format!("oom hit {i}"),
                "worker-pool",
                HashMap::new(),
            );
            pipeline.process_with_retry(&env).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let incidents = h.store.list_incidents(user).await.unwrap();
    assert_eq!(incidents.len(), 1, "all units must collapse to one incident");
    let incident = &incidents[0];
    assert_eq!(incident.correlated_alert_count, n as u64);

    let rows = h.store.alerts_for_incident(incident.id).await.unwrap();
    let primaries = rows
        .iter()
        .filter(|r| r.strategy == CorrelationStrategy::Primary)
        .count();
    assert_eq!(primaries, 1);
}

#[tokio::test]
async fn window_correlation_scores_and_expires() {
    let h = harness();
    let user = Uuid::new_v4();
    let opener = envelope(
        user,
        SourceType::Metrics,
        "mon-1",
        "error rate high",
        "checkout",
        HashMap::new(),
    );
    h.pipeline.process_with_retry(&opener).await.unwrap();

    // Ten minutes into the thirty-minute window
    let mut in_window = envelope(
        user,
        SourceType::Metrics,
        "mon-2",
        "latency high",
        "checkout",
        HashMap::new(),
    );
    in_window.received_at = Utc::now() + ChronoDuration::minutes(10);
    let outcome = h.pipeline.process_with_retry(&in_window).await.unwrap();
    match outcome {
        IngestOutcome::Correlated {
            strategy, score, ..
        } => {
            assert_eq!(strategy, CorrelationStrategy::TemporalServiceMatch);
            assert!((score - 2.0 / 3.0).abs() < 0.01, "score was {score}");
        }
        other => panic!("expected Correlated, got {other:?}"),
    }

    // One minute past the window: opens its own incident
    let mut late = envelope(
        user,
        SourceType::Metrics,
        "mon-3",
        "latency high again",
        "checkout",
        HashMap::new(),
    );
    late.received_at = Utc::now() + ChronoDuration::minutes(31);
    let outcome = h.pipeline.process_with_retry(&late).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Opened { .. }));
}

#[tokio::test]
async fn fingerprint_overrides_temporal_and_services_union() {
    let h = harness();
    let user = Uuid::new_v4();
    let fp = HashMap::from([(meta::FINGERPRINT.to_string(), "grp-7".to_string())]);

    let first = envelope(
        user,
        SourceType::Metrics,
        "mon-1",
        "db connections saturated",
        "postgres",
        fp.clone(),
    );
    let opened = h.pipeline.process_with_retry(&first).await.unwrap();
    let incident_id = match opened {
        IngestOutcome::Opened { incident_id, .. } => incident_id,
        other => panic!("expected Opened, got {other:?}"),
    };

    // Different service entirely; the fingerprint still wins
    let second = envelope(
        user,
        SourceType::Metrics,
        "mon-2",
        "api errors",
        "checkout",
        fp,
    );
    let outcome = h.pipeline.process_with_retry(&second).await.unwrap();
    match outcome {
        IngestOutcome::Correlated {
            incident_id: target,
            strategy,
            score,
            ..
        } => {
            assert_eq!(target, incident_id);
            assert_eq!(strategy, CorrelationStrategy::FingerprintMatch);
            assert!((score - 1.0).abs() < f64::EPSILON);
        }
        other => panic!("expected Correlated, got {other:?}"),
    }

    let incident = h.store.get(incident_id).await.unwrap().unwrap();
    let mut services = incident.affected_services.clone();
    services.sort();
    assert_eq!(services, vec!["checkout".to_string(), "postgres".to_string()]);
}

#[tokio::test]
async fn trace_links_ci_and_metrics_sources() {
    let h = harness();
    let user = Uuid::new_v4();
    let trace = HashMap::from([(meta::TRACE_ID.to_string(), "deploy-554".to_string())]);

    let deploy = envelope(
        user,
        SourceType::Ci,
        "build-554",
        "deploy pipeline failed",
        "deployer",
        trace.clone(),
    );
    let opened = h.pipeline.process_with_retry(&deploy).await.unwrap();
    let incident_id = match opened {
        IngestOutcome::Opened { incident_id, .. } => incident_id,
        other => panic!("expected Opened, got {other:?}"),
    };

    let metric = envelope(
        user,
        SourceType::Metrics,
        "mon-9",
        "5xx spike",
        "checkout",
        trace,
    );
    let outcome = h.pipeline.process_with_retry(&metric).await.unwrap();
    match outcome {
        IngestOutcome::Correlated {
            incident_id: target,
            strategy,
            ..
        } => {
            assert_eq!(target, incident_id);
            assert_eq!(strategy, CorrelationStrategy::TraceMatch);
        }
        other => panic!("expected Correlated, got {other:?}"),
    }
}

#[tokio::test]
async fn alert_storm_admits_one_analysis() {
    let h = harness();
    let user = Uuid::new_v4();

    for i in 0..10 {
        let env = envelope(
            user,
            SourceType::Metrics,
            &format!("mon-{i}"),
            "cascading failure",
            "gateway",
            HashMap::new(),
        );
        h.pipeline.process_with_retry(&env).await.unwrap();
    }

    assert_eq!(h.analysis.started.load(Ordering::SeqCst), 1);
    let stats = h.pipeline.stats().await;
    assert_eq!(stats.processed, 10);
    assert_eq!(stats.analyses_triggered, 1);
    // One opened, nine correlated into it
    assert_eq!(stats.opened, 1);
    assert_eq!(stats.correlated, 9);
}

#[tokio::test]
async fn started_at_survives_collision_after_analysis() {
    let h = harness();
    let user = Uuid::new_v4();

    let founding = envelope(
        user,
        SourceType::LogSearch,
        "q-3",
        "payment timeouts",
        "payments",
        HashMap::new(),
    );
    let opened = h.pipeline.process_with_retry(&founding).await.unwrap();
    let incident_id = match opened {
        IngestOutcome::Opened { incident_id, .. } => incident_id,
        other => panic!("expected Opened, got {other:?}"),
    };
    h.store
        .set_status(incident_id, IncidentStatus::Analyzed)
        .await
        .unwrap();
    let analyzed = h.store.get(incident_id).await.unwrap().unwrap();

    // Redelivery of the founding condition: same natural key, different
    // content and service, so it reaches the upsert rather than
    // correlating temporally
    let mut redelivered = envelope(
        user,
        SourceType::LogSearch,
        "q-3",
        "payment timeouts rebroadcast",
        "payments-eu",
        HashMap::from([("region".to_string(), "eu-1".to_string())]),
    );
    redelivered.received_at = Utc::now() + ChronoDuration::hours(2);
    let outcome = h.pipeline.process_with_retry(&redelivered).await.unwrap();
    match outcome {
        IngestOutcome::Opened {
            incident_id: target,
            ..
        } => assert_eq!(target, incident_id),
        other => panic!("expected Opened via upsert collision, got {other:?}"),
    }

    let after = h.store.get(incident_id).await.unwrap().unwrap();
    assert_eq!(after.started_at, analyzed.started_at);
    assert!(after.updated_at >= analyzed.updated_at);
    assert_eq!(after.metadata.get("region").map(String::as_str), Some("eu-1"));
}

#[tokio::test]
async fn correlation_read_failure_fails_open() {
    let h = harness_with_broken_reads();
    let user = Uuid::new_v4();
    let env = envelope(
        user,
        SourceType::Metrics,
        "mon-1",
        "cpu high",
        "api",
        HashMap::new(),
    );

    let outcome = h.pipeline.process_with_retry(&env).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Opened { .. }));

    // The alert landed and an incident exists despite the broken reads
    assert!(h.store.get_by_hash(&env.content_hash).await.unwrap().is_some());
    assert_eq!(h.store.list_incidents(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_envelope_is_dropped_not_stored() {
    let h = harness();
    let mut env = envelope(
        Uuid::new_v4(),
        SourceType::Metrics,
        "mon-1",
        "cpu high",
        "api",
        HashMap::new(),
    );
    env.title.clear();

    let result = h.pipeline.process_with_retry(&env).await;
    assert!(matches!(result, Err(Error::MalformedEnvelope(_))));
    assert!(h.store.get_by_hash(&env.content_hash).await.unwrap().is_none());
    assert_eq!(h.pipeline.stats().await.malformed, 1);
}

#[tokio::test]
async fn events_flow_for_open_and_correlate() {
    let h = harness();
    let user = Uuid::new_v4();

    let first = envelope(
        user,
        SourceType::Metrics,
        "mon-1",
        "cpu high",
        "api",
        HashMap::new(),
    );
    h.pipeline.process_with_retry(&first).await.unwrap();

    let mut second = envelope(
        user,
        SourceType::Metrics,
        "mon-2",
        "mem high",
        "api",
        HashMap::new(),
    );
    second.received_at = Utc::now() + ChronoDuration::minutes(1);
    h.pipeline.process_with_retry(&second).await.unwrap();

    let events = h.publisher.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].strategy.is_none());
    assert_eq!(
        events[1].strategy,
        Some(CorrelationStrategy::TemporalServiceMatch)
    );
    assert!(events[1].score.is_some());
}
