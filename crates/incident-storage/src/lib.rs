//! # Incident Storage
//!
//! Persistence seams for LLM-Incident-Manager.
//!
//! This crate provides:
//! - The [`AlertStore`], [`IncidentStore`], and [`CounterStore`] traits the
//!   pipeline is written against
//! - A sharded in-memory implementation ([`memory::MemoryStore`])
//! - A TTL cache with atomic counters backing the rate limiter
//!
//! All race safety the engine relies on lives behind these traits: the
//! conditional insert-or-update of `upsert_primary` and the single atomic
//! unit of `attach_alert` are contracts of the interface, not of any one
//! backend. Callers never compose atomicity out of read-then-write.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod cache;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use llm_incident_core::events::{AlertEnvelope, Attribution, Incident, IncidentAlert};
use llm_incident_core::types::IncidentStatus;
use llm_incident_core::Result;

/// Outcome of an idempotent alert insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOnce {
    /// False when the content hash was already present
    pub stored: bool,
    /// Id of the stored (or previously stored) alert row
    pub alert_id: Uuid,
}

/// A persisted alert row
#[derive(Debug, Clone)]
pub struct StoredAlert {
    /// Generated identifier
    pub id: Uuid,
    /// The envelope as delivered
    pub envelope: AlertEnvelope,
    /// Persistence time
    pub stored_at: DateTime<Utc>,
}

/// Durable, idempotent record of every delivered alert.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Persist an envelope exactly once, keyed by its content hash.
    ///
    /// A duplicate delivery reports `stored = false` with the existing
    /// row's id; it never errors and has no side effect beyond the insert.
    async fn store_once(&self, envelope: &AlertEnvelope) -> Result<StoreOnce>;

    /// Fetch a stored alert by content hash
    async fn get_by_hash(&self, content_hash: &str) -> Result<Option<StoredAlert>>;
}

/// Canonical incident records and their attribution rows.
///
/// `upsert_primary` and the attach operations are single atomic operations
/// of the backend; two workers racing the same natural key converge on one
/// row through the upsert's conflict handling, never through caller-side
/// locking.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Atomic insert-or-update keyed on the incident natural key.
    ///
    /// On conflict: `updated_at` and `metadata` refresh unconditionally;
    /// `started_at` refreshes only while `status != analyzed`.
    async fn upsert_primary(&self, envelope: &AlertEnvelope) -> Result<Incident>;

    /// Append an attribution row and, in the same atomic unit, increment
    /// `correlated_alert_count` and union the alert's service into
    /// `affected_services`.
    async fn attach_alert(&self, incident_id: Uuid, attribution: Attribution)
        -> Result<IncidentAlert>;

    /// Attach the founding alert with `strategy = primary`.
    ///
    /// Seeds `affected_services` only when the set is empty. When a primary
    /// row already exists (natural-key collision path) the counter and
    /// service-set updates still apply but no second `primary` row is
    /// written; `None` is returned in that case.
    async fn attach_primary(
        &self,
        incident_id: Uuid,
        attribution: Attribution,
    ) -> Result<Option<IncidentAlert>>;

    /// Fetch one incident
    async fn get(&self, incident_id: Uuid) -> Result<Option<Incident>>;

    /// Open incidents (`investigating` or `analyzed`) for a user, the
    /// correlator's candidate set. Reads latest committed state.
    async fn open_incidents(&self, user_id: Uuid) -> Result<Vec<Incident>>;

    /// All incidents for a user, most recently updated first
    async fn list_incidents(&self, user_id: Uuid) -> Result<Vec<Incident>>;

    /// Attribution rows for an incident, in attach order
    async fn alerts_for_incident(&self, incident_id: Uuid) -> Result<Vec<IncidentAlert>>;

    /// External-actor status transition; rejected once the incident is in
    /// a terminal status.
    async fn set_status(&self, incident_id: Uuid, status: IncidentStatus) -> Result<Incident>;

    /// Record the opaque handle of the external analysis job
    async fn set_analysis_ref(&self, incident_id: Uuid, task_ref: &str) -> Result<()>;
}

/// Fast shared counters with expiry, backing the trigger rate limiter.
///
/// State here is never durable; absence of an entry means "not yet
/// triggered this window".
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter at `key`, creating it with `ttl`
    /// when absent or expired. Returns the post-increment value.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64>;
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{CacheConfig, MemoryCounterStore, TtlCache};
    pub use crate::memory::MemoryStore;
    pub use crate::{AlertStore, CounterStore, IncidentStore, StoreOnce, StoredAlert};
}
