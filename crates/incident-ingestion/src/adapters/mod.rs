//! Source adapter trait and registry.

pub mod ci;
pub mod log_search;
pub mod metrics;

pub use ci::CiAdapter;
pub use log_search::LogSearchAdapter;
pub use metrics::MetricsAdapter;

use uuid::Uuid;

use llm_incident_core::events::AlertEnvelope;
use llm_incident_core::types::SourceType;
use llm_incident_core::Result;

/// Common trait for source adapters.
///
/// Pure payload mapping: no I/O, no state. A payload the adapter cannot
/// interpret becomes a malformed-envelope error, which the pipeline logs
/// and drops without retry.
pub trait SourceAdapter: Send + Sync {
    /// Source this adapter feeds
    fn source_type(&self) -> SourceType;

    /// Map a raw source payload into a normalized envelope
    fn normalize(&self, user_id: Uuid, payload: serde_json::Value) -> Result<AlertEnvelope>;
}

/// Adapter for a source type, if one is registered
pub fn adapter_for(source: SourceType) -> Option<Box<dyn SourceAdapter>> {
    match source {
        SourceType::Metrics => Some(Box::new(MetricsAdapter::new())),
        SourceType::Ci => Some(Box::new(CiAdapter::new())),
        SourceType::LogSearch => Some(Box::new(LogSearchAdapter::new())),
        SourceType::Custom => None,
    }
}
