//! # Incident Engine
//!
//! The decision core of LLM-Incident-Manager:
//! - [`correlator::Correlator`] decides "same incident or new incident"
//! - [`rate_limit::TriggerRateLimiter`] gates downstream analysis per user
//! - [`pipeline::IngestPipeline`] wires store-once, correlate, and
//!   upsert-or-attach into the per-alert unit of work
//! - [`collaborators`] defines the seams to the external notification,
//!   analysis, and summary services
//!
//! The engine holds no locks of its own; every shared mutation goes
//! through an atomic store operation.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod collaborators;
pub mod correlator;
pub mod pipeline;
pub mod rate_limit;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::collaborators::{
        AnalysisRequest, AnalysisTrigger, EventPublisher, LogPublisher, NoopAnalysisTrigger,
        NoopPublisher, NoopSummaryGenerator, SummaryGenerator,
    };
    pub use crate::correlator::{Correlator, CorrelatorConfig};
    pub use crate::pipeline::{IngestOutcome, IngestPipeline, PipelineConfig, PipelineStats};
    pub use crate::rate_limit::{RateLimiterConfig, TriggerRateLimiter};
}
