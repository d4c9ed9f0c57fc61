//! # Incident Ingestion
//!
//! Source adapter layer for LLM-Incident-Manager.
//!
//! Thin produces-into integrations mapping source-specific webhook
//! payloads onto the normalized [`AlertEnvelope`]:
//! - **metrics**: monitor/threshold alerts
//! - **ci**: build and deploy pipeline failures
//! - **log_search**: saved-search triggers that fire on every poll
//!
//! ## Design Principles
//!
//! 1. **Boundary only**: adapters normalize shape and severity; they hold
//!    no correlation or lifecycle logic
//! 2. **Adapter-owned severity tables**: each source maps its own
//!    vocabulary onto the normalized [`Severity`] scale
//! 3. **Opaque passthrough**: the original payload rides along in
//!    `raw_payload` for audit and is never parsed downstream
//!
//! Authentication and signature verification happen upstream of this
//! crate, at the webhook edge.
//!
//! [`AlertEnvelope`]: llm_incident_core::events::AlertEnvelope
//! [`Severity`]: llm_incident_core::types::Severity

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod adapters;

pub use adapters::{CiAdapter, LogSearchAdapter, MetricsAdapter, SourceAdapter};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::adapters::{
        adapter_for, CiAdapter, LogSearchAdapter, MetricsAdapter, SourceAdapter,
    };
}
