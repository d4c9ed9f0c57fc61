//! # Incident Core
//!
//! Core types for LLM-Incident-Manager.
//!
//! This crate provides:
//! - Normalized alert envelopes and incident records
//! - The correlation decision and attribution types
//! - Error taxonomy shared by every pipeline component
//! - Content hashing for idempotent alert ingestion
//! - Service configuration

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod config;
pub mod error;
pub mod events;
pub mod hash;
pub mod types;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::events::{
        AlertEnvelope, Attribution, CorrelationDecision, Incident, IncidentAlert, IncidentEvent,
        IncidentEventType, NaturalKey,
    };
    pub use crate::types::{CorrelationStrategy, IncidentStatus, Severity, SourceType};
}
