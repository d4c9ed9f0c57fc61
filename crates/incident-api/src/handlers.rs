//! API request handlers.
//!
//! This module exposes HTTP handlers for:
//! - Alert ingestion (per-source adapters + pipeline)
//! - Incident queries and status transitions
//! - Health probes

pub mod alerts;
pub mod health;
pub mod incidents;

pub use alerts::*;
pub use health::*;
pub use incidents::*;
