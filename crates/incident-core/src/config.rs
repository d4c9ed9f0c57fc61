//! Service configuration.
//!
//! Defaults match the observed production values; every field can be
//! overridden through `INCIDENT_*` environment variables.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default correlation window (30 minutes)
pub const DEFAULT_CORRELATION_WINDOW_SECS: u64 = 1800;

/// Default analysis-trigger rate window (5 minutes)
pub const DEFAULT_ANALYSIS_WINDOW_SECS: u64 = 300;

/// Default bounded timeout applied to every store call
pub const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 2000;

/// Default bounded retry attempts for transient failures
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Default base backoff between retry attempts
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API bind address
    pub bind_addr: String,
    /// Correlation window for the temporal-service strategy (seconds)
    pub correlation_window_secs: u64,
    /// Per-user analysis-trigger rate window (seconds)
    pub analysis_window_secs: u64,
    /// Bounded timeout for store operations (milliseconds)
    pub storage_timeout_ms: u64,
    /// Bounded attempts for transient failures
    pub retry_max_attempts: u32,
    /// Base backoff between attempts (milliseconds)
    pub retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8086".to_string(),
            correlation_window_secs: DEFAULT_CORRELATION_WINDOW_SECS,
            analysis_window_secs: DEFAULT_ANALYSIS_WINDOW_SECS,
            storage_timeout_ms: DEFAULT_STORAGE_TIMEOUT_MS,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl Config {
    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("INCIDENT_BIND_ADDR").unwrap_or(defaults.bind_addr),
            correlation_window_secs: env_u64(
                "INCIDENT_CORRELATION_WINDOW_SECS",
                defaults.correlation_window_secs,
            ),
            analysis_window_secs: env_u64(
                "INCIDENT_ANALYSIS_WINDOW_SECS",
                defaults.analysis_window_secs,
            ),
            storage_timeout_ms: env_u64("INCIDENT_STORAGE_TIMEOUT_MS", defaults.storage_timeout_ms),
            retry_max_attempts: env_u64("INCIDENT_RETRY_MAX_ATTEMPTS", u64::from(defaults.retry_max_attempts))
                as u32,
            retry_backoff_ms: env_u64("INCIDENT_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
        }
    }

    /// Validate invariants before wiring components
    pub fn validate(&self) -> Result<()> {
        if self.correlation_window_secs == 0 {
            return Err(Error::config("correlation_window_secs must be greater than 0"));
        }
        if self.analysis_window_secs == 0 {
            return Err(Error::config("analysis_window_secs must be greater than 0"));
        }
        if self.storage_timeout_ms == 0 {
            return Err(Error::config("storage_timeout_ms must be greater than 0"));
        }
        if self.retry_max_attempts == 0 {
            return Err(Error::config("retry_max_attempts must be at least 1"));
        }
        Ok(())
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
