//! Per-user rate limiting for analysis triggering.
//!
//! Caps how often the expensive downstream root-cause-analysis pipeline
//! may be started per user, protecting it from alert storms. Storing the
//! alert and updating the incident are never gated here.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use llm_incident_core::{Error, Result};
use llm_incident_storage::CounterStore;

/// Default admission window (5 minutes)
pub const DEFAULT_WINDOW_SECS: u64 = 300;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Fixed admission window per user (seconds)
    pub window_secs: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

/// Admits at most one analysis trigger per user per window.
///
/// Backed by an injected counter store whose `incr` is atomic, so two
/// alerts for one user arriving near-simultaneously cannot both admit:
/// exactly one caller observes the counter at 1.
pub struct TriggerRateLimiter {
    config: RateLimiterConfig,
    counters: Arc<dyn CounterStore>,
}

impl std::fmt::Debug for TriggerRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerRateLimiter")
            .field("config", &self.config)
            .field("counters", &"<CounterStore>")
            .finish()
    }
}

impl TriggerRateLimiter {
    /// Create a limiter over the given counter store
    pub fn new(config: RateLimiterConfig, counters: Arc<dyn CounterStore>) -> Result<Self> {
        if config.window_secs == 0 {
            return Err(Error::config("rate limiter window_secs must be greater than 0"));
        }
        Ok(Self { config, counters })
    }

    /// Whether a new analysis trigger is admitted for this user.
    ///
    /// Counter-store failures surface as errors; the caller decides
    /// whether to treat that as suppression (the pipeline does, keeping
    /// the downstream pipeline protected).
    pub async fn try_admit(&self, user_id: Uuid) -> Result<bool> {
        let key = format!("analysis-trigger:{user_id}");
        let window = Duration::from_secs(self.config.window_secs);
        let count = self.counters.incr(&key, window).await?;
        let admitted = count == 1;
        if !admitted {
            debug!(
                user_id = %user_id,
                window_count = count,
                "Analysis trigger suppressed by rate limit"
            );
        }
        Ok(admitted)
    }

    /// The configured window length
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_incident_storage::cache::MemoryCounterStore;

    fn limiter(window_secs: u64) -> TriggerRateLimiter {
        TriggerRateLimiter::new(
            RateLimiterConfig { window_secs },
            Arc::new(MemoryCounterStore::with_defaults()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_one_admission_per_window() {
        let limiter = limiter(300);
        let user = Uuid::new_v4();

        assert!(limiter.try_admit(user).await.unwrap());
        for _ in 0..9 {
            assert!(!limiter.try_admit(user).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let limiter = limiter(300);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(limiter.try_admit(a).await.unwrap());
        assert!(limiter.try_admit(b).await.unwrap());
        assert!(!limiter.try_admit(a).await.unwrap());
    }

    #[test]
    fn test_zero_window_rejected() {
        let result = TriggerRateLimiter::new(
            RateLimiterConfig { window_secs: 0 },
            Arc::new(MemoryCounterStore::with_defaults()),
        );
        assert!(result.is_err());
    }
}
