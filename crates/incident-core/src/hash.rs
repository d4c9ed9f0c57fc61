//! Alert content hashing for idempotent ingestion.
//!
//! The content hash is the sole defense against at-least-once webhook
//! redelivery: the alert store enforces uniqueness on it, so a retried
//! delivery lands on the existing row instead of double-counting.
//!
//! Sources with stable alert ids hash `(user_id, source_type,
//! source_alert_id)`. Sources that re-fire on every poll (log-search
//! triggers) additionally hash the title, service, and the receive time
//! bucketed to a coarse granularity, so distinct firings of the same
//! condition within one bucket collapse while later firings do not.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::types::SourceType;

/// Bucket width applied to `received_at` for sources without stable ids
pub const RECEIVE_BUCKET_SECS: i64 = 300;

/// Field separator inside the hash input
const SEP: [u8; 1] = [0u8];

/// Compute the content hash for one alert delivery.
pub fn content_hash(
    user_id: Uuid,
    source_type: SourceType,
    source_alert_id: &str,
    title: &str,
    service: &str,
    received_at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(SEP);
    hasher.update(source_type.as_str().as_bytes());
    hasher.update(SEP);
    hasher.update(source_alert_id.as_bytes());

    if !source_type.has_stable_ids() {
        hasher.update(SEP);
        hasher.update(title.as_bytes());
        hasher.update(SEP);
        hasher.update(service.as_bytes());
        hasher.update(SEP);
        let bucket = received_at.timestamp().div_euclid(RECEIVE_BUCKET_SECS);
        hasher.update(bucket.to_be_bytes());
    }

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_stable_source_ignores_receive_time() {
        let user = Uuid::new_v4();
        let a = content_hash(user, SourceType::Metrics, "mon-1", "cpu high", "api", at(0));
        let b = content_hash(
            user,
            SourceType::Metrics,
            "mon-1",
            "cpu high",
            "api",
            at(86_400),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_unstable_source_buckets_receive_time() {
        let user = Uuid::new_v4();
        let base = content_hash(user, SourceType::LogSearch, "q-1", "oom", "api", at(10));
        let same_bucket = content_hash(user, SourceType::LogSearch, "q-1", "oom", "api", at(200));
        let next_bucket = content_hash(user, SourceType::LogSearch, "q-1", "oom", "api", at(400));
        assert_eq!(base, same_bucket);
        assert_ne!(base, next_bucket);
    }

    #[test]
    fn test_users_never_collide() {
        let a = content_hash(
            Uuid::new_v4(),
            SourceType::Metrics,
            "mon-1",
            "cpu high",
            "api",
            at(0),
        );
        let b = content_hash(
            Uuid::new_v4(),
            SourceType::Metrics,
            "mon-1",
            "cpu high",
            "api",
            at(0),
        );
        assert_ne!(a, b);
    }
}
