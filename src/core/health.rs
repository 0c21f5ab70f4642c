//! Poller health snapshot.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::limits::PollerLimits;
use crate::store::Store;

/// What the health endpoint and `wrapup health` report
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub tenant: String,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub watermark: i64,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
    pub lock_held: bool,
    pub lock_age_seconds: Option<i64>,
    pub pending_review: usize,

    /// No successful poll within the staleness window
    pub stale: bool,

    /// Stale and failing repeatedly
    pub alert: bool,
}

impl HealthReport {
    pub fn collect(store: &Store, tenant_id: &str, limits: &PollerLimits, now: DateTime<Utc>) -> Result<Self> {
        let cursor = store.ensure_cursor(tenant_id)?;
        let pending_review = store.count_pending_drafts(tenant_id)?;

        let stale = match cursor.last_poll_at {
            Some(at) => now - at > limits.health_stale(),
            None => true,
        };
        let alert = stale && cursor.consecutive_errors >= limits.alert_error_threshold;
        let lock_age = cursor.lock_age(now);

        Ok(Self {
            tenant: tenant_id.to_string(),
            last_poll_at: cursor.last_poll_at,
            watermark: cursor.last_recording_id,
            consecutive_errors: cursor.consecutive_errors,
            last_error: cursor.last_error.clone(),
            lock_held: cursor.is_locked_within(now, limits.lock_stale()),
            lock_age_seconds: lock_age.map(|age| age.num_seconds()),
            pending_review,
            stale,
            alert,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_alert_needs_staleness_and_errors() {
        let store = Store::in_memory().unwrap();
        let limits = PollerLimits::default();
        let now = Utc::now();

        store.ensure_cursor("t1").unwrap();
        store.record_poll_success("t1", now - Duration::minutes(2)).unwrap();
        for _ in 0..3 {
            store.record_poll_failure("t1", "timeout").unwrap();
        }
        let report = HealthReport::collect(&store, "t1", &limits, now).unwrap();
        assert!(!report.stale);
        assert!(!report.alert);
        assert_eq!(report.consecutive_errors, 3);

        let later = now + Duration::minutes(15);
        let report = HealthReport::collect(&store, "t1", &limits, later).unwrap();
        assert!(report.stale);
        assert!(report.alert);
        assert_eq!(report.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_lock_reporting() {
        let store = Store::in_memory().unwrap();
        let limits = PollerLimits::default();
        let now = Utc::now();
        store.set_lock("t1", Some(now - Duration::minutes(1))).unwrap();

        let report = HealthReport::collect(&store, "t1", &limits, now).unwrap();
        assert!(report.lock_held);
        assert_eq!(report.lock_age_seconds, Some(60));

        store.set_lock("t1", Some(now - Duration::minutes(20))).unwrap();
        let report = HealthReport::collect(&store, "t1", &limits, now).unwrap();
        assert!(!report.lock_held);
    }
}
