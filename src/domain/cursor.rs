//! Per-tenant poll cursor and cooperative processing lock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Resumption point and lock for one tenant's poller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollCursor {
    pub tenant_id: String,

    /// Highest recording id already handled (watermark)
    pub last_recording_id: i64,

    /// Last successful poll
    pub last_poll_at: Option<DateTime<Utc>>,

    /// Failed polls since the last success
    pub consecutive_errors: u32,

    pub last_error: Option<String>,

    /// Set while a batch is running; doubles as the lock
    pub processing_started_at: Option<DateTime<Utc>>,
}

impl PollCursor {
    /// How long the current lock has been held
    pub fn lock_age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.processing_started_at.map(|started| now - started)
    }

    /// Lock is present and younger than `window`
    pub fn is_locked_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.lock_age(now).map(|age| age < window).unwrap_or(false)
    }
}
