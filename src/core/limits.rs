//! Poller thresholds and their validation.
//!
//! Every timing knob of the batch lives here:
//! - Lock windows (active / stale)
//! - Per-recording and per-call timeouts
//! - Transcription wait and matching window
//! - Stale-call sweep, ticket dedup, health staleness
//! - Alerting thresholds

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Thresholds for one tenant's poller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerLimits {
    /// A lock younger than this means another batch is running (default: 240s)
    #[serde(default = "default_lock_active")]
    pub lock_active_seconds: u64,

    /// A lock older than this is an abandoned run; take over with a warning (default: 300s)
    #[serde(default = "default_lock_stale")]
    pub lock_stale_seconds: u64,

    /// Per-recording processing timeout (default: 60s)
    #[serde(default = "default_item_timeout")]
    pub item_timeout_seconds: u64,

    /// Recording fetch timeout (default: 30s)
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,

    /// CRM request timeout (default: 20s)
    #[serde(default = "default_crm_timeout")]
    pub crm_timeout_seconds: u64,

    /// Analyzer request timeout (default: 45s)
    #[serde(default = "default_analyzer_timeout")]
    pub analyzer_timeout_seconds: u64,

    /// Alert delivery timeout (default: 10s)
    #[serde(default = "default_alert_timeout")]
    pub alert_timeout_seconds: u64,

    /// Stop waiting for a transcript after this long (default: 24h)
    #[serde(default = "default_transcription_wait")]
    pub transcription_wait_hours: u64,

    /// Half-width of the session matching window (default: 300s)
    #[serde(default = "default_match_window")]
    pub match_window_seconds: u64,

    /// Active sessions older than this are force-completed (default: 30 min)
    #[serde(default = "default_stale_call")]
    pub stale_call_minutes: u64,

    /// Max sessions closed per sweep (default: 50)
    #[serde(default = "default_stale_call_batch")]
    pub stale_call_batch: usize,

    /// Window in which a customer gets at most one ticket (default: 60 min)
    #[serde(default = "default_ticket_dedup")]
    pub ticket_dedup_minutes: u64,

    /// Error messages kept per batch for alerting (default: 5)
    #[serde(default = "default_error_sample")]
    pub error_sample_size: usize,

    /// Errors in one batch (or consecutive failed polls) that trigger an alert (default: 3)
    #[serde(default = "default_alert_threshold")]
    pub alert_error_threshold: u32,

    /// No successful poll for this long counts as stale (default: 10 min)
    #[serde(default = "default_health_stale")]
    pub health_stale_minutes: u64,

    /// Time box for pairing after-hours email and voicemail (default: 15 min)
    #[serde(default = "default_merge_window")]
    pub merge_window_minutes: u64,
}

fn default_lock_active() -> u64 {
    240
}
fn default_lock_stale() -> u64 {
    300
}
fn default_item_timeout() -> u64 {
    60
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_crm_timeout() -> u64 {
    20
}
fn default_analyzer_timeout() -> u64 {
    45
}
fn default_alert_timeout() -> u64 {
    10
}
fn default_transcription_wait() -> u64 {
    24
}
fn default_match_window() -> u64 {
    300
}
fn default_stale_call() -> u64 {
    30
}
fn default_stale_call_batch() -> usize {
    50
}
fn default_ticket_dedup() -> u64 {
    60
}
fn default_error_sample() -> usize {
    5
}
fn default_alert_threshold() -> u32 {
    3
}
fn default_health_stale() -> u64 {
    10
}
fn default_merge_window() -> u64 {
    15
}

impl Default for PollerLimits {
    fn default() -> Self {
        Self {
            lock_active_seconds: default_lock_active(),
            lock_stale_seconds: default_lock_stale(),
            item_timeout_seconds: default_item_timeout(),
            fetch_timeout_seconds: default_fetch_timeout(),
            crm_timeout_seconds: default_crm_timeout(),
            analyzer_timeout_seconds: default_analyzer_timeout(),
            alert_timeout_seconds: default_alert_timeout(),
            transcription_wait_hours: default_transcription_wait(),
            match_window_seconds: default_match_window(),
            stale_call_minutes: default_stale_call(),
            stale_call_batch: default_stale_call_batch(),
            ticket_dedup_minutes: default_ticket_dedup(),
            error_sample_size: default_error_sample(),
            alert_error_threshold: default_alert_threshold(),
            health_stale_minutes: default_health_stale(),
            merge_window_minutes: default_merge_window(),
        }
    }
}

impl PollerLimits {
    pub fn lock_active(&self) -> Duration {
        Duration::seconds(self.lock_active_seconds as i64)
    }

    pub fn lock_stale(&self) -> Duration {
        Duration::seconds(self.lock_stale_seconds as i64)
    }

    pub fn item_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.item_timeout_seconds)
    }

    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn crm_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.crm_timeout_seconds)
    }

    pub fn analyzer_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.analyzer_timeout_seconds)
    }

    pub fn alert_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.alert_timeout_seconds)
    }

    pub fn transcription_wait(&self) -> Duration {
        Duration::hours(self.transcription_wait_hours as i64)
    }

    pub fn match_window(&self) -> Duration {
        Duration::seconds(self.match_window_seconds as i64)
    }

    pub fn stale_call(&self) -> Duration {
        Duration::minutes(self.stale_call_minutes as i64)
    }

    pub fn ticket_dedup(&self) -> Duration {
        Duration::minutes(self.ticket_dedup_minutes as i64)
    }

    pub fn health_stale(&self) -> Duration {
        Duration::minutes(self.health_stale_minutes as i64)
    }

    pub fn merge_window(&self) -> Duration {
        Duration::minutes(self.merge_window_minutes as i64)
    }

    /// Reject combinations the poller cannot run with
    pub fn validate(&self) -> Result<(), LimitViolation> {
        if self.lock_active_seconds == 0 {
            return Err(LimitViolation::Zero {
                field: "lock_active_seconds",
            });
        }
        if self.lock_active_seconds > self.lock_stale_seconds {
            return Err(LimitViolation::LockWindows {
                active: self.lock_active_seconds,
                stale: self.lock_stale_seconds,
            });
        }
        if self.item_timeout_seconds == 0 {
            return Err(LimitViolation::Zero {
                field: "item_timeout_seconds",
            });
        }
        if self.item_timeout_seconds >= self.lock_active_seconds {
            return Err(LimitViolation::ItemTimeout {
                timeout: self.item_timeout_seconds,
                active: self.lock_active_seconds,
            });
        }
        if self.alert_timeout_seconds == 0 {
            return Err(LimitViolation::Zero {
                field: "alert_timeout_seconds",
            });
        }
        if self.stale_call_batch == 0 {
            return Err(LimitViolation::Zero {
                field: "stale_call_batch",
            });
        }
        Ok(())
    }
}

/// Invalid threshold combinations
#[derive(Debug, Error, PartialEq)]
pub enum LimitViolation {
    #[error("active lock window ({active}s) must not exceed stale lock window ({stale}s)")]
    LockWindows { active: u64, stale: u64 },

    #[error("per-recording timeout ({timeout}s) must be shorter than the active lock window ({active}s)")]
    ItemTimeout { timeout: u64, active: u64 },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}
