//! Stale-call sweep.
//!
//! Sessions left in `ringing` / `in_progress` with no duration (the call-end
//! event never arrived) are force-completed once they are older than the
//! stale threshold. Each sweep touches at most `batch` sessions.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::store::Store;

pub fn sweep_stale_calls(
    store: &Store,
    tenant_id: &str,
    stale_after: Duration,
    batch: usize,
    now: DateTime<Utc>,
) -> Result<usize> {
    let closed = store.close_stale_calls(tenant_id, now - stale_after, now, batch)?;
    if closed > 0 {
        info!(tenant = tenant_id, closed, "Closed stale call sessions");
    }
    Ok(closed)
}
