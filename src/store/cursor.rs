//! Poll cursor: watermark, health counters and the processing lock.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{get_opt_ts, ts, Store};
use crate::domain::PollCursor;

fn cursor_from_row(row: &Row<'_>) -> rusqlite::Result<PollCursor> {
    Ok(PollCursor {
        tenant_id: row.get("tenant_id")?,
        last_recording_id: row.get("last_recording_id")?,
        last_poll_at: get_opt_ts(row, "last_poll_at")?,
        consecutive_errors: row.get("consecutive_errors")?,
        last_error: row.get("last_error")?,
        processing_started_at: get_opt_ts(row, "processing_started_at")?,
    })
}

impl Store {
    /// Load the tenant's cursor, creating it at watermark 0 if absent
    pub fn ensure_cursor(&self, tenant_id: &str) -> Result<PollCursor> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO poll_cursors (tenant_id, last_recording_id) VALUES (?1, 0)",
            params![tenant_id],
        )?;
        conn.query_row(
            "SELECT * FROM poll_cursors WHERE tenant_id = ?1",
            params![tenant_id],
            cursor_from_row,
        )
        .with_context(|| format!("Failed to load cursor for tenant {}", tenant_id))
    }

    /// Load the tenant's cursor without creating it
    pub fn get_cursor(&self, tenant_id: &str) -> Result<Option<PollCursor>> {
        let cursor = self
            .conn()
            .query_row(
                "SELECT * FROM poll_cursors WHERE tenant_id = ?1",
                params![tenant_id],
                cursor_from_row,
            )
            .optional()?;
        Ok(cursor)
    }

    /// Try to take the processing lock.
    ///
    /// Succeeds when the lock is free or was taken before `free_before`.
    /// The affected-row count of the conditional update is the acquisition
    /// signal, so two racing invocations cannot both win.
    pub fn try_acquire_lock(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
        free_before: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE poll_cursors
             SET processing_started_at = ?2
             WHERE tenant_id = ?1
               AND (processing_started_at IS NULL OR processing_started_at < ?3)",
            params![tenant_id, ts(now), ts(free_before)],
        )?;
        Ok(changed == 1)
    }

    /// Release a lock this invocation holds.
    ///
    /// Only clears the timestamp written at acquisition; a lock taken over by
    /// a later invocation is left alone.
    pub fn release_lock(&self, tenant_id: &str, acquired_at: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE poll_cursors
             SET processing_started_at = NULL
             WHERE tenant_id = ?1 AND processing_started_at = ?2",
            params![tenant_id, ts(acquired_at)],
        )?;
        Ok(changed == 1)
    }

    /// Overwrite the lock timestamp (operator unlock, tests)
    pub fn set_lock(&self, tenant_id: &str, started_at: Option<DateTime<Utc>>) -> Result<()> {
        self.ensure_cursor(tenant_id)?;
        self.conn().execute(
            "UPDATE poll_cursors SET processing_started_at = ?2 WHERE tenant_id = ?1",
            params![tenant_id, started_at.map(ts)],
        )?;
        Ok(())
    }

    /// Move the watermark forward; never moves it back
    pub fn advance_watermark(&self, tenant_id: &str, recording_id: i64) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "UPDATE poll_cursors
             SET last_recording_id = MAX(last_recording_id, ?2)
             WHERE tenant_id = ?1",
            params![tenant_id, recording_id],
        )?;
        let watermark = conn.query_row(
            "SELECT last_recording_id FROM poll_cursors WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(watermark)
    }

    /// Record a completed poll and reset the error streak
    pub fn record_poll_success(&self, tenant_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE poll_cursors
             SET last_poll_at = ?2, consecutive_errors = 0, last_error = NULL
             WHERE tenant_id = ?1",
            params![tenant_id, ts(at)],
        )?;
        Ok(())
    }

    /// Record a failed poll; returns the new error streak
    pub fn record_poll_failure(&self, tenant_id: &str, error: &str) -> Result<u32> {
        let conn = self.conn();
        conn.execute(
            "UPDATE poll_cursors
             SET consecutive_errors = consecutive_errors + 1, last_error = ?2
             WHERE tenant_id = ?1",
            params![tenant_id, error],
        )?;
        let streak = conn.query_row(
            "SELECT consecutive_errors FROM poll_cursors WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(streak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_lock_is_exclusive_until_window_passes() {
        let store = Store::in_memory().unwrap();
        store.ensure_cursor("t1").unwrap();
        let now = Utc::now();

        assert!(store
            .try_acquire_lock("t1", now, now - Duration::minutes(4))
            .unwrap());

        let later = now + Duration::minutes(1);
        assert!(!store
            .try_acquire_lock("t1", later, later - Duration::minutes(4))
            .unwrap());

        let much_later = now + Duration::minutes(6);
        assert!(store
            .try_acquire_lock("t1", much_later, much_later - Duration::minutes(4))
            .unwrap());
    }

    #[test]
    fn test_release_is_owner_scoped() {
        let store = Store::in_memory().unwrap();
        store.ensure_cursor("t1").unwrap();
        let first = Utc::now() - Duration::minutes(10);
        let second = Utc::now();

        store.set_lock("t1", Some(second)).unwrap();
        assert!(!store.release_lock("t1", first).unwrap());
        assert!(store.get_cursor("t1").unwrap().unwrap().processing_started_at.is_some());

        assert!(store.release_lock("t1", second).unwrap());
        assert!(store.get_cursor("t1").unwrap().unwrap().processing_started_at.is_none());
    }

    #[test]
    fn test_watermark_never_moves_back() {
        let store = Store::in_memory().unwrap();
        store.ensure_cursor("t1").unwrap();

        assert_eq!(store.advance_watermark("t1", 10).unwrap(), 10);
        assert_eq!(store.advance_watermark("t1", 7).unwrap(), 10);
        assert_eq!(store.advance_watermark("t1", 12).unwrap(), 12);
    }

    #[test]
    fn test_poll_failure_streak_resets_on_success() {
        let store = Store::in_memory().unwrap();
        store.ensure_cursor("t1").unwrap();

        assert_eq!(store.record_poll_failure("t1", "boom").unwrap(), 1);
        assert_eq!(store.record_poll_failure("t1", "boom again").unwrap(), 2);
        let cursor = store.get_cursor("t1").unwrap().unwrap();
        assert_eq!(cursor.last_error.as_deref(), Some("boom again"));

        store.record_poll_success("t1", Utc::now()).unwrap();
        let cursor = store.get_cursor("t1").unwrap().unwrap();
        assert_eq!(cursor.consecutive_errors, 0);
        assert!(cursor.last_error.is_none());
        assert!(cursor.last_poll_at.is_some());
    }
}
