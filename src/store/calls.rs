//! Call session persistence and the lookups the matcher cascades through.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::{get_enum, get_opt_json, get_opt_ts, get_ts, is_unique_violation, ts, Store};
use crate::domain::{phone, Analysis, CallSession, CallStatus, NewCallSession};

/// Recording details written onto a session when the two are reconciled
#[derive(Debug, Clone)]
pub struct RecordingLink {
    pub recording_id: i64,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub transcript: Option<String>,
    pub extension: Option<String>,
    pub agent_id: Option<String>,
}

fn call_from_row(row: &Row<'_>) -> rusqlite::Result<CallSession> {
    Ok(CallSession {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        direction: get_enum(row, "direction")?,
        from_number: row.get("from_number")?,
        to_number: row.get("to_number")?,
        extension: row.get("extension")?,
        agent_id: row.get("agent_id")?,
        customer_id: row.get("customer_id")?,
        recording_id: row.get("recording_id")?,
        status: get_enum(row, "status")?,
        started_at: get_ts(row, "started_at")?,
        ended_at: get_opt_ts(row, "ended_at")?,
        duration_secs: row.get("duration_secs")?,
        transcript: row.get("transcript")?,
        summary: row.get("summary")?,
        sentiment: row.get("sentiment")?,
        entities: get_opt_json(row, "entities")?,
        crm_note_id: row.get("crm_note_id")?,
        created_at: get_ts(row, "created_at")?,
    })
}

impl Store {
    /// Insert a session.
    ///
    /// Returns `None` when the recording id is already linked to another
    /// session for this tenant.
    pub fn insert_call(&self, new: &NewCallSession) -> Result<Option<CallSession>> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let inserted = self.conn().execute(
            "INSERT INTO call_sessions (
                id, tenant_id, direction, from_number, to_number, from_digits, to_digits,
                extension, agent_id, customer_id, recording_id, status, started_at,
                ended_at, duration_secs, transcript, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                id,
                new.tenant_id,
                new.direction.as_str(),
                new.from_number,
                new.to_number,
                phone::normalize(&new.from_number),
                phone::normalize(&new.to_number),
                new.extension,
                new.agent_id,
                new.customer_id,
                new.recording_id,
                new.status.as_str(),
                ts(new.started_at),
                new.ended_at.map(ts),
                new.duration_secs,
                new.transcript,
                ts(now),
            ],
        );

        match inserted {
            Ok(_) => self.get_call(&id),
            Err(ref e) if is_unique_violation(e) => Ok(None),
            Err(e) => Err(e).context("Failed to insert call session"),
        }
    }

    pub fn get_call(&self, call_id: &str) -> Result<Option<CallSession>> {
        let call = self
            .conn()
            .query_row(
                "SELECT * FROM call_sessions WHERE id = ?1",
                params![call_id],
                call_from_row,
            )
            .optional()?;
        Ok(call)
    }

    /// Session already carrying this recording id
    pub fn find_call_by_recording(
        &self,
        tenant_id: &str,
        recording_id: i64,
    ) -> Result<Option<CallSession>> {
        let call = self
            .conn()
            .query_row(
                "SELECT * FROM call_sessions WHERE tenant_id = ?1 AND recording_id = ?2",
                params![tenant_id, recording_id],
                call_from_row,
            )
            .optional()?;
        Ok(call)
    }

    /// Unlinked sessions where either party has `digits`, started inside
    /// the window; sessions with an agent first, then closest in time.
    pub fn find_calls_by_phone(
        &self,
        tenant_id: &str,
        digits: &str,
        around: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Result<Vec<CallSession>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM call_sessions
             WHERE tenant_id = ?1
               AND (from_digits = ?2 OR to_digits = ?2)
               AND started_at BETWEEN ?3 AND ?4
               AND recording_id IS NULL
             ORDER BY (agent_id IS NULL), ABS(julianday(started_at) - julianday(?5))",
        )?;
        let calls = stmt
            .query_map(
                params![
                    tenant_id,
                    digits,
                    ts(around - window),
                    ts(around + window),
                    ts(around)
                ],
                call_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(calls)
    }

    /// Unlinked sessions on `extension` started inside the window, closest first
    pub fn find_calls_by_extension(
        &self,
        tenant_id: &str,
        extension: &str,
        around: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Result<Vec<CallSession>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM call_sessions
             WHERE tenant_id = ?1
               AND extension = ?2
               AND started_at BETWEEN ?3 AND ?4
               AND recording_id IS NULL
             ORDER BY ABS(julianday(started_at) - julianday(?5))",
        )?;
        let calls = stmt
            .query_map(
                params![
                    tenant_id,
                    extension,
                    ts(around - window),
                    ts(around + window),
                    ts(around)
                ],
                call_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(calls)
    }

    /// Attach a recording to an unlinked session and complete it.
    ///
    /// Returns `false` if the session already has a recording or the
    /// recording is linked elsewhere.
    pub fn link_recording(&self, call_id: &str, link: &RecordingLink) -> Result<bool> {
        let updated = self.conn().execute(
            "UPDATE call_sessions
             SET recording_id = ?2,
                 status = ?3,
                 ended_at = COALESCE(?4, ended_at),
                 duration_secs = COALESCE(?5, duration_secs),
                 transcript = COALESCE(?6, transcript),
                 extension = COALESCE(extension, ?7),
                 agent_id = COALESCE(agent_id, ?8)
             WHERE id = ?1 AND recording_id IS NULL",
            params![
                call_id,
                link.recording_id,
                CallStatus::Completed.as_str(),
                link.ended_at.map(ts),
                link.duration_secs,
                link.transcript,
                link.extension,
                link.agent_id,
            ],
        );

        match updated {
            Ok(n) => Ok(n == 1),
            Err(ref e) if is_unique_violation(e) => Ok(false),
            Err(e) => Err(e).context("Failed to link recording"),
        }
    }

    /// Store analyzer output on the session
    pub fn attach_analysis(&self, call_id: &str, analysis: &Analysis) -> Result<()> {
        let entities = serde_json::to_string(&analysis.entities)?;
        self.conn().execute(
            "UPDATE call_sessions SET summary = ?2, sentiment = ?3, entities = ?4 WHERE id = ?1",
            params![call_id, analysis.summary, analysis.sentiment.as_str(), entities],
        )?;
        Ok(())
    }

    /// Record the CRM customer (and note, if any) a call resolved to
    pub fn link_call_customer(
        &self,
        call_id: &str,
        customer_id: &str,
        crm_note_id: Option<&str>,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE call_sessions
             SET customer_id = ?2, crm_note_id = COALESCE(?3, crm_note_id)
             WHERE id = ?1",
            params![call_id, customer_id, crm_note_id],
        )?;
        Ok(())
    }

    /// Force-complete sessions stuck in an active state.
    ///
    /// Only sessions with no duration that started before `started_before`
    /// are touched, oldest first, at most `limit` per call.
    pub fn close_stale_calls(
        &self,
        tenant_id: &str,
        started_before: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize> {
        let closed = self.conn().execute(
            "UPDATE call_sessions
             SET status = 'completed', ended_at = ?3
             WHERE id IN (
                 SELECT id FROM call_sessions
                 WHERE tenant_id = ?1
                   AND status IN ('ringing', 'in_progress')
                   AND duration_secs IS NULL
                   AND started_at < ?2
                 ORDER BY started_at
                 LIMIT ?4
             )",
            params![tenant_id, ts(started_before), ts(ended_at), limit as i64],
        )?;
        Ok(closed)
    }

    pub fn count_calls(&self, tenant_id: &str) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM call_sessions WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
