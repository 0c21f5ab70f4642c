//! Local ticket records and the downstream retry queue.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{get_enum, get_ts, is_unique_violation, ts, Store};
use crate::domain::{NewRetryEntry, RetryEntry, RetryOperation};

/// A CRM ticket created for a draft
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub tenant_id: String,
    pub draft_id: String,
    pub call_id: String,
    pub crm_customer_id: String,
    pub crm_ticket_id: String,
    pub subject: String,
}

#[derive(Debug, Clone)]
pub struct TicketRecord {
    pub id: String,
    pub tenant_id: String,
    pub draft_id: String,
    pub call_id: String,
    pub crm_customer_id: String,
    pub crm_ticket_id: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
}

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<TicketRecord> {
    Ok(TicketRecord {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        draft_id: row.get("draft_id")?,
        call_id: row.get("call_id")?,
        crm_customer_id: row.get("crm_customer_id")?,
        crm_ticket_id: row.get("crm_ticket_id")?,
        subject: row.get("subject")?,
        created_at: get_ts(row, "created_at")?,
    })
}

fn retry_from_row(row: &Row<'_>) -> rusqlite::Result<RetryEntry> {
    let payload: String = row.get("payload")?;
    Ok(RetryEntry {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        operation: get_enum(row, "operation")?,
        target_service: row.get("target_service")?,
        payload: serde_json::from_str(&payload).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        draft_id: row.get("draft_id")?,
        call_id: row.get("call_id")?,
        last_error: row.get("last_error")?,
        idempotency_key: row.get("idempotency_key")?,
        attempts: row.get("attempts")?,
        status: row.get("status")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

/// `{operation}:{draft_id}:{first 16 hex chars of sha256(payload)}`
pub fn payload_idempotency_key(
    operation: RetryOperation,
    draft_id: Option<&str>,
    payload: &serde_json::Value,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!(
        "{}:{}:{}",
        operation.as_str(),
        draft_id.unwrap_or("-"),
        &digest[..16]
    )
}

impl Store {
    /// Persist a ticket record.
    ///
    /// Returns `false` if the draft already has one.
    pub fn insert_ticket(&self, ticket: &NewTicket) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT INTO tickets (id, tenant_id, draft_id, call_id, crm_customer_id, crm_ticket_id, subject, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                ticket.tenant_id,
                ticket.draft_id,
                ticket.call_id,
                ticket.crm_customer_id,
                ticket.crm_ticket_id,
                ticket.subject,
                ts(Utc::now()),
            ],
        );

        match inserted {
            Ok(_) => Ok(true),
            Err(ref e) if is_unique_violation(e) => Ok(false),
            Err(e) => Err(e).context("Failed to insert ticket record"),
        }
    }

    pub fn ticket_for_draft(&self, draft_id: &str) -> Result<Option<TicketRecord>> {
        let ticket = self
            .conn()
            .query_row(
                "SELECT * FROM tickets WHERE draft_id = ?1",
                params![draft_id],
                ticket_from_row,
            )
            .optional()?;
        Ok(ticket)
    }

    /// Most recent ticket for a customer created at or after `since`
    pub fn recent_ticket_for_customer(
        &self,
        tenant_id: &str,
        crm_customer_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<TicketRecord>> {
        let ticket = self
            .conn()
            .query_row(
                "SELECT * FROM tickets
                 WHERE tenant_id = ?1 AND crm_customer_id = ?2 AND created_at >= ?3
                 ORDER BY created_at DESC LIMIT 1",
                params![tenant_id, crm_customer_id, ts(since)],
                ticket_from_row,
            )
            .optional()?;
        Ok(ticket)
    }

    /// Queue a failed dispatch for replay.
    ///
    /// The same failed request queued twice bumps `attempts` on the existing
    /// entry instead of adding a second one.
    pub fn enqueue_retry(&self, entry: &NewRetryEntry) -> Result<RetryEntry> {
        let key = payload_idempotency_key(entry.operation, entry.draft_id.as_deref(), &entry.payload);
        let now = ts(Utc::now());
        let conn = self.conn();

        conn.execute(
            "INSERT INTO retry_queue (
                tenant_id, operation, target_service, payload, draft_id, call_id,
                last_error, idempotency_key, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(idempotency_key) DO UPDATE SET
                attempts = retry_queue.attempts + 1,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at",
            params![
                entry.tenant_id,
                entry.operation.as_str(),
                entry.target_service,
                entry.payload.to_string(),
                entry.draft_id,
                entry.call_id,
                entry.last_error,
                key,
                now,
            ],
        )
        .context("Failed to enqueue retry")?;

        conn.query_row(
            "SELECT * FROM retry_queue WHERE idempotency_key = ?1",
            params![key],
            retry_from_row,
        )
        .context("Failed to read back retry entry")
    }

    /// Retry entries for a tenant, oldest first; `status` filters when given
    pub fn list_retries(&self, tenant_id: &str, status: Option<&str>) -> Result<Vec<RetryEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM retry_queue
             WHERE tenant_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY id",
        )?;
        let entries = stmt
            .query_map(params![tenant_id, status], retry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}
