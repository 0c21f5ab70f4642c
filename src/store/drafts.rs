//! Wrapup draft persistence.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::{get_enum, get_opt_enum, get_opt_ts, get_ts, ts, Store};
use crate::domain::{
    CallDirection, Completion, CompletionAction, DraftStatus, MatchStatus, MatchSuggestion,
    VoidReason, WrapupDraft,
};

/// Everything known about a call when its draft is opened
#[derive(Debug, Clone)]
pub struct DraftSeed {
    pub tenant_id: String,
    pub call_id: String,
    pub direction: CallDirection,
    pub match_status: MatchStatus,
    pub crm_customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub summary: Option<String>,
    pub request_type: Option<String>,

    /// Set when the call is auto-voided; the draft is then born completed
    pub void_reason: Option<VoidReason>,
}

fn draft_from_row(row: &Row<'_>) -> rusqlite::Result<WrapupDraft> {
    let auto_voided: i64 = row.get("auto_voided")?;
    Ok(WrapupDraft {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        call_id: row.get("call_id")?,
        direction: get_enum(row, "direction")?,
        status: get_enum(row, "status")?,
        match_status: get_enum(row, "match_status")?,
        auto_voided: auto_voided != 0,
        void_reason: get_opt_enum(row, "void_reason")?,
        customer_name: row.get("customer_name")?,
        customer_phone: row.get("customer_phone")?,
        customer_email: row.get("customer_email")?,
        summary: row.get("summary")?,
        request_type: row.get("request_type")?,
        crm_customer_id: row.get("crm_customer_id")?,
        completion_action: get_opt_enum(row, "completion_action")?,
        completion_reason: row.get("completion_reason")?,
        crm_ticket_id: row.get("crm_ticket_id")?,
        crm_note_id: row.get("crm_note_id")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
        completed_at: get_opt_ts(row, "completed_at")?,
    })
}

impl Store {
    /// Create the draft for a call, or refresh it if one exists.
    ///
    /// Upsert on `call_id`: a retried invocation updates the existing row
    /// instead of inserting a second one. Completed drafts are never touched.
    pub fn upsert_draft(&self, seed: &DraftSeed) -> Result<WrapupDraft> {
        let now = ts(Utc::now());
        let voided = seed.void_reason.is_some();
        let (status, action, completed_at) = if voided {
            (
                DraftStatus::Completed,
                Some(CompletionAction::Skipped.as_str()),
                Some(now.clone()),
            )
        } else {
            (DraftStatus::PendingReview, None, None)
        };

        self.conn()
            .execute(
                "INSERT INTO wrapup_drafts (
                    id, tenant_id, call_id, direction, status, match_status, auto_voided,
                    void_reason, customer_name, customer_phone, customer_email, summary,
                    request_type, crm_customer_id, completion_action, completion_reason,
                    created_at, updated_at, completed_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17, ?18)
                 ON CONFLICT(call_id) DO UPDATE SET
                    status = excluded.status,
                    match_status = excluded.match_status,
                    auto_voided = excluded.auto_voided,
                    void_reason = excluded.void_reason,
                    customer_name = COALESCE(excluded.customer_name, wrapup_drafts.customer_name),
                    customer_phone = COALESCE(excluded.customer_phone, wrapup_drafts.customer_phone),
                    customer_email = COALESCE(excluded.customer_email, wrapup_drafts.customer_email),
                    summary = COALESCE(excluded.summary, wrapup_drafts.summary),
                    request_type = COALESCE(excluded.request_type, wrapup_drafts.request_type),
                    crm_customer_id = COALESCE(excluded.crm_customer_id, wrapup_drafts.crm_customer_id),
                    completion_action = excluded.completion_action,
                    completion_reason = excluded.completion_reason,
                    updated_at = excluded.updated_at,
                    completed_at = excluded.completed_at
                 WHERE wrapup_drafts.status = 'pending_review'",
                params![
                    Uuid::new_v4().to_string(),
                    seed.tenant_id,
                    seed.call_id,
                    seed.direction.as_str(),
                    status.as_str(),
                    seed.match_status.as_str(),
                    voided as i64,
                    seed.void_reason.map(|r| r.as_str()),
                    seed.customer_name,
                    seed.customer_phone,
                    seed.customer_email,
                    seed.summary,
                    seed.request_type,
                    seed.crm_customer_id,
                    action,
                    seed.void_reason.map(|r| r.as_str()),
                    now,
                    completed_at,
                ],
            )
            .context("Failed to upsert wrapup draft")?;

        self.get_draft_by_call(&seed.call_id)?
            .with_context(|| format!("Draft for call {} vanished after upsert", seed.call_id))
    }

    pub fn get_draft(&self, draft_id: &str) -> Result<Option<WrapupDraft>> {
        let draft = self
            .conn()
            .query_row(
                "SELECT * FROM wrapup_drafts WHERE id = ?1",
                params![draft_id],
                draft_from_row,
            )
            .optional()?;
        Ok(draft)
    }

    pub fn get_draft_by_call(&self, call_id: &str) -> Result<Option<WrapupDraft>> {
        let draft = self
            .conn()
            .query_row(
                "SELECT * FROM wrapup_drafts WHERE call_id = ?1",
                params![call_id],
                draft_from_row,
            )
            .optional()?;
        Ok(draft)
    }

    /// Move a pending draft to `completed`.
    ///
    /// Returns `false` if the draft was not pending (already terminal).
    pub fn complete_draft(&self, draft_id: &str, completion: &Completion) -> Result<bool> {
        let now = ts(Utc::now());
        let changed = self.conn().execute(
            "UPDATE wrapup_drafts
             SET status = 'completed',
                 completion_action = ?2,
                 completion_reason = ?3,
                 crm_ticket_id = COALESCE(?4, crm_ticket_id),
                 crm_note_id = COALESCE(?5, crm_note_id),
                 updated_at = ?6,
                 completed_at = ?6
             WHERE id = ?1 AND status = 'pending_review'",
            params![
                draft_id,
                completion.action.as_str(),
                completion.reason,
                completion.crm_ticket_id,
                completion.crm_note_id,
                now,
            ],
        )?;
        Ok(changed == 1)
    }

    /// Replace the match suggestions of a pending draft
    pub fn replace_suggestions(&self, draft_id: &str, suggestions: &[MatchSuggestion]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM match_suggestions WHERE draft_id = ?1",
            params![draft_id],
        )?;
        for s in suggestions {
            tx.execute(
                "INSERT OR IGNORE INTO match_suggestions (draft_id, crm_customer_id, name, phone, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![draft_id, s.crm_customer_id, s.name, s.phone, s.confidence],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Suggestions for a draft, highest confidence first
    pub fn list_suggestions(&self, draft_id: &str) -> Result<Vec<MatchSuggestion>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT crm_customer_id, name, phone, confidence FROM match_suggestions
             WHERE draft_id = ?1 ORDER BY confidence DESC, crm_customer_id",
        )?;
        let suggestions = stmt
            .query_map(params![draft_id], |row| {
                Ok(MatchSuggestion {
                    crm_customer_id: row.get(0)?,
                    name: row.get(1)?,
                    phone: row.get(2)?,
                    confidence: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(suggestions)
    }

    /// The human review queue, oldest first
    pub fn list_pending_drafts(&self, tenant_id: &str, limit: usize) -> Result<Vec<WrapupDraft>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM wrapup_drafts
             WHERE tenant_id = ?1 AND status = 'pending_review'
             ORDER BY created_at LIMIT ?2",
        )?;
        let drafts = stmt
            .query_map(params![tenant_id, limit as i64], draft_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(drafts)
    }

    pub fn count_pending_drafts(&self, tenant_id: &str) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM wrapup_drafts WHERE tenant_id = ?1 AND status = 'pending_review'",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn count_drafts(&self, tenant_id: &str) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM wrapup_drafts WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
