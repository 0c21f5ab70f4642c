//! Durable pairing records for after-hours merges.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use super::{get_enum, get_opt_json, get_ts, ts, Store};
use crate::domain::{MergeRecord, MergeSource, MergeStatus};

fn merge_from_row(row: &Row<'_>) -> rusqlite::Result<MergeRecord> {
    Ok(MergeRecord {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        phone_digits: row.get("phone_digits")?,
        source: get_enum(row, "source")?,
        payload: get_opt_json(row, "payload")?.unwrap_or(serde_json::Value::Null),
        status: get_enum(row, "status")?,
        matched_with: row.get("matched_with")?,
        created_at: get_ts(row, "created_at")?,
        expires_at: get_ts(row, "expires_at")?,
    })
}

impl Store {
    /// Record one half of a pair.
    ///
    /// If an unexpired counterpart is awaiting for the same phone, both
    /// records are marked `matched` and the counterpart is returned.
    /// Otherwise the new half is stored as `awaiting_pair` and `None` is
    /// returned. Runs in one immediate transaction so two halves arriving
    /// together cannot both wait.
    pub fn offer_merge(
        &self,
        tenant_id: &str,
        phone_digits: &str,
        source: MergeSource,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(MergeRecord, Option<MergeRecord>)> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = Uuid::new_v4().to_string();

        let counterpart = tx
            .query_row(
                "SELECT * FROM pending_merges
                 WHERE tenant_id = ?1 AND phone_digits = ?2 AND source = ?3
                   AND status = 'awaiting_pair' AND expires_at > ?4
                 ORDER BY created_at LIMIT 1",
                params![tenant_id, phone_digits, source.counterpart().as_str(), ts(now)],
                merge_from_row,
            )
            .optional()?;

        let status = if counterpart.is_some() {
            MergeStatus::Matched
        } else {
            MergeStatus::AwaitingPair
        };

        tx.execute(
            "INSERT INTO pending_merges (id, tenant_id, phone_digits, source, payload, status, matched_with, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                tenant_id,
                phone_digits,
                source.as_str(),
                payload.to_string(),
                status.as_str(),
                counterpart.as_ref().map(|c| c.id.clone()),
                ts(now),
                ts(expires_at),
            ],
        )?;

        let counterpart = match counterpart {
            Some(mut other) => {
                tx.execute(
                    "UPDATE pending_merges SET status = 'matched', matched_with = ?2 WHERE id = ?1",
                    params![other.id, id],
                )?;
                other.status = MergeStatus::Matched;
                other.matched_with = Some(id.clone());
                Some(other)
            }
            None => None,
        };

        let record = tx.query_row(
            "SELECT * FROM pending_merges WHERE id = ?1",
            params![id],
            merge_from_row,
        )?;
        tx.commit()?;
        Ok((record, counterpart))
    }

    /// Sweep awaiting records past their deadline to `expired`; returns them
    pub fn expire_merges(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<Vec<MergeRecord>> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let expired = {
            let mut stmt = tx.prepare(
                "SELECT * FROM pending_merges
                 WHERE tenant_id = ?1 AND status = 'awaiting_pair' AND expires_at <= ?2
                 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map(params![tenant_id, ts(now)], merge_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        tx.execute(
            "UPDATE pending_merges SET status = 'expired'
             WHERE tenant_id = ?1 AND status = 'awaiting_pair' AND expires_at <= ?2",
            params![tenant_id, ts(now)],
        )?;
        tx.commit()?;

        Ok(expired
            .into_iter()
            .map(|mut m| {
                m.status = MergeStatus::Expired;
                m
            })
            .collect())
    }

    pub fn count_awaiting_merges(&self, tenant_id: &str) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM pending_merges WHERE tenant_id = ?1 AND status = 'awaiting_pair'",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
