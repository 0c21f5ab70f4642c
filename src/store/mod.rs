//! Relational store (SQLite).
//!
//! The store is the single source of truth. All deduplication and mutual
//! exclusion is expressed as constraints and conditional updates against it;
//! nothing held in memory across invocations is relied on for correctness.
//!
//! Timestamps are fixed-width RFC 3339 UTC strings, so string comparison in
//! SQL is chronological comparison.

mod calls;
mod cursor;
mod directory;
mod drafts;
mod merges;
mod schema;
mod tickets;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, Row};

pub use calls::RecordingLink;
pub use drafts::DraftSeed;
pub use schema::SCHEMA;
pub use tickets::{payload_idempotency_key, NewTicket, TicketRecord};

/// SQLite-backed store shared by every pipeline component
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        Self::init(conn)
    }

    /// In-memory database (for tests)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store mutex poisoned")
    }
}

/// Format a timestamp for storage
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn parse_ts(idx: &str, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("{}: {}", idx, e).into(),
            )
        })
}

/// Read a required timestamp column
pub(crate) fn get_ts(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    parse_ts(column, &raw)
}

/// Read a nullable timestamp column
pub(crate) fn get_opt_ts(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|r| parse_ts(column, &r)).transpose()
}

/// Parse a text enum column via `FromStr`
pub(crate) fn get_enum<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|e: anyhow::Error| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("{}: {}", column, e).into(),
        )
    })
}

/// Parse a nullable text enum column
pub(crate) fn get_opt_enum<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<T>>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    let raw: Option<String> = row.get(column)?;
    raw.map(|r| {
        r.parse().map_err(|e: anyhow::Error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("{}: {}", column, e).into(),
            )
        })
    })
    .transpose()
}

/// Read a nullable JSON column
pub(crate) fn get_opt_json(
    row: &Row<'_>,
    column: &str,
) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|r| {
        serde_json::from_str(&r).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

/// True when the error is a UNIQUE/PRIMARY KEY violation
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}
