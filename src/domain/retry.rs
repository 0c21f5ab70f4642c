//! Retry queue entries for failed downstream dispatches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Downstream operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOperation {
    CreateTicket,
    AddNote,
}

impl RetryOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateTicket => "create_ticket",
            Self::AddNote => "add_note",
        }
    }
}

impl std::str::FromStr for RetryOperation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_ticket" => Ok(Self::CreateTicket),
            "add_note" => Ok(Self::AddNote),
            other => anyhow::bail!("Unknown retry operation: {}", other),
        }
    }
}

/// A failed dispatch waiting for the retry worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryEntry {
    pub id: i64,
    pub tenant_id: String,
    pub operation: RetryOperation,

    /// Target system, e.g. "crm"
    pub target_service: String,

    /// Original request payload, replayable as-is
    pub payload: serde_json::Value,

    pub draft_id: Option<String>,
    pub call_id: Option<String>,
    pub last_error: String,

    /// `{operation}:{draft_id}:{payload_hash}`
    pub idempotency_key: String,

    pub attempts: u32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to enqueue a retry
#[derive(Debug, Clone)]
pub struct NewRetryEntry {
    pub tenant_id: String,
    pub operation: RetryOperation,
    pub target_service: String,
    pub payload: serde_json::Value,
    pub draft_id: Option<String>,
    pub call_id: Option<String>,
    pub last_error: String,
}
