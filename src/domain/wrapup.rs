//! Wrapup drafts: the unit of human review for a call.
//!
//! Exactly one draft exists per call session. A draft starts in
//! `pending_review` and ends in `completed`, which is terminal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::call::CallDirection;

/// Review state of a draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    PendingReview,
    Completed,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for DraftStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_review" => Ok(Self::PendingReview),
            "completed" => Ok(Self::Completed),
            other => anyhow::bail!("Unknown draft status: {}", other),
        }
    }
}

/// How well the caller resolved to a CRM identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    MultipleMatches,
    Unmatched,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::MultipleMatches => "multiple_matches",
            Self::Unmatched => "unmatched",
        }
    }
}

impl FromStr for MatchStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "matched" => Ok(Self::Matched),
            "multiple_matches" => Ok(Self::MultipleMatches),
            "unmatched" => Ok(Self::Unmatched),
            other => anyhow::bail!("Unknown match status: {}", other),
        }
    }
}

/// What was done with a completed draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionAction {
    Ticket,
    Note,
    Skipped,
}

impl CompletionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::Note => "note",
            Self::Skipped => "skipped",
        }
    }
}

impl FromStr for CompletionAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ticket" => Ok(Self::Ticket),
            "note" => Ok(Self::Note),
            "skipped" => Ok(Self::Skipped),
            other => anyhow::bail!("Unknown completion action: {}", other),
        }
    }
}

/// Why a call was auto-voided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoidReason {
    Hangup,
    ShortCall,
    Playfile,
    InternalCall,
    NoContent,
}

impl VoidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hangup => "hangup",
            Self::ShortCall => "short_call",
            Self::Playfile => "playfile",
            Self::InternalCall => "internal_call",
            Self::NoContent => "no_content",
        }
    }
}

impl fmt::Display for VoidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoidReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hangup" => Ok(Self::Hangup),
            "short_call" => Ok(Self::ShortCall),
            "playfile" => Ok(Self::Playfile),
            "internal_call" => Ok(Self::InternalCall),
            "no_content" => Ok(Self::NoContent),
            other => anyhow::bail!("Unknown void reason: {}", other),
        }
    }
}

/// A candidate CRM identity offered to the reviewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSuggestion {
    pub crm_customer_id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub confidence: f64,
}

/// The review record for one call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapupDraft {
    pub id: String,
    pub tenant_id: String,
    pub call_id: String,
    pub direction: CallDirection,
    pub status: DraftStatus,
    pub match_status: MatchStatus,

    pub auto_voided: bool,
    pub void_reason: Option<VoidReason>,

    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,

    pub summary: Option<String>,
    pub request_type: Option<String>,

    /// Resolved CRM identity, when matched
    pub crm_customer_id: Option<String>,

    pub completion_action: Option<CompletionAction>,

    /// Free-form reason for a `skipped` completion (`outbound_unmatched`, `deduped`, ...)
    pub completion_reason: Option<String>,

    pub crm_ticket_id: Option<String>,
    pub crm_note_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WrapupDraft {
    pub fn is_completed(&self) -> bool {
        self.status == DraftStatus::Completed
    }
}

/// Terminal outcome recorded on a draft
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub action: CompletionAction,
    pub reason: Option<String>,
    pub crm_ticket_id: Option<String>,
    pub crm_note_id: Option<String>,
}

impl Completion {
    pub fn ticket(crm_ticket_id: impl Into<String>) -> Self {
        Self {
            action: CompletionAction::Ticket,
            reason: None,
            crm_ticket_id: Some(crm_ticket_id.into()),
            crm_note_id: None,
        }
    }

    pub fn note(crm_note_id: impl Into<String>) -> Self {
        Self {
            action: CompletionAction::Note,
            reason: None,
            crm_ticket_id: None,
            crm_note_id: Some(crm_note_id.into()),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            action: CompletionAction::Skipped,
            reason: Some(reason.into()),
            crm_ticket_id: None,
            crm_note_id: None,
        }
    }
}
