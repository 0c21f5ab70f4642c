//! Call sessions: the system's own record of one phone call.
//!
//! A session is created either by the call-start webhook (out of process) or
//! lazily by the poller when a recording arrives with nothing to attach to.
//! Sessions are never deleted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side placed the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inbound" | "incoming" | "in" => Ok(Self::Inbound),
            "outbound" | "outgoing" | "out" => Ok(Self::Outbound),
            other => anyhow::bail!("Unknown call direction: {}", other),
        }
    }
}

/// Lifecycle of a call session.
///
/// `ringing` and `in_progress` are the active states; `completed` and
/// `missed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Ringing,
    InProgress,
    Completed,
    Missed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ringing => "ringing",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Missed => "missed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Ringing | Self::InProgress)
    }
}

impl FromStr for CallStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ringing" => Ok(Self::Ringing),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "missed" => Ok(Self::Missed),
            other => anyhow::bail!("Unknown call status: {}", other),
        }
    }
}

/// One phone call as stored locally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub id: String,
    pub tenant_id: String,
    pub direction: CallDirection,
    pub from_number: String,
    pub to_number: String,
    pub extension: Option<String>,

    /// Agent who handled the call (if known)
    pub agent_id: Option<String>,

    /// CRM customer id the call has been linked to
    pub customer_id: Option<String>,

    /// External recording id; unique per tenant once set
    pub recording_id: Option<i64>,

    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,

    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub sentiment: Option<String>,

    /// Analyzer-extracted entities (JSON)
    pub entities: Option<serde_json::Value>,

    /// CRM note posted for this call (outbound only)
    pub crm_note_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl CallSession {
    /// The number belonging to the outside party
    pub fn customer_number(&self) -> &str {
        match self.direction {
            CallDirection::Inbound => &self.from_number,
            CallDirection::Outbound => &self.to_number,
        }
    }
}

/// Fields needed to insert a new session
#[derive(Debug, Clone)]
pub struct NewCallSession {
    pub tenant_id: String,
    pub direction: CallDirection,
    pub from_number: String,
    pub to_number: String,
    pub extension: Option<String>,
    pub agent_id: Option<String>,
    pub customer_id: Option<String>,
    pub recording_id: Option<i64>,
    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub transcript: Option<String>,
}

impl NewCallSession {
    /// A ringing session as the call-start webhook would create it
    pub fn ringing(
        tenant_id: impl Into<String>,
        direction: CallDirection,
        from_number: impl Into<String>,
        to_number: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            direction,
            from_number: from_number.into(),
            to_number: to_number.into(),
            extension: None,
            agent_id: None,
            customer_id: None,
            recording_id: None,
            status: CallStatus::Ringing,
            started_at,
            ended_at: None,
            duration_secs: None,
            transcript: None,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}
