//! Durable pairing records for after-hours email + voicemail merges.
//!
//! The first half of a pair is persisted as `awaiting_pair`; the second half
//! arriving for the same phone inside the time box flips it to `matched`.
//! Records nobody claims are swept to `expired`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which channel produced a merge half
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeSource {
    Email,
    Voicemail,
}

impl MergeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Voicemail => "voicemail",
        }
    }

    /// The source this one pairs with
    pub fn counterpart(&self) -> Self {
        match self {
            Self::Email => Self::Voicemail,
            Self::Voicemail => Self::Email,
        }
    }
}

impl FromStr for MergeSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "voicemail" => Ok(Self::Voicemail),
            other => anyhow::bail!("Unknown merge source: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    AwaitingPair,
    Matched,
    Expired,
}

impl MergeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingPair => "awaiting_pair",
            Self::Matched => "matched",
            Self::Expired => "expired",
        }
    }
}

impl FromStr for MergeStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_pair" => Ok(Self::AwaitingPair),
            "matched" => Ok(Self::Matched),
            "expired" => Ok(Self::Expired),
            other => anyhow::bail!("Unknown merge status: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRecord {
    pub id: String,
    pub tenant_id: String,
    pub phone_digits: String,
    pub source: MergeSource,
    pub payload: serde_json::Value,
    pub status: MergeStatus,
    pub matched_with: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
