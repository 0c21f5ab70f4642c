//! Recordings fetched from the telephony platform.
//!
//! A recording is never stored as-is; it is reconciled into a call session and
//! a wrapup draft.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::call::CallDirection;
use super::phone;

/// One completed call recording from the telephony source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    /// Monotonically increasing source identifier
    pub id: i64,

    pub direction: CallDirection,
    pub from_number: String,
    pub to_number: String,

    /// Agent extension that handled the call
    #[serde(default)]
    pub extension: Option<String>,

    #[serde(default)]
    pub agent_name: Option<String>,

    pub started_at: DateTime<Utc>,

    #[serde(default)]
    pub duration_secs: Option<i64>,

    /// Whether the platform can ever produce a transcript for this recording
    #[serde(default)]
    pub can_transcribe: bool,

    /// Whether the transcript is available now
    #[serde(default)]
    pub transcribed: bool,

    #[serde(default)]
    pub transcript: Option<String>,

    /// Platform-generated summary, if any
    #[serde(default)]
    pub summary: Option<String>,
}

impl Recording {
    /// The number belonging to the outside party
    pub fn customer_number(&self) -> &str {
        match self.direction {
            CallDirection::Inbound => &self.from_number,
            CallDirection::Outbound => &self.to_number,
        }
    }

    /// Both legs are short internal extensions
    pub fn is_internal(&self) -> bool {
        phone::is_internal_extension(&self.from_number)
            && phone::is_internal_extension(&self.to_number)
    }

    /// Transcript text, empty when absent
    pub fn transcript_text(&self) -> &str {
        self.transcript.as_deref().unwrap_or("")
    }

    /// When the call ended, if the duration is known
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.duration_secs
            .map(|secs| self.started_at + chrono::Duration::seconds(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(from: &str, to: &str, direction: CallDirection) -> Recording {
        Recording {
            id: 1,
            direction,
            from_number: from.to_string(),
            to_number: to.to_string(),
            extension: None,
            agent_name: None,
            started_at: Utc::now(),
            duration_secs: Some(90),
            can_transcribe: true,
            transcribed: true,
            transcript: None,
            summary: None,
        }
    }

    #[test]
    fn test_customer_number_follows_direction() {
        let inbound = recording("5551234567", "101", CallDirection::Inbound);
        assert_eq!(inbound.customer_number(), "5551234567");

        let outbound = recording("101", "5551234567", CallDirection::Outbound);
        assert_eq!(outbound.customer_number(), "5551234567");
    }

    #[test]
    fn test_internal_detection() {
        assert!(recording("1001", "1002", CallDirection::Inbound).is_internal());
        assert!(!recording("5551234567", "1002", CallDirection::Inbound).is_internal());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
            "id": 42,
            "direction": "inbound",
            "from_number": "+15551234567",
            "to_number": "101",
            "started_at": "2026-01-05T15:00:00Z"
        }"#;
        let rec: Recording = serde_json::from_str(json).unwrap();
        assert_eq!(rec.id, 42);
        assert!(!rec.can_transcribe);
        assert_eq!(rec.transcript_text(), "");
        assert!(rec.ended_at().is_none());
    }
}
