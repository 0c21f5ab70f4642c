//! Transcription readiness of a fetched recording.

use chrono::{DateTime, Duration, Utc};

use crate::domain::Recording;

/// What the poller should do with a recording this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Platform will never transcribe it; skip and advance past it
    NeverTranscribable,

    /// Waited too long for a transcript; skip and advance past it
    Abandoned,

    /// Transcript still pending; skip without advancing the watermark
    Waiting,

    /// Transcript available; process it
    Ready,
}

impl Readiness {
    pub fn classify(recording: &Recording, now: DateTime<Utc>, max_wait: Duration) -> Self {
        if recording.transcribed {
            return Self::Ready;
        }
        if !recording.can_transcribe {
            return Self::NeverTranscribable;
        }
        if now - recording.started_at > max_wait {
            Self::Abandoned
        } else {
            Self::Waiting
        }
    }

    /// Whether the watermark may move past this recording
    pub fn advances_watermark(&self) -> bool {
        !matches!(self, Self::Waiting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeverTranscribable => "never_transcribable",
            Self::Abandoned => "abandoned",
            Self::Waiting => "waiting",
            Self::Ready => "ready",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CallDirection;

    fn recording(can: bool, done: bool, age: Duration) -> Recording {
        Recording {
            id: 1,
            direction: CallDirection::Inbound,
            from_number: "5551234567".to_string(),
            to_number: "101".to_string(),
            extension: None,
            agent_name: None,
            started_at: Utc::now() - age,
            duration_secs: Some(60),
            can_transcribe: can,
            transcribed: done,
            transcript: None,
            summary: None,
        }
    }

    #[test]
    fn test_classification() {
        let now = Utc::now();
        let wait = Duration::hours(24);

        assert_eq!(
            Readiness::classify(&recording(true, true, Duration::minutes(3)), now, wait),
            Readiness::Ready
        );
        assert_eq!(
            Readiness::classify(&recording(false, false, Duration::minutes(3)), now, wait),
            Readiness::NeverTranscribable
        );
        assert_eq!(
            Readiness::classify(&recording(true, false, Duration::hours(2)), now, wait),
            Readiness::Waiting
        );
        assert_eq!(
            Readiness::classify(&recording(true, false, Duration::hours(25)), now, wait),
            Readiness::Abandoned
        );
    }

    #[test]
    fn test_only_waiting_holds_watermark() {
        assert!(!Readiness::Waiting.advances_watermark());
        assert!(Readiness::Abandoned.advances_watermark());
        assert!(Readiness::NeverTranscribable.advances_watermark());
        assert!(Readiness::Ready.advances_watermark());
    }
}
