//! Auto-void classification.
//!
//! Rules, first match wins:
//! 1. Analyzer flagged a hangup, or duration under the short-call threshold
//! 2. A call leg is a known sentinel (test / playback) number
//! 3. Both legs are short internal extensions
//! 4. No meaningful summary and a transcript under the minimum length
//!
//! Under the `conservative` policy a call is only voided when its transcript
//! is empty or too short *and* no CRM identity was found; the reason is then
//! the first rule that fired, or `no_content`. Anything with a transcript or a
//! CRM match goes to human review.

use serde::{Deserialize, Serialize};

use crate::domain::{phone, VoidReason};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoidPolicy {
    #[default]
    Conservative,
    Heuristic,
}

/// Auto-void thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoidRules {
    /// Calls shorter than this are short calls (default: 35s)
    #[serde(default = "default_short_call")]
    pub short_call_seconds: i64,

    /// Transcripts shorter than this carry no content (default: 20 chars)
    #[serde(default = "default_min_transcript")]
    pub min_transcript_chars: usize,

    /// Numbers that never belong to a real customer
    #[serde(default)]
    pub sentinel_numbers: Vec<String>,

    #[serde(default)]
    pub policy: VoidPolicy,
}

fn default_short_call() -> i64 {
    35
}
fn default_min_transcript() -> usize {
    20
}

impl Default for VoidRules {
    fn default() -> Self {
        Self {
            short_call_seconds: default_short_call(),
            min_transcript_chars: default_min_transcript(),
            sentinel_numbers: Vec::new(),
            policy: VoidPolicy::default(),
        }
    }
}

/// Everything the classifier looks at
#[derive(Debug, Clone)]
pub struct VoidInput<'a> {
    pub duration_secs: Option<i64>,
    pub transcript: &'a str,
    pub summary: &'a str,
    pub is_hangup: bool,
    pub from_number: &'a str,
    pub to_number: &'a str,

    /// At least one CRM candidate exists for the caller
    pub has_crm_match: bool,
}

impl VoidRules {
    /// `Some(reason)` when the call should be voided
    pub fn classify(&self, input: &VoidInput<'_>) -> Option<VoidReason> {
        let fired = self.first_rule(input);
        match self.policy {
            VoidPolicy::Heuristic => fired,
            VoidPolicy::Conservative => {
                if self.transcript_too_short(input.transcript) && !input.has_crm_match {
                    Some(fired.unwrap_or(VoidReason::NoContent))
                } else {
                    None
                }
            }
        }
    }

    fn first_rule(&self, input: &VoidInput<'_>) -> Option<VoidReason> {
        if input.is_hangup {
            return Some(VoidReason::Hangup);
        }
        if matches!(input.duration_secs, Some(d) if d < self.short_call_seconds) {
            return Some(VoidReason::ShortCall);
        }
        if self.is_sentinel(input.from_number) || self.is_sentinel(input.to_number) {
            return Some(VoidReason::Playfile);
        }
        if phone::is_internal_extension(input.from_number)
            && phone::is_internal_extension(input.to_number)
        {
            return Some(VoidReason::InternalCall);
        }
        if input.summary.trim().is_empty() && self.transcript_too_short(input.transcript) {
            return Some(VoidReason::NoContent);
        }
        None
    }

    fn transcript_too_short(&self, transcript: &str) -> bool {
        transcript.trim().chars().count() < self.min_transcript_chars
    }

    fn is_sentinel(&self, number: &str) -> bool {
        self.sentinel_numbers
            .iter()
            .any(|s| phone::same_number(s, number))
    }
}
