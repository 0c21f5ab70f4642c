//! Output of the transcript analyzer.

use serde::{Deserialize, Serialize};

/// Overall tone of the conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }

    /// Glyph shown in CRM notes
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Positive => "😊",
            Self::Neutral => "😐",
            Self::Negative => "😟",
        }
    }
}

/// Customer details pulled out of the conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub policy_number: Option<String>,
}

/// Structured signal extracted from a transcript
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub sentiment: Sentiment,

    #[serde(default)]
    pub action_items: Vec<String>,

    #[serde(default)]
    pub entities: ExtractedEntities,

    /// Caller hung up before any real conversation
    #[serde(default)]
    pub is_hangup: bool,

    /// Classified request type (e.g. "billing", "policy change")
    #[serde(default)]
    pub request_type: Option<String>,
}

impl Analysis {
    /// Reduced-fidelity analysis built from the raw recording fields only.
    ///
    /// Used when no analyzer is configured or the analyzer call failed.
    pub fn fallback(transcript: &str, platform_summary: Option<&str>) -> Self {
        let summary = platform_summary
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| first_sentence(transcript, 200));

        Self {
            summary,
            ..Default::default()
        }
    }
}

/// First sentence of `text`, capped at `max_chars` characters
fn first_sentence(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let end = trimmed
        .find(|c| matches!(c, '.' | '!' | '?'))
        .map(|i| i + 1)
        .unwrap_or(trimmed.len());
    trimmed[..end].chars().take(max_chars).collect()
}
