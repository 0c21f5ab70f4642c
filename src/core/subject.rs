//! Ticket subjects and CRM note bodies.

use chrono::{DateTime, Utc};

use crate::domain::Sentiment;

/// Subjects longer than this are cut at a word boundary
pub const MAX_SUBJECT_CHARS: usize = 60;

/// Cleaned subjects shorter than this fall back to the request type
pub const MIN_SUBJECT_CHARS: usize = 10;

const FILLER_PREFIXES: &[&str] = &[
    "the caller ",
    "caller ",
    "the customer ",
    "customer ",
    "the client ",
    "client ",
    "is calling to ",
    "is calling about ",
    "was calling to ",
    "was calling about ",
    "calling to ",
    "calling about ",
    "called to ",
    "called about ",
    "called regarding ",
    "called in ",
    "wanted to ",
    "wants to ",
    "would like to ",
    "needs to ",
];

/// Ticket subject from a call summary
pub fn ticket_subject(summary: &str, request_type: Option<&str>) -> String {
    let cleaned = strip_fillers(first_sentence(summary));
    let cleaned = capitalize(cleaned.trim_end_matches(['.', '!', '?']));

    if cleaned.chars().count() < MIN_SUBJECT_CHARS {
        return match request_type.map(str::trim).filter(|t| !t.is_empty()) {
            Some(kind) => capitalize(kind),
            None => "Inbound call follow-up".to_string(),
        };
    }
    truncate_at_word(&cleaned, MAX_SUBJECT_CHARS)
}

/// Note body for an outbound call
pub fn compose_note(
    started_at: DateTime<Utc>,
    summary: &str,
    sentiment: Sentiment,
    agent_name: Option<&str>,
) -> String {
    let mut note = format!("Outbound call on {}\n\n", started_at.format("%Y-%m-%d at %H:%M UTC"));
    let summary = summary.trim();
    note.push_str(if summary.is_empty() {
        "No summary available."
    } else {
        summary
    });
    note.push_str(&format!(
        "\n\nSentiment: {} {}",
        sentiment.glyph(),
        sentiment.as_str()
    ));
    if let Some(agent) = agent_name {
        note.push_str(&format!("\nAgent: {}", agent));
    }
    note
}

fn first_sentence(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.find(['.', '!', '?']) {
        Some(i) => &trimmed[..=i],
        None => trimmed,
    }
}

fn strip_fillers(text: &str) -> &str {
    let mut rest = text.trim_start();
    loop {
        let lower = rest.to_lowercase();
        match FILLER_PREFIXES.iter().find(|p| lower.starts_with(*p)) {
            // Prefixes are ASCII, so byte length is the same in `rest`
            Some(prefix) => rest = rest[prefix.len()..].trim_start(),
            None => return rest,
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate_at_word(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max).collect();
    match head.rfind(' ') {
        Some(i) if i > 0 => head[..i].trim_end_matches([',', ';', ':']).to_string(),
        _ => head,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fillers_are_stripped_and_capitalized() {
        assert_eq!(
            ticket_subject("The caller wants to add a new driver to her policy. Also asked about rates.", None),
            "Add a new driver to her policy"
        );
        assert_eq!(
            ticket_subject("Customer called about a billing discrepancy on the last invoice", None),
            "A billing discrepancy on the last invoice"
        );
    }

    #[test]
    fn test_long_subject_cut_at_word_boundary() {
        let subject = ticket_subject(
            "Requesting a certificate of insurance for the commercial property lease renewal next month",
            None,
        );
        assert!(subject.chars().count() <= MAX_SUBJECT_CHARS);
        assert_eq!(subject, "Requesting a certificate of insurance for the commercial");
    }

    #[test]
    fn test_short_summary_falls_back_to_request_type() {
        assert_eq!(ticket_subject("Caller wants to.", Some("billing")), "Billing");
        assert_eq!(ticket_subject("", None), "Inbound call follow-up");
    }

    #[test]
    fn test_note_layout() {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 14, 5, 0).unwrap();
        let note = compose_note(at, "Confirmed renewal date.", Sentiment::Positive, Some("Sam"));
        assert!(note.starts_with("Outbound call on 2026-03-02 at 14:05 UTC"));
        assert!(note.contains("Confirmed renewal date."));
        assert!(note.contains("Sentiment: 😊 positive"));
        assert!(note.ends_with("Agent: Sam"));
    }
}
