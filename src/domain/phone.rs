//! Phone number normalization.
//!
//! Telephony and CRM systems format numbers differently (`+1 (555) 123-4567`,
//! `5551234567`, `15551234567`). Matching compares the last ten digits only.

/// Longest digit string still treated as an internal extension
pub const INTERNAL_EXTENSION_MAX_DIGITS: usize = 5;

/// Digits compared when matching a caller to a customer
pub const MATCH_DIGITS: usize = 10;

/// Strip everything but ASCII digits
pub fn digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Last ten digits of a number (fewer if the number is shorter)
pub fn normalize(raw: &str) -> String {
    let d = digits(raw);
    if d.len() > 10 {
        d[d.len() - 10..].to_string()
    } else {
        d
    }
}

/// Key for customer matching: the last ten digits, or `None` when the
/// number is too short to identify anyone
pub fn match_key(raw: &str) -> Option<String> {
    let key = normalize(raw);
    (key.len() == MATCH_DIGITS).then_some(key)
}

/// True for short internal extensions such as `101` or `2045`
pub fn is_internal_extension(raw: &str) -> bool {
    let d = digits(raw);
    !d.is_empty() && d.len() <= INTERNAL_EXTENSION_MAX_DIGITS
}

/// True when two raw numbers refer to the same line
pub fn same_number(a: &str, b: &str) -> bool {
    let (a, b) = (normalize(a), normalize(b));
    !a.is_empty() && a == b
}
