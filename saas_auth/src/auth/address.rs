//! Email address validation and normalization.

use validator::ValidateEmail;

/// Maximum accepted email length
pub const MAX_EMAIL_CHARS: usize = 254;

/// Syntax check on the trimmed address.
pub fn is_valid_email(email: &str) -> bool {
    let trimmed = email.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= MAX_EMAIL_CHARS && trimmed.validate_email()
}

/// Canonical form used as the lookup key: trimmed, lowercased, with the
/// domain converted to its ASCII (punycode) form. Returns `None` for blank input.
///
/// Sub-addressing separators (`+tag`) are kept as-is.
pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return None;
    }

    let Some(at) = email.rfind('@') else {
        return Some(email);
    };
    let (local, domain) = (&email[..at], &email[at + 1..]);
    let domain = idna::domain_to_ascii(domain).unwrap_or_else(|_| domain.to_string());

    Some(format!("{}@{}", local, domain))
}
