use crate::credential::Credential;

pub const DIAGNOSTIC_LIMIT: usize = 1000;

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars.saturating_sub(1)).collect::<String>() + "…"
}

/// Response body made safe to show: credential removed, then capped.
pub fn diagnostic_body(body: &str, credential: &Credential) -> String {
    truncate_text(&credential.redact(body), DIAGNOSTIC_LIMIT)
}
