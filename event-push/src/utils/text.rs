//! String helpers.

/// Truncate to `max_chars` characters, appending an ellipsis when cut.
pub fn truncate_string(input: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let mut iter = input.chars();
    let mut out: String = iter.by_ref().take(max_chars).collect();
    if iter.next().is_some() {
        out.push('…');
    }
    out
}

/// Short, log-safe form of a push token.
pub fn redact_token(token: &str) -> String {
    const VISIBLE: usize = 6;
    if token.chars().count() <= VISIBLE {
        return "***".to_string();
    }
    let prefix: String = token.chars().take(VISIBLE).collect();
    format!("{}***", prefix)
}
