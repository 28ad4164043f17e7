//! Sanitizing of error messages carried in result records.

use crate::config::MAX_ERROR_MESSAGE_LENGTH;

/// Removes control characters (except tab, newline, carriage return).
pub fn sanitize_error_message(message: &str) -> String {
    message
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// Sanitizes a message and truncates it to `MAX_ERROR_MESSAGE_LENGTH` bytes on a char boundary.
pub fn truncate_message(message: &str) -> String {
    let sanitized = sanitize_error_message(message);
    if sanitized.len() <= MAX_ERROR_MESSAGE_LENGTH {
        return sanitized;
    }

    let mut cut = MAX_ERROR_MESSAGE_LENGTH.saturating_sub(50);
    while !sanitized.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}... (truncated, original length: {} chars)",
        &sanitized[..cut],
        sanitized.len()
    )
}
