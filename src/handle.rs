pub const MIN_HANDLE_LEN: usize = 3;
pub const MAX_HANDLE_LEN: usize = 20;

/// Canonical form of a user-supplied handle: trimmed, leading `@` removed, lowercased.
pub fn normalize_handle(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('@')
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}

/// A valid handle is 3-20 chars of lowercase ASCII letters, digits, or underscore.
pub fn is_valid_handle(handle: &str) -> bool {
    (MIN_HANDLE_LEN..=MAX_HANDLE_LEN).contains(&handle.len())
        && handle
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
