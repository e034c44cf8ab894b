use std::time::{SystemTime, UNIX_EPOCH};

/// Shortened identity key for log fields.
pub fn uid_prefix(uid: &str) -> &str {
    match uid.char_indices().nth(12) {
        Some((idx, _)) => &uid[..idx],
        None => uid,
    }
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
