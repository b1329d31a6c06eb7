//! Collision-resistant names for stored uploads.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Longest sanitized file name kept in a key.
const MAX_NAME_LEN: usize = 120;

/// Name used when nothing usable survives sanitizing.
const FALLBACK_NAME: &str = "upload";

/// Reduce a client-supplied file name to `[A-Za-z0-9._-]`.
///
/// Any directory part is dropped, other characters become `_`, and leading
/// dots are stripped so the result can never be a hidden or relative path.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    let truncated: String = trimmed.chars().take(MAX_NAME_LEN).collect();

    if truncated.trim_matches('_').is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        truncated
    }
}

/// `{unix_millis}-{8 hex chars}-{sanitized name}`.
pub fn upload_filename(original_name: &str, now: DateTime<Utc>) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        now.timestamp_millis(),
        &nonce[..8],
        sanitize_filename(original_name)
    )
}

/// A key is safe when it is one plain path component.
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}
