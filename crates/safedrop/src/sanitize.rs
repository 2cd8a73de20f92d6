//! Helpers for sanitizing data before it enters tracing span attributes or
//! becomes part of a destination path.
//!
//! Logs are routinely shared when debugging a misfiled download, so spans
//! carry file names only, never the directory they came from.

use std::path::Path;

/// Characters that are not safe inside a single path segment on common filesystems.
const UNSAFE_SEGMENT_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Turns free text (a detected sender, a keyword) into a single safe
/// directory segment.
///
/// Unsafe characters become `_`, control characters are dropped, the result
/// is truncated to `max_chars` characters and trimmed. Returns `None` when
/// nothing usable is left or the segment would be `.`/`..`.
pub fn sanitize_segment(raw: &str, max_chars: usize) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control())
        .take(max_chars)
        .map(|c| if UNSAFE_SEGMENT_CHARS.contains(&c) { '_' } else { c })
        .collect();

    let trimmed = cleaned.trim().trim_end_matches('.').trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        return None;
    }

    Some(trimmed.to_string())
}
