//! Small, pure string helpers shared by the fetch and assembly stages.
//!
//! All lengths are counted in `char`s, never bytes, so truncation never splits a code point.

/// Marker appended to text that was cut short.
pub const ELLIPSIS: char = '…';

/// Bound `text` to at most `max_chars` characters.
///
/// - Text that already fits is returned unchanged.
/// - Otherwise the first `max_chars - 1` characters are kept, trailing whitespace is trimmed,
///   and a single [`ELLIPSIS`] is appended.
/// - `max_chars == 0` yields an empty string.
///
/// The output always fits the bound, so re-applying with the same or a larger bound is a no-op.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let head: String = text.chars().take(max_chars - 1).collect();
    let mut out = head.trim_end().to_string();
    out.push(ELLIPSIS);
    out
}

/// Display label for a URL: its network location (`host[:port]`).
///
/// Returns an empty string for anything that does not parse or has no host.
pub fn domain_of(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url.trim()) else {
        return String::new();
    };
    let Some(host) = parsed.host_str() else {
        return String::new();
    };
    match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}
