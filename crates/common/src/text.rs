/// Truncate a string to at most `max_chars` characters, appending an
/// ellipsis when anything was cut. Counts characters, not bytes, so
/// multi-byte text is never split mid-codepoint.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        None => text.to_string(),
        Some((idx, _)) => format!("{}…", &text[..idx]),
    }
}
