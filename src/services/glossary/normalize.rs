/// Lookup form of a field name: trimmed, lower-case, inner whitespace collapsed.
pub fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
