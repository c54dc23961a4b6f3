/// Canonical form of a display name for case-insensitive deduplication.
pub(crate) fn normalize_name(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_lowercase()
}

/// Label with stray whitespace collapsed, ready for the domain `parse` helpers.
pub(crate) fn normalize_label(value: &str) -> String {
    value
        .replace(['\u{feff}', '\u{200b}'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
