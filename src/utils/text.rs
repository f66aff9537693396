//! Text normalization applied before billing and synthesis

use once_cell::sync::Lazy;
use regex::Regex;

static HORIZONTAL_WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t\r\f\v]+").expect("invalid whitespace regex"));

static REPEATED_NEWLINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("invalid newline regex"));

/// Normalize request text: collapse runs of whitespace, strip control
/// characters and trim. Newlines are preserved (they carry prosody for some
/// engines) but capped at two in a row. Character counts for billing and
/// limits are taken from the normalized text.
pub fn normalize_text(text: &str) -> String {
    let without_controls: String = text
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    let collapsed = HORIZONTAL_WHITESPACE.replace_all(&without_controls, " ");
    let collapsed = REPEATED_NEWLINES.replace_all(&collapsed, "\n\n");
    collapsed.trim().to_string()
}
