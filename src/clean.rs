//! Cell text cleanup and capacity coercion.

/// Strip the decorations Wikipedia leaves in table cells: whitespace,
/// the bare `&nbsp` escape, the record-holder diamond, footnote
/// brackets, a trailing " (formerly)" clause, and embedded newlines.
///
/// Only the opening `[` is removed here, so a footnote like `[12]`
/// leaves `12]` behind in text fields; the capacity coercer strips the
/// remainder on its own.
///
/// Running this twice yields the same result as once.
pub fn clean_text(text: &str) -> String {
    let text = text.trim();
    let text = text.replace("&nbsp", "");
    let text = text.replace(" ♦", "");
    let text = text.replace('[', "");
    let text = match text.split_once(" (formerly)") {
        Some((current, _)) => current.to_string(),
        None => text,
    };
    text.replace('\n', "")
}

/// Coerce cleaned capacity text to an integer.
///
/// Thousands separators (both `,` and `.` in this table), bracket
/// characters, and whitespace are stripped before parsing; brackets are
/// stripped again here independently of `clean_text`, so a value that
/// skipped normalization still parses. The leading digit run is taken,
/// so residual footnote text after the number does not discard an
/// otherwise good value. Anything without a digit prefix becomes `None`
/// rather than failing the batch.
pub fn coerce_capacity(text: &str) -> Option<u32> {
    let stripped: String = text
        .chars()
        .filter(|&c| !matches!(c, ',' | '.' | '[' | ']') && !c.is_whitespace())
        .collect();
    let digits: String = stripped.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
