use std::sync::LazyLock;

use regex::Regex;

static RE_TERM_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\([^)]*\)\s*").unwrap());
static RE_SECTION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(\d+\)\s*$").unwrap());
static RE_CODE_IN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]{2,6}\s?\d{4})").unwrap());
static RE_CODE_IN_SIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]{2,6}\d{4})").unwrap());

/// Display name for a Canvas course: the short name (long name when empty)
/// without a leading `(25FS-Full)` term tag or trailing `(001)` section.
pub fn clean_course_name(short_name: &str, long_name: &str) -> String {
    let raw = if short_name.is_empty() { long_name } else { short_name };
    let without_term = RE_TERM_PREFIX.replace(raw, "");
    RE_SECTION_SUFFIX.replace(&without_term, "").trim().to_string()
}

/// Course code such as `CS 2028` or `MATH1061`, taken from the display name
/// first and then from the second `_`-separated part of the Canvas code.
/// Returns `"N/A"` when neither carries one.
pub fn extract_course_code(course_name: &str, course_code: &str) -> String {
    if let Some(m) = RE_CODE_IN_NAME.captures(course_name).and_then(|c| c.get(1)) {
        return m.as_str().to_string();
    }
    course_code
        .split('_')
        .nth(1)
        .and_then(|part| RE_CODE_IN_SIS.captures(part))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "N/A".to_string())
}
