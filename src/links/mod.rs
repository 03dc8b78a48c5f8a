//! Canvas web-page URLs for locally stored courses and tasks.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static RE_API_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/api/?v?\d*/?$").unwrap());

/// A Canvas page URL. `confirmed` is true only when Canvas answered a check
/// for it; otherwise the URL was constructed and may not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanvasLink {
    pub url: String,
    pub confirmed: bool,
}

impl CanvasLink {
    pub fn confirmed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            confirmed: true,
        }
    }

    pub fn guessed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            confirmed: false,
        }
    }
}

/// Web root of a Canvas instance, from its API root.
///
/// `https://school.instructure.com/api/v1` -> `https://school.instructure.com`
pub fn web_base(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    RE_API_SUFFIX.replace(trimmed, "").into_owned()
}

/// Syllabus page under a course's own `html_url`.
pub fn syllabus_under(course_page: &str) -> String {
    format!("{}/assignments/syllabus", course_page.trim_end_matches('/'))
}

pub fn syllabus_fallback(api_url: &str, canvas_course_id: &str) -> String {
    format!(
        "{}/courses/{canvas_course_id}/assignments/syllabus",
        web_base(api_url)
    )
}

pub fn assignments_fallback(api_url: &str, canvas_course_id: &str) -> String {
    format!("{}/courses/{canvas_course_id}/assignments", web_base(api_url))
}
