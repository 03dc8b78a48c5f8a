pub mod dto;
pub mod names;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::LINK;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

pub use dto::{
    CanvasAssignment, CanvasCourse, CanvasCourseDetails, CanvasModule, CanvasModuleItem,
    CanvasPlannerItem, CanvasQuiz,
};

/// Upper bound on `Link: rel="next"` pages followed for one listing.
const MAX_PAGES: usize = 50;

/// Read access to the Canvas resources the sync engine consumes.
///
/// Every call carries the per-user bearer token. Implementations do no
/// caching; deciding when to call is the orchestrator's job.
#[async_trait]
pub trait LmsClient: Send + Sync {
    /// Active dashboard courses, without term-less and "Communities" cards.
    async fn courses(&self, token: &str) -> Result<Vec<CanvasCourse>>;

    /// Published assignments of a course, one entry per assignment id.
    /// A failing request yields an empty list.
    async fn assignments(&self, token: &str, course_id: i64) -> Result<Vec<CanvasAssignment>>;

    /// Published quizzes of a course. A failing request yields an empty list.
    async fn quizzes(&self, token: &str, course_id: i64) -> Result<Vec<CanvasQuiz>>;

    /// Modules with their items and content details. Failures propagate.
    async fn modules(&self, token: &str, course_id: i64) -> Result<Vec<CanvasModule>>;

    /// A single assignment, or `None` when it cannot be fetched.
    async fn assignment(
        &self,
        token: &str,
        course_id: i64,
        assignment_id: i64,
    ) -> Option<CanvasAssignment>;

    /// Dated assignment planner items between `start` and `end`.
    async fn planner_items(
        &self,
        token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CanvasPlannerItem>>;

    async fn course_details(&self, token: &str, course_id: &str) -> Result<CanvasCourseDetails>;

    /// Whether `url` answers a HEAD request with a 2xx status.
    async fn page_exists(&self, token: &str, url: &str) -> bool;
}

/// `LmsClient` over the Canvas REST API.
pub struct HttpLmsClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpLmsClient {
    /// `base_url` is the API root, e.g. `https://school.instructure.com/api/v1`.
    pub fn new(base_url: &str) -> Result<Self> {
        url::Url::parse(base_url).map_err(|e| Error::Config(format!("invalid Canvas URL: {e}")))?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("canvasdash/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request_url(&self, path: &str, query: &[(&str, &str)]) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint(path))
            .map_err(|e| Error::UrlParse(format!("{path}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().copied());
        }
        Ok(url)
    }

    async fn send(&self, token: &str, url: url::Url) -> Result<reqwest::Response> {
        let response = self.http.get(url.clone()).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = status.canonical_reason().unwrap_or("request failed").to_string();
            log::debug!("GET {url} -> {status}");
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.request_url(path, query)?;
        let body = self.send(token, url).await?.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::Decode(format!("{path}: {e}")))
    }

    /// Fetch a listing and every page linked from it.
    async fn get_all<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut items: Vec<T> = Vec::new();
        let mut url = self.request_url(path, query)?;
        for _ in 0..MAX_PAGES {
            let response = self.send(token, url).await?;
            let next = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_page_url);
            let body = response.text().await?;
            let page: Vec<T> =
                serde_json::from_str(&body).map_err(|e| Error::Decode(format!("{path}: {e}")))?;
            items.extend(page);
            match next {
                // The next link already carries the full query string.
                Some(next) => {
                    url = url::Url::parse(&next)
                        .map_err(|e| Error::UrlParse(format!("{next}: {e}")))?;
                }
                None => return Ok(items),
            }
        }
        log::warn!("Stopped following pages of {path} after {MAX_PAGES}");
        Ok(items)
    }
}

#[async_trait]
impl LmsClient for HttpLmsClient {
    async fn courses(&self, token: &str) -> Result<Vec<CanvasCourse>> {
        let cards: Vec<CanvasCourse> = self
            .get(token, "dashboard/dashboard_cards", &[("enrollmentState", "active")])
            .await?;
        Ok(filter_dashboard_courses(cards))
    }

    async fn assignments(&self, token: &str, course_id: i64) -> Result<Vec<CanvasAssignment>> {
        let path = format!("courses/{course_id}/assignments");
        let query = [
            ("include[]", "submission"),
            ("include[]", "overrides"),
            ("include[]", "all_dates"),
            ("per_page", "100"),
        ];
        match self.get_all::<CanvasAssignment>(token, &path, &query).await {
            Ok(all) => {
                let unique = dedup_published_assignments(all);
                log::debug!("Course {course_id}: {} published assignments", unique.len());
                Ok(unique)
            }
            Err(e) => {
                log::warn!("Failed to fetch assignments for course {course_id}: {e}");
                Ok(Vec::new())
            }
        }
    }

    async fn quizzes(&self, token: &str, course_id: i64) -> Result<Vec<CanvasQuiz>> {
        let path = format!("courses/{course_id}/quizzes");
        match self
            .get_all::<CanvasQuiz>(token, &path, &[("per_page", "100")])
            .await
        {
            Ok(all) => Ok(published_quizzes(all)),
            Err(e) => {
                log::warn!("Failed to fetch quizzes for course {course_id}: {e}");
                Ok(Vec::new())
            }
        }
    }

    async fn modules(&self, token: &str, course_id: i64) -> Result<Vec<CanvasModule>> {
        let path = format!("courses/{course_id}/modules");
        let query = [
            ("include[]", "items"),
            ("include[]", "content_details"),
            ("per_page", "100"),
        ];
        self.get_all(token, &path, &query).await
    }

    async fn assignment(
        &self,
        token: &str,
        course_id: i64,
        assignment_id: i64,
    ) -> Option<CanvasAssignment> {
        let path = format!("courses/{course_id}/assignments/{assignment_id}");
        match self.get(token, &path, &[]).await {
            Ok(a) => Some(a),
            Err(e) => {
                log::warn!("Failed to fetch assignment {assignment_id}: {e}");
                None
            }
        }
    }

    async fn planner_items(
        &self,
        token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CanvasPlannerItem>> {
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        let variants: [Vec<(&str, &str)>; 2] = [
            vec![("start_date", start.as_str()), ("end_date", end.as_str())],
            vec![
                ("start_date", start.as_str()),
                ("end_date", end.as_str()),
                ("context_codes[]", "course"),
                ("filter", "new_activity"),
            ],
        ];

        let mut last_error = None;
        for query in &variants {
            match self.get_all::<CanvasPlannerItem>(token, "planner/items", query).await {
                Ok(items) => {
                    let total = items.len();
                    let dated = planner_assignments(items);
                    log::debug!(
                        "Planner returned {total} items, {} dated assignments",
                        dated.len()
                    );
                    return Ok(dated);
                }
                Err(e) => {
                    log::warn!("Planner variant {query:?} failed: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Decode("no planner endpoint attempted".into())))
    }

    async fn course_details(&self, token: &str, course_id: &str) -> Result<CanvasCourseDetails> {
        self.get(token, &format!("courses/{course_id}"), &[]).await
    }

    async fn page_exists(&self, token: &str, url: &str) -> bool {
        match self.http.head(url).bearer_auth(token).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                log::debug!("HEAD {url} failed: {e}");
                false
            }
        }
    }
}

/// Drop cards with no term and Canvas' "Communities" pseudo-courses.
pub fn filter_dashboard_courses(cards: Vec<CanvasCourse>) -> Vec<CanvasCourse> {
    cards
        .into_iter()
        .filter(|c| matches!(c.term.as_deref(), Some(term) if term != "Communities"))
        .collect()
}

/// Keep published assignments, one per id. A later duplicate replaces the
/// earlier one but keeps its position.
pub fn dedup_published_assignments(all: Vec<CanvasAssignment>) -> Vec<CanvasAssignment> {
    let mut index: HashMap<i64, usize> = HashMap::new();
    let mut unique: Vec<CanvasAssignment> = Vec::new();
    for assignment in all.into_iter().filter(CanvasAssignment::is_published) {
        match index.get(&assignment.id) {
            Some(&i) => unique[i] = assignment,
            None => {
                index.insert(assignment.id, unique.len());
                unique.push(assignment);
            }
        }
    }
    unique
}

pub fn published_quizzes(all: Vec<CanvasQuiz>) -> Vec<CanvasQuiz> {
    all.into_iter().filter(|q| q.published == Some(true)).collect()
}

/// Planner entries that are assignments with a due date.
pub fn planner_assignments(items: Vec<CanvasPlannerItem>) -> Vec<CanvasPlannerItem> {
    items
        .into_iter()
        .filter(|i| i.plannable_type == "assignment" && i.plannable.due_at.is_some())
        .collect()
}

/// Extract the `rel="next"` target of an RFC 8288 `Link` header.
pub fn next_page_url(link_header: &str) -> Option<String> {
    link_header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}
