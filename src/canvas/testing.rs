//! Scripted in-memory Canvas used by the sync tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;

use super::dto::*;
use super::LmsClient;
use crate::error::{Error, Result};

#[derive(Default)]
pub(crate) struct FakeState {
    pub courses: Vec<CanvasCourse>,
    pub courses_status: Option<u16>,
    /// Tokens answered with 401 on every courses call.
    pub rejected_tokens: HashSet<String>,
    pub assignments: HashMap<i64, Vec<CanvasAssignment>>,
    /// Courses whose assignment listing errors instead of returning data.
    pub failing_assignments: HashSet<i64>,
    pub quizzes: HashMap<i64, Vec<CanvasQuiz>>,
    pub modules: HashMap<i64, Vec<CanvasModule>>,
    pub modules_status: Option<u16>,
    pub single_assignments: HashMap<i64, CanvasAssignment>,
    pub planner: Vec<CanvasPlannerItem>,
    pub details: HashMap<String, CanvasCourseDetails>,
    pub live_pages: HashSet<String>,
    pub calls: Vec<String>,
}

#[derive(Default)]
pub(crate) struct FakeLmsClient {
    state: Mutex<FakeState>,
}

impl FakeLmsClient {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }
}

#[async_trait]
impl LmsClient for FakeLmsClient {
    async fn courses(&self, token: &str) -> Result<Vec<CanvasCourse>> {
        self.record(format!("courses:{token}"));
        let state = self.state();
        if state.rejected_tokens.contains(token) {
            return Err(Error::Api {
                status: 401,
                message: "Unauthorized".into(),
            });
        }
        if let Some(status) = state.courses_status {
            return Err(Error::Api {
                status,
                message: "scripted failure".into(),
            });
        }
        Ok(super::filter_dashboard_courses(state.courses.clone()))
    }

    async fn assignments(&self, _token: &str, course_id: i64) -> Result<Vec<CanvasAssignment>> {
        self.record(format!("assignments:{course_id}"));
        let state = self.state();
        if state.failing_assignments.contains(&course_id) {
            return Err(Error::Decode(format!("course {course_id} exploded")));
        }
        let all = state.assignments.get(&course_id).cloned().unwrap_or_default();
        Ok(super::dedup_published_assignments(all))
    }

    async fn quizzes(&self, _token: &str, course_id: i64) -> Result<Vec<CanvasQuiz>> {
        self.record(format!("quizzes:{course_id}"));
        let all = self.state().quizzes.get(&course_id).cloned().unwrap_or_default();
        Ok(super::published_quizzes(all))
    }

    async fn modules(&self, _token: &str, course_id: i64) -> Result<Vec<CanvasModule>> {
        self.record(format!("modules:{course_id}"));
        let state = self.state();
        if let Some(status) = state.modules_status {
            return Err(Error::Api {
                status,
                message: "scripted failure".into(),
            });
        }
        Ok(state.modules.get(&course_id).cloned().unwrap_or_default())
    }

    async fn assignment(
        &self,
        _token: &str,
        course_id: i64,
        assignment_id: i64,
    ) -> Option<CanvasAssignment> {
        self.record(format!("assignment:{course_id}:{assignment_id}"));
        self.state().single_assignments.get(&assignment_id).cloned()
    }

    async fn planner_items(
        &self,
        _token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CanvasPlannerItem>> {
        self.record(format!("planner:{start}:{end}"));
        Ok(super::planner_assignments(self.state().planner.clone()))
    }

    async fn course_details(&self, _token: &str, course_id: &str) -> Result<CanvasCourseDetails> {
        self.record(format!("course:{course_id}"));
        self.state()
            .details
            .get(course_id)
            .cloned()
            .ok_or_else(|| Error::Api {
                status: 404,
                message: "Not Found".into(),
            })
    }

    async fn page_exists(&self, _token: &str, url: &str) -> bool {
        self.record(format!("head:{url}"));
        self.state().live_pages.contains(url)
    }
}

pub(crate) fn course(id: i64, short_name: &str) -> CanvasCourse {
    serde_json::from_value(json!({
        "id": id,
        "shortName": short_name,
        "longName": short_name,
        "courseCode": format!("25FS_CS{id:04}_001"),
        "term": "Fall 2025"
    }))
    .unwrap()
}

pub(crate) fn assignment(
    id: i64,
    name: &str,
    due_at: Option<&str>,
    types: &[&str],
) -> CanvasAssignment {
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "description": format!("<p>{name}</p>"),
        "due_at": due_at,
        "points_possible": 10.0,
        "submission_types": types,
        "published": true,
        "workflow_state": "published",
        "html_url": format!("https://canvas.example.edu/courses/1/assignments/{id}")
    }))
    .unwrap()
}

pub(crate) fn quiz(id: i64, title: &str, quiz_type: &str, due_at: Option<&str>) -> CanvasQuiz {
    serde_json::from_value(json!({
        "id": id,
        "title": title,
        "quiz_type": quiz_type,
        "question_count": 10,
        "time_limit": 30,
        "due_at": due_at,
        "published": true
    }))
    .unwrap()
}

pub(crate) fn planner_item(
    title: &str,
    course: &str,
    due_at: &str,
    submitted: bool,
) -> CanvasPlannerItem {
    serde_json::from_value(json!({
        "context_type": "Course",
        "context_name": course,
        "plannable_type": "assignment",
        "plannable": {"id": 900, "title": title, "due_at": due_at},
        "submissions": {"submitted": submitted}
    }))
    .unwrap()
}
