//! Shapes of the Canvas payloads this crate consumes.
//!
//! Only the fields declared here are read; everything else Canvas sends is
//! dropped at deserialization.

use serde::Deserialize;

/// One card of `/dashboard/dashboard_cards`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasCourse {
    pub id: i64,
    #[serde(default)]
    pub long_name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub course_code: String,
    #[serde(default)]
    pub term: Option<String>,
}

/// `/courses/:id`, used only to locate the course's web page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CanvasCourseDetails {
    pub id: i64,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub course_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CanvasSubmission {
    #[serde(default)]
    pub workflow_state: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<String>,
}

impl CanvasSubmission {
    pub fn is_turned_in(&self) -> bool {
        matches!(self.workflow_state.as_deref(), Some("submitted" | "graded"))
            || self.submitted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CanvasAssignment {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub points_possible: Option<f64>,
    #[serde(default)]
    pub submission_types: Vec<String>,
    #[serde(default)]
    pub published: Option<bool>,
    #[serde(default)]
    pub workflow_state: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub is_quiz_assignment: Option<bool>,
    #[serde(default)]
    pub is_quiz_lti_assignment: Option<bool>,
    #[serde(default)]
    pub submission: Option<CanvasSubmission>,
}

impl CanvasAssignment {
    pub fn is_published(&self) -> bool {
        self.published == Some(true) && self.workflow_state.as_deref() == Some("published")
    }

    /// No submission expected and worth no points: reading or info items.
    pub fn is_optional(&self) -> bool {
        let no_submission = self.submission_types.len() == 1 && self.submission_types[0] == "none";
        no_submission && self.points_possible.is_none_or(|p| p == 0.0)
    }

    pub fn is_quiz_like(&self) -> bool {
        self.is_quiz_assignment == Some(true)
            || self.is_quiz_lti_assignment == Some(true)
            || self
                .submission_types
                .iter()
                .any(|t| t == "online_quiz" || t == "external_tool")
    }

    pub fn is_submitted(&self) -> bool {
        self.submission.as_ref().is_some_and(CanvasSubmission::is_turned_in)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
    PracticeQuiz,
    Assignment,
    GradedSurvey,
    Survey,
    #[serde(other)]
    Unknown,
}

impl QuizType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizType::PracticeQuiz => "practice_quiz",
            QuizType::Assignment => "assignment",
            QuizType::GradedSurvey => "graded_survey",
            QuizType::Survey => "survey",
            QuizType::Unknown => "quiz",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CanvasQuiz {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub quiz_type: QuizType,
    #[serde(default)]
    pub time_limit: Option<i64>,
    #[serde(default)]
    pub question_count: Option<i64>,
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub published: Option<bool>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl CanvasQuiz {
    /// Description used when the quiz has none of its own.
    pub fn summary(&self) -> String {
        let mut s = self.short_summary();
        if let Some(minutes) = self.time_limit.filter(|m| *m > 0) {
            s.push_str(&format!(", {minutes} minutes"));
        }
        s
    }

    /// Type and question count only.
    pub fn short_summary(&self) -> String {
        format!(
            "{} - {} questions",
            self.quiz_type.as_str(),
            self.question_count.unwrap_or(0)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CanvasModule {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub items: Option<Vec<CanvasModuleItem>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CompletionRequirement {
    #[serde(default)]
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContentDetails {
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub points_possible: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CanvasModuleItem {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub content_id: Option<i64>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub quiz_lti: Option<bool>,
    #[serde(default)]
    pub completion_requirement: Option<CompletionRequirement>,
    #[serde(default)]
    pub content_details: Option<ContentDetails>,
}

impl CanvasModuleItem {
    pub fn is_gradable(&self) -> bool {
        matches!(self.item_type.as_str(), "Assignment" | "Quiz")
    }

    pub fn is_quiz_like(&self) -> bool {
        self.item_type == "Quiz" || self.quiz_lti == Some(true)
    }

    pub fn inline_due_at(&self) -> Option<&str> {
        self.content_details.as_ref().and_then(|d| d.due_at.as_deref())
    }

    pub fn is_completed(&self) -> bool {
        self.completion_requirement
            .as_ref()
            .and_then(|r| r.completed)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CanvasPlannable {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Canvas sends `false` when there is nothing to report, otherwise an object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PlannerSubmissions {
    Flag(bool),
    Detail {
        #[serde(default)]
        submitted: Option<bool>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CanvasPlannerItem {
    #[serde(default)]
    pub context_type: Option<String>,
    #[serde(default)]
    pub context_name: Option<String>,
    pub plannable_type: String,
    pub plannable: CanvasPlannable,
    #[serde(default)]
    pub submissions: Option<PlannerSubmissions>,
}

impl CanvasPlannerItem {
    pub fn is_submitted(&self) -> bool {
        matches!(
            self.submissions,
            Some(PlannerSubmissions::Detail {
                submitted: Some(true)
            })
        )
    }
}
