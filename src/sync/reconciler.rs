//! Matching fetched Canvas items against stored tasks.
//!
//! Every source (course assignments, quizzes, module items, planner entries)
//! is first mapped into a [`SyncItem`]. The [`Reconciler`] then looks each
//! item up by its natural key and inserts or refreshes the task. Items are
//! written one at a time; a failure on one item leaves earlier writes in
//! place.

use std::sync::Arc;

use rusqlite::Connection;

use crate::canvas::dto::QuizType;
use crate::canvas::{CanvasAssignment, CanvasModuleItem, CanvasPlannerItem, CanvasQuiz};
use crate::date_util::{normalize_due, ClientZone, DueStamp};
use crate::error::Result;
use crate::model::{NewTask, Priority, TaskType};
use crate::storage::repository::{self, SyncedColumns};
use crate::storage::Database;
use crate::sync::ReconcileOutcome;

/// Which Canvas listing an item came from. Decides which columns a later
/// sync may overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemSource {
    Assignment,
    Quiz,
    ModuleItem,
    Planner,
}

impl ItemSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemSource::Assignment => "assignment",
            ItemSource::Quiz => "quiz",
            ItemSource::ModuleItem => "module",
            ItemSource::Planner => "planner",
        }
    }

    /// Columns refreshed on a task that already exists. Title, course and
    /// priority are never touched; description only by quiz and module items.
    pub fn update_columns(&self, item: &SyncItem, due: &DueStamp) -> SyncedColumns {
        let mut columns = SyncedColumns {
            due_date: Some(due.date_string()),
            due_time: Some(due.time_string()),
            ..Default::default()
        };
        match self {
            ItemSource::Assignment => {
                columns.task_type = Some(item.task_type);
                columns.submitted = Some(item.submitted);
                columns.completed = Some(item.completed);
            }
            ItemSource::Quiz => {
                columns.description = Some(item.refreshed_description.clone());
            }
            ItemSource::ModuleItem => {
                columns.description = Some(item.refreshed_description.clone());
                columns.task_type = Some(item.task_type);
                columns.completed = Some(item.completed);
            }
            ItemSource::Planner => {
                columns.submitted = Some(item.submitted);
                columns.completed = Some(item.completed);
            }
        }
        columns
    }
}

/// A fetched item in the shape every source converges on.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncItem {
    pub source: ItemSource,
    pub title: String,
    pub course: Option<String>,
    /// Raw Canvas timestamp, normalized at write time.
    pub due_at: String,
    pub task_type: TaskType,
    pub description: Option<String>,
    /// Description written over a stored task's by sources that refresh it.
    pub refreshed_description: Option<String>,
    pub priority: Priority,
    pub submitted: bool,
    pub completed: bool,
}

fn course_label(course: &str) -> Option<String> {
    Some(course.to_string()).filter(|c| !c.is_empty())
}

impl SyncItem {
    /// `None` for undated and optional (no submission, no points) assignments.
    pub fn from_assignment(assignment: &CanvasAssignment, course: &str) -> Option<Self> {
        let due_at = assignment.due_at.clone()?;
        if assignment.is_optional() {
            return None;
        }
        let submitted = assignment.is_submitted();
        Some(Self {
            source: ItemSource::Assignment,
            title: assignment.name.clone(),
            course: course_label(course),
            due_at,
            task_type: if assignment.is_quiz_like() {
                TaskType::Exam
            } else {
                TaskType::Assignment
            },
            description: assignment.description.clone(),
            refreshed_description: None,
            priority: Priority::Medium,
            submitted,
            completed: submitted,
        })
    }

    /// `None` for practice quizzes and undated quizzes.
    pub fn from_quiz(quiz: &CanvasQuiz, course: &str) -> Option<Self> {
        if quiz.quiz_type == QuizType::PracticeQuiz {
            return None;
        }
        let due_at = quiz.due_at.clone()?;
        let own = quiz.description.clone().filter(|d| !d.is_empty());
        let description = own.clone().unwrap_or_else(|| quiz.summary());
        // A refresh writes the summary without the time limit.
        let refreshed = own.unwrap_or_else(|| quiz.short_summary());
        Some(Self {
            source: ItemSource::Quiz,
            title: quiz.title.clone(),
            course: course_label(course),
            due_at,
            task_type: match quiz.quiz_type {
                QuizType::Survey => TaskType::Other,
                _ => TaskType::Exam,
            },
            description: Some(description),
            refreshed_description: Some(refreshed),
            priority: match quiz.quiz_type {
                QuizType::Assignment => Priority::High,
                _ => Priority::Medium,
            },
            submitted: false,
            completed: false,
        })
    }

    /// Map a module item. `backfill` is the separately fetched assignment
    /// used when the item carries no inline due date.
    pub fn from_module_item(
        item: &CanvasModuleItem,
        module_name: &str,
        course: &str,
        backfill: Option<&CanvasAssignment>,
    ) -> Option<Self> {
        if !item.is_gradable() {
            return None;
        }
        let mut description = format!("Module: {module_name}");
        let due_at = match item.inline_due_at() {
            Some(due) => due.to_string(),
            None => {
                let fetched = backfill?;
                if let Some(d) = fetched.description.as_deref().filter(|d| !d.is_empty()) {
                    description = d.to_string();
                }
                fetched.due_at.clone()?
            }
        };
        Some(Self {
            source: ItemSource::ModuleItem,
            title: item.title.clone(),
            course: course_label(course),
            due_at,
            task_type: if item.is_quiz_like() {
                TaskType::Exam
            } else {
                TaskType::Assignment
            },
            refreshed_description: Some(description.clone()),
            description: Some(description),
            priority: Priority::Medium,
            submitted: false,
            completed: item.is_completed(),
        })
    }

    /// Planner entries name their course through the context name.
    pub fn from_planner_item(item: &CanvasPlannerItem) -> Option<Self> {
        let due_at = item.plannable.due_at.clone()?;
        let submitted = item.is_submitted();
        Some(Self {
            source: ItemSource::Planner,
            title: item.plannable.title.clone(),
            course: item.context_name.as_deref().and_then(course_label),
            due_at,
            task_type: TaskType::Assignment,
            description: None,
            refreshed_description: None,
            priority: Priority::Medium,
            submitted,
            completed: submitted,
        })
    }

    fn to_new_task(&self, due: &DueStamp) -> NewTask {
        NewTask {
            title: self.title.clone(),
            description: self.description.clone(),
            task_type: self.task_type,
            course: self.course.clone(),
            due_date: due.date_string(),
            due_time: Some(due.time_string()),
            priority: self.priority,
            completed: self.completed,
            submitted: self.submitted,
        }
    }
}

/// Decides which stored task, if any, a fetched item refers to.
pub trait TaskMatcher: Send + Sync {
    fn find_existing(
        &self,
        conn: &Connection,
        user_id: i64,
        item: &SyncItem,
    ) -> std::result::Result<Option<i64>, rusqlite::Error>;
}

/// Matches on exact title and course name. Canvas has no id shared by all
/// of its listings, so this is the only key every source can produce.
pub struct TitleCourseMatcher;

impl TaskMatcher for TitleCourseMatcher {
    fn find_existing(
        &self,
        conn: &Connection,
        user_id: i64,
        item: &SyncItem,
    ) -> std::result::Result<Option<i64>, rusqlite::Error> {
        repository::find_task_id_by_title_and_course(
            conn,
            user_id,
            &item.title,
            item.course.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted(i64),
    Updated(i64),
}

#[derive(Clone)]
pub struct Reconciler {
    db: Database,
    matcher: Arc<dyn TaskMatcher>,
}

impl Reconciler {
    pub fn new(db: Database) -> Self {
        Self::with_matcher(db, Arc::new(TitleCourseMatcher))
    }

    pub fn with_matcher(db: Database, matcher: Arc<dyn TaskMatcher>) -> Self {
        Self { db, matcher }
    }

    /// Reconcile a batch. `None` entries are items a mapper rejected; they
    /// are only counted as skipped.
    pub async fn reconcile(
        &self,
        user_id: i64,
        items: impl IntoIterator<Item = Option<SyncItem>>,
        zone: &ClientZone,
    ) -> Result<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();
        for item in items {
            let Some(item) = item else {
                outcome.skipped += 1;
                continue;
            };
            match self.apply(user_id, item, zone).await? {
                Applied::Inserted(_) => outcome.inserted += 1,
                Applied::Updated(_) => outcome.updated += 1,
            }
        }
        Ok(outcome)
    }

    /// Insert or refresh the task for one item.
    pub async fn apply(&self, user_id: i64, item: SyncItem, zone: &ClientZone) -> Result<Applied> {
        let due = normalize_due(&item.due_at, zone)?;
        let matcher = Arc::clone(&self.matcher);
        let applied = self
            .db
            .writer()
            .call(move |conn| {
                match matcher.find_existing(conn, user_id, &item)? {
                    Some(task_id) => {
                        log::debug!(
                            "Updating task {task_id} '{}' from {} (due {} {})",
                            item.title,
                            item.source.as_str(),
                            due.date_string(),
                            due.time_string()
                        );
                        repository::apply_synced_columns(
                            conn,
                            task_id,
                            &item.source.update_columns(&item, &due),
                        )?;
                        Ok::<_, rusqlite::Error>(Applied::Updated(task_id))
                    }
                    None => {
                        log::debug!(
                            "Creating {} task '{}' from {}",
                            item.task_type,
                            item.title,
                            item.source.as_str()
                        );
                        let id = repository::insert_task(conn, user_id, &item.to_new_task(&due))?;
                        Ok(Applied::Inserted(id))
                    }
                }
            })
            .await?;
        Ok(applied)
    }
}
