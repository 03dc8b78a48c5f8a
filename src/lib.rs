pub mod canvas;
pub mod config;
pub mod date_util;
pub mod error;
pub mod links;
pub mod model;
pub mod scheduler;
pub mod storage;
pub mod sync;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

pub use canvas::{HttpLmsClient, LmsClient};
pub use config::{Config, SyncSettings};
pub use date_util::ClientZone;
pub use error::{Error, ErrorCategory, Result};
pub use links::CanvasLink;
pub use model::{
    Course, NewTask, Priority, SyncLog, SyncLogStatus, SyncTrigger, Task, TaskType, TaskUpdate,
    User,
};
pub use scheduler::{Scheduler, SchedulerReport};
pub use storage::Database;
pub use sync::{NoopProgress, ReconcileOutcome, SyncGuard, SyncProgress, SyncSummary};

use date_util::{parse_clock, parse_date, planner_range, sql_timestamp};
use storage::repository;
use sync::reconciler::Reconciler;
use sync::syncer::{self, SyncContext};

/// Result of a login. A failed sync is reported here instead of failing
/// the login itself.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub user: User,
    pub synced: Option<SyncSummary>,
    pub sync_error: Option<String>,
}

/// Stored state of one user, for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusReport {
    pub tasks: i64,
    pub courses: i64,
    pub last_success: Option<String>,
    pub recent: Vec<SyncLog>,
}

/// Main entry point of the dashboard backend.
#[derive(Clone)]
pub struct CanvasDash {
    db: Database,
    client: Arc<dyn LmsClient>,
    reconciler: Reconciler,
    guard: SyncGuard,
    config: Config,
}

impl CanvasDash {
    pub fn new(db: Database, client: Arc<dyn LmsClient>, config: Config) -> Self {
        Self {
            reconciler: Reconciler::new(db.clone()),
            db,
            client,
            guard: SyncGuard::new(),
            config,
        }
    }

    /// Access the database (used by the scheduler and tests).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sync_guard(&self) -> &SyncGuard {
        &self.guard
    }

    // ── Users ────────────────────────────────────────────────────

    pub async fn add_user(
        &self,
        username: &str,
        password: &str,
        canvas_token: Option<&str>,
    ) -> Result<User> {
        let username = username.trim().to_string();
        if username.is_empty() || password.is_empty() {
            return Err(Error::InvalidInput("username and password are required".into()));
        }
        let password = password.to_string();
        let token = canvas_token.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);

        let created = self
            .db
            .writer()
            .call({
                let username = username.clone();
                move |conn| {
                    if repository::get_user_by_username(conn, &username)?.is_some() {
                        return Ok(None);
                    }
                    let id = repository::insert_user(conn, &username, &password, token.as_deref())?;
                    repository::get_user(conn, id)
                }
            })
            .await?;
        created.ok_or_else(|| Error::InvalidInput(format!("username '{username}' is taken")))
    }

    pub async fn get_user(&self, user_id: i64) -> Result<User> {
        self.db
            .reader()
            .call(move |conn| repository::get_user(conn, user_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))
    }

    pub async fn find_user(&self, username: &str) -> Result<User> {
        let name = username.to_string();
        self.db
            .reader()
            .call(move |conn| repository::get_user_by_username(conn, &name))
            .await?
            .ok_or_else(|| Error::NotFound(format!("user '{username}'")))
    }

    /// Store a new Canvas token, or clear it with `None`. A user without a
    /// token is left out of every sync.
    pub async fn set_canvas_token(&self, user_id: i64, token: Option<&str>) -> Result<()> {
        let token = token.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);
        let changed = self
            .db
            .writer()
            .call(move |conn| repository::set_canvas_token(conn, user_id, token.as_deref()))
            .await?;
        if !changed {
            return Err(Error::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    /// Check credentials, then run a full sync when the user has a token and
    /// is due for one.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        zone: &ClientZone,
    ) -> Result<LoginOutcome> {
        let name = username.to_string();
        let user = self
            .db
            .reader()
            .call(move |conn| repository::get_user_by_username(conn, &name))
            .await?
            .filter(|u| u.password == password)
            .ok_or(Error::Unauthorized)?;

        let mut outcome = LoginOutcome {
            user: user.clone(),
            synced: None,
            sync_error: None,
        };
        let Some(token) = user.canvas_token.clone().filter(|t| !t.is_empty()) else {
            return Ok(outcome);
        };
        if !self.should_sync(user.id, Utc::now()).await {
            log::info!("Skipping login sync for {}: synced recently", user.username);
            return Ok(outcome);
        }

        let progress = NoopProgress;
        let run = self.full_sync(user.id, &token, zone, Duration::ZERO, &progress);
        match self.logged_sync(user.id, SyncTrigger::Login, run).await {
            Ok(summary) => outcome.synced = Some(summary),
            Err(Error::SyncInProgress(_)) => {
                log::info!("Sync already running for {}, not starting another", user.username);
            }
            Err(e) => {
                log::warn!("Login sync failed for {}: {e}", user.username);
                outcome.sync_error = Some(e.user_message());
            }
        }
        Ok(outcome)
    }

    // ── Tasks ────────────────────────────────────────────────────

    /// Tasks ordered by due date and time. The range applies only when both
    /// bounds are given.
    pub async fn list_tasks(
        &self,
        user_id: i64,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<Task>> {
        let range = match (start, end) {
            (Some(start), Some(end)) => {
                parse_date(start)?;
                parse_date(end)?;
                Some((start.to_string(), end.to_string()))
            }
            _ => None,
        };
        let tasks = self
            .db
            .reader()
            .call(move |conn| {
                let range = range.as_ref().map(|(s, e)| (s.as_str(), e.as_str()));
                repository::list_tasks(conn, user_id, range)
            })
            .await?;
        Ok(tasks)
    }

    pub async fn create_task(&self, user_id: i64, task: NewTask) -> Result<Task> {
        let mut task = task;
        task.title = task.title.trim().to_string();
        if task.title.is_empty() {
            return Err(Error::InvalidInput("title is required".into()));
        }
        parse_date(&task.due_date)?;
        task.due_time = task
            .due_time
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| parse_clock(t).map(|c| c.format("%H:%M").to_string()))
            .transpose()?;
        task.completed = false;
        task.submitted = false;

        let created = self
            .db
            .writer()
            .call(move |conn| {
                let id = repository::insert_task(conn, user_id, &task)?;
                repository::get_owned_task(conn, user_id, id)
            })
            .await?;
        created.ok_or_else(|| Error::Database("inserted task not found".into()))
    }

    pub async fn update_task(
        &self,
        user_id: i64,
        task_id: i64,
        update: TaskUpdate,
    ) -> Result<Task> {
        if update.is_empty() {
            return Err(Error::NotFound(format!("task {task_id}")));
        }
        let mut update = update;
        if let Some(ref title) = update.title {
            if title.trim().is_empty() {
                return Err(Error::InvalidInput("title cannot be empty".into()));
            }
        }
        if let Some(ref due_date) = update.due_date {
            parse_date(due_date)?;
        }
        if let Some(due_time) = update.due_time.take() {
            update.due_time = Some(parse_clock(&due_time)?.format("%H:%M").to_string());
        }

        let updated = self
            .db
            .writer()
            .call(move |conn| {
                if !repository::update_task(conn, user_id, task_id, &update)? {
                    return Ok(None);
                }
                repository::get_owned_task(conn, user_id, task_id)
            })
            .await?;
        updated.ok_or_else(|| Error::NotFound(format!("task {task_id}")))
    }

    pub async fn delete_task(&self, user_id: i64, task_id: i64) -> Result<()> {
        let deleted = self
            .db
            .writer()
            .call(move |conn| repository::delete_task(conn, user_id, task_id))
            .await?;
        if !deleted {
            return Err(Error::NotFound(format!("task {task_id}")));
        }
        Ok(())
    }

    // ── Courses ──────────────────────────────────────────────────

    pub async fn list_courses(&self, user_id: i64) -> Result<Vec<Course>> {
        let courses = self
            .db
            .reader()
            .call(move |conn| repository::list_courses(conn, user_id))
            .await?;
        Ok(courses)
    }

    /// Create a course by hand. It survives every Canvas course sync.
    pub async fn add_course(
        &self,
        user_id: i64,
        name: &str,
        professor: Option<&str>,
    ) -> Result<Course> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput("course name is required".into()));
        }
        let professor = professor.map(str::to_string);
        let created = self
            .db
            .writer()
            .call(move |conn| {
                let id =
                    repository::insert_course(conn, user_id, &name, None, professor.as_deref())?;
                repository::get_owned_course(conn, user_id, id)
            })
            .await?;
        created.ok_or_else(|| Error::Database("inserted course not found".into()))
    }

    /// Replace the user's Canvas courses with the current dashboard.
    pub async fn sync_courses(&self, user_id: i64) -> Result<Vec<Course>> {
        let token = self.token_for(user_id).await?;
        syncer::sync_courses(&self.db, self.client.as_ref(), user_id, &token).await?;
        self.list_courses(user_id).await
    }

    // ── Sync ─────────────────────────────────────────────────────

    /// Courses plus every course's assignments, logged as a manual sync.
    pub async fn sync_assignments(
        &self,
        user_id: i64,
        zone: &ClientZone,
        progress: &dyn SyncProgress,
    ) -> Result<SyncSummary> {
        let token = self.token_for(user_id).await?;
        let run = self.full_sync(user_id, &token, zone, Duration::ZERO, progress);
        self.logged_sync(user_id, SyncTrigger::Manual, run).await
    }

    /// Delete every task of the user, then run a full sync.
    pub async fn reset_and_sync(
        &self,
        user_id: i64,
        zone: &ClientZone,
        progress: &dyn SyncProgress,
    ) -> Result<SyncSummary> {
        let token = self.token_for(user_id).await?;
        let run = async {
            let removed = self
                .db
                .writer()
                .call(move |conn| repository::delete_all_tasks(conn, user_id))
                .await?;
            log::info!("Removed {removed} tasks of user {user_id} before resync");
            self.full_sync(user_id, &token, zone, Duration::ZERO, progress).await
        };
        self.logged_sync(user_id, SyncTrigger::Reset, run).await
    }

    pub async fn sync_quizzes(
        &self,
        user_id: i64,
        zone: &ClientZone,
        progress: &dyn SyncProgress,
    ) -> Result<SyncSummary> {
        let token = self.token_for(user_id).await?;
        let ctx = self.context(zone, progress);
        let run = async { syncer::sync_quizzes(&ctx, user_id, &token).await };
        self.logged_sync(user_id, SyncTrigger::Manual, run).await
    }

    pub async fn sync_modules(
        &self,
        user_id: i64,
        zone: &ClientZone,
        progress: &dyn SyncProgress,
    ) -> Result<SyncSummary> {
        let token = self.token_for(user_id).await?;
        let ctx = self.context(zone, progress);
        let run = async { syncer::sync_modules(&ctx, user_id, &token).await };
        self.logged_sync(user_id, SyncTrigger::Manual, run).await
    }

    /// Planner items from the configured number of months around `today`.
    pub async fn sync_planner(
        &self,
        user_id: i64,
        zone: &ClientZone,
        today: NaiveDate,
    ) -> Result<SyncSummary> {
        let token = self.token_for(user_id).await?;
        let settings = &self.config.sync;
        let (start, end) =
            planner_range(today, settings.planner_months_before, settings.planner_months_after);
        let progress = NoopProgress;
        let ctx = self.context(zone, &progress);
        let run = async { syncer::sync_planner(&ctx, user_id, &token, start, end).await };
        self.logged_sync(user_id, SyncTrigger::Manual, run).await
    }

    /// Whether the user's last successful sync is older than the staleness
    /// threshold (or missing).
    pub async fn should_sync(&self, user_id: i64, now: DateTime<Utc>) -> bool {
        sync::staleness::should_sync(&self.db, user_id, now, self.config.sync.staleness).await
    }

    pub async fn sync_history(&self, user_id: i64, limit: u32) -> Result<Vec<SyncLog>> {
        let logs = self
            .db
            .reader()
            .call(move |conn| repository::list_sync_logs(conn, user_id, limit))
            .await?;
        Ok(logs)
    }

    pub async fn sync_status(&self, user_id: i64) -> Result<SyncStatusReport> {
        let report = self
            .db
            .reader()
            .call(move |conn| {
                let (tasks, courses) = repository::count_user_rows(conn, user_id)?;
                Ok::<_, rusqlite::Error>(SyncStatusReport {
                    tasks,
                    courses,
                    last_success: repository::last_successful_sync_at(conn, user_id)?,
                    recent: repository::list_sync_logs(conn, user_id, 5)?,
                })
            })
            .await?;
        Ok(report)
    }

    /// Full sync under the per-user guard, appending a log row whatever the
    /// outcome. Used by the scheduler as well.
    pub(crate) async fn background_sync(&self, user: &User, token: &str) -> Result<SyncSummary> {
        let progress = NoopProgress;
        let zone = ClientZone::default();
        let run = self.full_sync(
            user.id,
            token,
            &zone,
            self.config.sync.course_delay,
            &progress,
        );
        self.logged_sync(user.id, SyncTrigger::Background, run).await
    }

    fn context<'a>(
        &'a self,
        zone: &'a ClientZone,
        progress: &'a dyn SyncProgress,
    ) -> SyncContext<'a> {
        SyncContext {
            db: &self.db,
            client: self.client.as_ref(),
            reconciler: &self.reconciler,
            zone,
            progress,
        }
    }

    async fn full_sync(
        &self,
        user_id: i64,
        token: &str,
        zone: &ClientZone,
        course_delay: Duration,
        progress: &dyn SyncProgress,
    ) -> Result<SyncSummary> {
        let ctx = self.context(zone, progress);
        syncer::perform_full_sync(&ctx, user_id, token, course_delay).await
    }

    async fn token_for(&self, user_id: i64) -> Result<String> {
        let user = self.get_user(user_id).await?;
        user.canvas_token
            .filter(|t| !t.is_empty())
            .ok_or(Error::MissingToken(user.username))
    }

    /// Run `sync` while holding the user's guard and record the outcome.
    async fn logged_sync(
        &self,
        user_id: i64,
        trigger: SyncTrigger,
        sync: impl Future<Output = Result<SyncSummary>>,
    ) -> Result<SyncSummary> {
        let Some(_permit) = self.guard.try_acquire(user_id) else {
            return Err(Error::SyncInProgress(user_id));
        };
        let result = sync.await;

        let synced_at = sql_timestamp(Utc::now());
        let (status, summary, message) = match &result {
            Ok(summary) => (SyncLogStatus::Success, *summary, None),
            Err(e) => (SyncLogStatus::Failed, SyncSummary::default(), Some(e.to_string())),
        };
        let written = self
            .db
            .writer()
            .call(move |conn| {
                repository::insert_sync_log(
                    conn,
                    user_id,
                    &synced_at,
                    trigger,
                    status,
                    summary.assignments,
                    summary.modules,
                    message.as_deref(),
                )
            })
            .await;
        if let Err(e) = written {
            log::error!("Failed to record {trigger} sync of user {user_id}: {e}");
        }
        result
    }

    // ── Canvas links ─────────────────────────────────────────────

    /// Syllabus page of a Canvas course. Asks Canvas for the course page and
    /// checks the syllabus under it; falls back to a URL built from the
    /// configured API root.
    pub async fn syllabus_url(&self, user_id: i64, course_id: i64) -> Result<CanvasLink> {
        let course = self
            .db
            .reader()
            .call(move |conn| repository::get_owned_course(conn, user_id, course_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("course {course_id}")))?;
        let canvas_id = course
            .canvas_course_id
            .ok_or_else(|| Error::NotFound(format!("course {course_id} has no Canvas id")))?;
        let token = self.token_for(user_id).await?;

        match self.client.course_details(&token, &canvas_id).await {
            Ok(details) => {
                if let Some(page) = details.html_url.or(details.course_url) {
                    let candidate = links::syllabus_under(&page);
                    if self.client.page_exists(&token, &candidate).await {
                        return Ok(CanvasLink::confirmed(candidate));
                    }
                    log::warn!("Syllabus check failed for course {canvas_id}: {candidate}");
                    return Ok(CanvasLink::guessed(candidate));
                }
            }
            Err(e) => log::warn!("Could not fetch Canvas course {canvas_id}: {e}"),
        }
        Ok(CanvasLink::guessed(links::syllabus_fallback(
            &self.config.canvas_api_url,
            &canvas_id,
        )))
    }

    /// Canvas page of the assignment a task was synced from, matched by
    /// course name and title; falls back to the course's assignment list.
    pub async fn task_canvas_url(&self, user_id: i64, task_id: i64) -> Result<CanvasLink> {
        let found = self
            .db
            .reader()
            .call(move |conn| {
                let Some(task) = repository::get_owned_task(conn, user_id, task_id)? else {
                    return Ok(None);
                };
                let course = match task.course.as_deref() {
                    Some(name) => repository::find_canvas_course_by_name(conn, user_id, name)?,
                    None => None,
                };
                Ok::<_, rusqlite::Error>(Some((task, course)))
            })
            .await?;
        let (task, course) = found.ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        let course = course.ok_or_else(|| {
            Error::NotFound(format!("no Canvas course for task {task_id}"))
        })?;
        let canvas_id = course
            .canvas_course_id
            .ok_or_else(|| Error::NotFound(format!("course {} has no Canvas id", course.id)))?;
        let token = self.token_for(user_id).await?;

        if let Ok(numeric_id) = canvas_id.parse::<i64>() {
            let assignments = self.client.assignments(&token, numeric_id).await?;
            if let Some(page) = assignments
                .into_iter()
                .find(|a| a.name == task.title)
                .and_then(|a| a.html_url)
            {
                return Ok(CanvasLink::confirmed(page));
            }
        }
        Ok(CanvasLink::guessed(links::assignments_fallback(
            &self.config.canvas_api_url,
            &canvas_id,
        )))
    }
}
