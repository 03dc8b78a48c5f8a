use std::time::Duration;

use chrono::NaiveDate;

use crate::canvas::names::{clean_course_name, extract_course_code};
use crate::canvas::{CanvasCourse, LmsClient};
use crate::date_util::ClientZone;
use crate::error::Result;
use crate::storage::repository::{self, CanvasCourseRow};
use crate::storage::Database;
use crate::sync::reconciler::{Reconciler, SyncItem};
use crate::sync::{ReconcileOutcome, SyncProgress, SyncSummary};

/// Everything a sync run needs besides the user.
pub struct SyncContext<'a> {
    pub db: &'a Database,
    pub client: &'a dyn LmsClient,
    pub reconciler: &'a Reconciler,
    pub zone: &'a ClientZone,
    pub progress: &'a dyn SyncProgress,
}

/// Display name under which a course's tasks are stored.
pub fn course_display_name(course: &CanvasCourse) -> String {
    clean_course_name(&course.short_name, &course.long_name)
}

fn course_row(course: &CanvasCourse) -> CanvasCourseRow {
    let name = course_display_name(course);
    let course_code = extract_course_code(&name, &course.course_code);
    CanvasCourseRow {
        name,
        canvas_course_id: course.id.to_string(),
        course_code,
    }
}

/// Fetch the user's active courses and replace their Canvas course rows.
/// Manually created courses are kept.
pub async fn sync_courses(
    db: &Database,
    client: &dyn LmsClient,
    user_id: i64,
    token: &str,
) -> Result<Vec<CanvasCourse>> {
    let courses = client.courses(token).await?;
    let rows: Vec<CanvasCourseRow> = courses.iter().map(course_row).collect();
    let written = db
        .writer()
        .call(move |conn| repository::replace_canvas_courses(conn, user_id, &rows))
        .await?;
    log::info!("Stored {written} Canvas courses for user {user_id}");
    Ok(courses)
}

/// Courses, then every course's assignments.
///
/// A course whose fetch or reconciliation fails is logged and skipped; its
/// assignments are not counted. `course_delay` is slept between courses.
pub async fn perform_full_sync(
    ctx: &SyncContext<'_>,
    user_id: i64,
    token: &str,
    course_delay: Duration,
) -> Result<SyncSummary> {
    let courses = sync_courses(ctx.db, ctx.client, user_id, token).await?;
    ctx.progress.on_courses_fetched(courses.len());

    let mut summary = SyncSummary {
        courses: courses.len() as u64,
        ..Default::default()
    };
    let mut total = ReconcileOutcome::default();
    for (index, course) in courses.iter().enumerate() {
        if index > 0 && !course_delay.is_zero() {
            tokio::time::sleep(course_delay).await;
        }
        let name = course_display_name(course);
        ctx.progress.on_course_start(&name, index, courses.len());
        match sync_course_assignments(ctx, user_id, token, course.id, &name).await {
            Ok((fetched, outcome)) => {
                log::info!(
                    "{name}: {fetched} assignments ({} new, {} updated, {} skipped)",
                    outcome.inserted,
                    outcome.updated,
                    outcome.skipped
                );
                summary.assignments += fetched;
                total.absorb(&outcome);
                ctx.progress.on_course_complete(&name, &outcome);
            }
            Err(e) => {
                log::warn!("Failed to sync course {} ({name}): {e}", course.id);
                ctx.progress.on_course_failed(&name, &e);
            }
        }
    }
    log::info!(
        "Full sync of user {user_id}: {} courses, {} new tasks, {} updated, {} skipped",
        summary.courses,
        total.inserted,
        total.updated,
        total.skipped
    );
    Ok(summary)
}

async fn sync_course_assignments(
    ctx: &SyncContext<'_>,
    user_id: i64,
    token: &str,
    course_id: i64,
    course_name: &str,
) -> Result<(u64, ReconcileOutcome)> {
    let assignments = ctx.client.assignments(token, course_id).await?;
    let items = assignments
        .iter()
        .map(|a| SyncItem::from_assignment(a, course_name));
    let outcome = ctx.reconciler.reconcile(user_id, items, ctx.zone).await?;
    Ok((assignments.len() as u64, outcome))
}

/// Published quizzes of every active course. Course rows are left as they are.
pub async fn sync_quizzes(ctx: &SyncContext<'_>, user_id: i64, token: &str) -> Result<SyncSummary> {
    let courses = ctx.client.courses(token).await?;
    ctx.progress.on_courses_fetched(courses.len());

    let mut summary = SyncSummary {
        courses: courses.len() as u64,
        ..Default::default()
    };
    for (index, course) in courses.iter().enumerate() {
        let name = course_display_name(course);
        ctx.progress.on_course_start(&name, index, courses.len());
        let quizzes = ctx.client.quizzes(token, course.id).await?;
        let items = quizzes.iter().map(|q| SyncItem::from_quiz(q, &name));
        match ctx.reconciler.reconcile(user_id, items, ctx.zone).await {
            Ok(outcome) => {
                summary.assignments += outcome.stored();
                ctx.progress.on_course_complete(&name, &outcome);
            }
            Err(e) => {
                log::warn!("Failed to sync quizzes of {name}: {e}");
                ctx.progress.on_course_failed(&name, &e);
            }
        }
    }
    Ok(summary)
}

/// Gradable module items of every active course. A failed module listing
/// aborts the run.
pub async fn sync_modules(ctx: &SyncContext<'_>, user_id: i64, token: &str) -> Result<SyncSummary> {
    let courses = ctx.client.courses(token).await?;
    ctx.progress.on_courses_fetched(courses.len());

    let mut summary = SyncSummary {
        courses: courses.len() as u64,
        ..Default::default()
    };
    for (index, course) in courses.iter().enumerate() {
        let name = course_display_name(course);
        ctx.progress.on_course_start(&name, index, courses.len());
        let modules = ctx.client.modules(token, course.id).await?;

        let mut items: Vec<Option<SyncItem>> = Vec::new();
        for module in &modules {
            for item in module.items.iter().flatten() {
                let backfill = match item.content_id {
                    Some(content_id) if item.is_gradable() && item.inline_due_at().is_none() => {
                        log::debug!(
                            "Fetching assignment {content_id} for undated '{}'",
                            item.title
                        );
                        ctx.client.assignment(token, course.id, content_id).await
                    }
                    _ => None,
                };
                items.push(SyncItem::from_module_item(
                    item,
                    &module.name,
                    &name,
                    backfill.as_ref(),
                ));
            }
        }

        let outcome = ctx.reconciler.reconcile(user_id, items, ctx.zone).await?;
        log::info!(
            "{name}: {} modules, {} new tasks, {} updated",
            modules.len(),
            outcome.inserted,
            outcome.updated
        );
        summary.modules += outcome.stored();
        ctx.progress.on_course_complete(&name, &outcome);
    }
    Ok(summary)
}

/// Dated assignments from the planner between `start` and `end`.
pub async fn sync_planner(
    ctx: &SyncContext<'_>,
    user_id: i64,
    token: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<SyncSummary> {
    let planner = ctx.client.planner_items(token, start, end).await?;
    let items = planner.iter().map(SyncItem::from_planner_item);
    let outcome = ctx.reconciler.reconcile(user_id, items, ctx.zone).await?;
    log::info!(
        "Planner {start}..{end}: {} new tasks, {} updated",
        outcome.inserted,
        outcome.updated
    );
    Ok(SyncSummary {
        assignments: outcome.stored(),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::canvas::testing::{assignment, course, planner_item, quiz, FakeLmsClient};
    use crate::model::{Task, TaskType};
    use crate::sync::NoopProgress;
    use serde_json::json;

    async fn setup() -> (Database, i64) {
        let db = Database::open_memory().await.unwrap();
        let user = db
            .writer()
            .call(|conn| repository::insert_user(conn, "ada", "pw", Some("tok")))
            .await
            .unwrap();
        (db, user)
    }

    async fn tasks(db: &Database, user: i64) -> Vec<Task> {
        db.reader()
            .call(move |conn| repository::list_tasks(conn, user, None))
            .await
            .unwrap()
    }

    fn due(day: u32) -> String {
        format!("2025-10-{day:02}T03:59:00Z")
    }

    #[derive(Default)]
    struct RecordingProgress {
        failed: Mutex<Vec<String>>,
    }

    impl SyncProgress for RecordingProgress {
        fn on_course_failed(&self, course: &str, _error: &crate::Error) {
            self.failed.lock().unwrap().push(course.to_string());
        }
    }

    #[tokio::test]
    async fn test_full_sync_isolates_failing_course() {
        let (db, user) = setup().await;
        let fake = FakeLmsClient::default();
        {
            let mut state = fake.state();
            state.courses = vec![course(1, "Alpha"), course(2, "Beta"), course(3, "Gamma")];
            state.assignments.insert(
                1,
                vec![assignment(10, "A1", Some(&due(15)), &["online_upload"])],
            );
            state.assignments.insert(
                2,
                vec![assignment(20, "B1", Some(&due(15)), &["online_upload"])],
            );
            state.assignments.insert(
                3,
                vec![
                    assignment(30, "C1", Some(&due(16)), &["online_upload"]),
                    assignment(31, "C2", Some(&due(17)), &["online_quiz"]),
                ],
            );
            state.failing_assignments.insert(2);
        }
        let reconciler = Reconciler::new(db.clone());
        let progress = RecordingProgress::default();
        let ctx = SyncContext {
            db: &db,
            client: &fake,
            reconciler: &reconciler,
            zone: &ClientZone::default(),
            progress: &progress,
        };

        let summary = perform_full_sync(&ctx, user, "tok", Duration::ZERO).await.unwrap();
        assert_eq!(summary.courses, 3);
        assert_eq!(summary.assignments, 3);
        assert_eq!(*progress.failed.lock().unwrap(), vec!["Beta".to_string()]);

        let stored = tasks(&db, user).await;
        let titles: Vec<&str> = stored.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["A1", "C1", "C2"]);
        assert_eq!(stored[2].task_type, TaskType::Exam);
        assert!(fake.calls().contains(&"assignments:3".to_string()));
    }

    #[tokio::test]
    async fn test_full_sync_twice_only_updates() {
        let (db, user) = setup().await;
        let fake = FakeLmsClient::default();
        {
            let mut state = fake.state();
            state.courses = vec![course(1, "Alpha")];
            state.assignments.insert(
                1,
                vec![
                    assignment(10, "A1", Some(&due(15)), &["online_upload"]),
                    assignment(11, "A2", Some(&due(20)), &["online_upload"]),
                ],
            );
        }
        let reconciler = Reconciler::new(db.clone());
        let ctx = SyncContext {
            db: &db,
            client: &fake,
            reconciler: &reconciler,
            zone: &ClientZone::default(),
            progress: &NoopProgress,
        };

        perform_full_sync(&ctx, user, "tok", Duration::ZERO).await.unwrap();
        let first = tasks(&db, user).await;
        perform_full_sync(&ctx, user, "tok", Duration::ZERO).await.unwrap();
        let second = tasks(&db, user).await;

        assert_eq!(first.len(), 2);
        assert_eq!(
            first.iter().map(|t| (t.id, t.due_date.clone())).collect::<Vec<_>>(),
            second.iter().map(|t| (t.id, t.due_date.clone())).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_sync_courses_replaces_canvas_rows() {
        let (db, user) = setup().await;
        db.writer()
            .call(move |conn| repository::insert_course(conn, user, "Study Group", None, None))
            .await
            .unwrap();
        let fake = FakeLmsClient::default();
        fake.state().courses = vec![course(1, "Alpha"), course(2, "Beta")];
        sync_courses(&db, &fake, user, "tok").await.unwrap();

        fake.state().courses = vec![course(2, "Beta")];
        sync_courses(&db, &fake, user, "tok").await.unwrap();

        let rows = db
            .reader()
            .call(move |conn| repository::list_courses(conn, user))
            .await
            .unwrap();
        let names: Vec<(&str, Option<&str>)> = rows
            .iter()
            .map(|c| (c.name.as_str(), c.canvas_course_id.as_deref()))
            .collect();
        assert_eq!(names, vec![("Beta", Some("2")), ("Study Group", None)]);
    }

    #[tokio::test]
    async fn test_quiz_and_planner_paths() {
        let (db, user) = setup().await;
        let fake = FakeLmsClient::default();
        {
            let mut state = fake.state();
            state.courses = vec![course(1, "CS101")];
            state.quizzes.insert(
                1,
                vec![
                    quiz(1, "Midterm", "assignment", Some(&due(20))),
                    quiz(2, "Warm-up", "practice_quiz", Some(&due(20))),
                ],
            );
            state.planner = vec![planner_item("HW1", "CS101", &due(15), true)];
        }
        let reconciler = Reconciler::new(db.clone());
        let ctx = SyncContext {
            db: &db,
            client: &fake,
            reconciler: &reconciler,
            zone: &ClientZone::default(),
            progress: &NoopProgress,
        };

        let quizzes = sync_quizzes(&ctx, user, "tok").await.unwrap();
        assert_eq!(quizzes.assignments, 1);

        let start = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let planner = sync_planner(&ctx, user, "tok", start, end).await.unwrap();
        assert_eq!(planner.assignments, 1);
        assert!(fake.calls().contains(&"planner:2025-08-01:2026-01-01".to_string()));

        let stored = tasks(&db, user).await;
        assert_eq!(stored.len(), 2);
        let hw = stored.iter().find(|t| t.title == "HW1").unwrap();
        assert!(hw.submitted && hw.completed);
        assert_eq!(hw.course.as_deref(), Some("CS101"));
    }

    #[tokio::test]
    async fn test_module_sync_backfills_missing_due_date() {
        let (db, user) = setup().await;
        let fake = FakeLmsClient::default();
        {
            let mut state = fake.state();
            state.courses = vec![course(1, "CS101")];
            state.modules.insert(
                1,
                vec![serde_json::from_value(json!({
                    "id": 5,
                    "name": "Week 1",
                    "items": [
                        {"id": 1, "title": "Lab 1", "type": "Assignment",
                         "content_details": {"due_at": due(10)}},
                        {"id": 2, "title": "Quiz 1", "type": "Quiz", "content_id": 77},
                        {"id": 3, "title": "Lost", "type": "Assignment", "content_id": 78},
                        {"id": 4, "title": "Slides", "type": "File", "content_id": 79}
                    ]
                }))
                .unwrap()],
            );
            state
                .single_assignments
                .insert(77, assignment(77, "Quiz 1", Some(&due(12)), &["online_quiz"]));
        }
        let reconciler = Reconciler::new(db.clone());
        let ctx = SyncContext {
            db: &db,
            client: &fake,
            reconciler: &reconciler,
            zone: &ClientZone::default(),
            progress: &NoopProgress,
        };

        let summary = sync_modules(&ctx, user, "tok").await.unwrap();
        assert_eq!(summary.modules, 2);

        let calls = fake.calls();
        assert!(calls.contains(&"assignment:1:77".to_string()));
        assert!(calls.contains(&"assignment:1:78".to_string()));
        assert!(!calls.contains(&"assignment:1:79".to_string()));

        let stored = tasks(&db, user).await;
        let lab = stored.iter().find(|t| t.title == "Lab 1").unwrap();
        assert_eq!(lab.description.as_deref(), Some("Module: Week 1"));
        let quiz = stored.iter().find(|t| t.title == "Quiz 1").unwrap();
        assert_eq!(quiz.task_type, TaskType::Exam);
        assert_eq!(quiz.due_date, "2025-10-11");
        assert_eq!(quiz.description.as_deref(), Some("<p>Quiz 1</p>"));
    }

    #[tokio::test]
    async fn test_module_listing_failure_propagates() {
        let (db, user) = setup().await;
        let fake = FakeLmsClient::default();
        {
            let mut state = fake.state();
            state.courses = vec![course(1, "CS101")];
            state.modules_status = Some(500);
        }
        let reconciler = Reconciler::new(db.clone());
        let ctx = SyncContext {
            db: &db,
            client: &fake,
            reconciler: &reconciler,
            zone: &ClientZone::default(),
            progress: &NoopProgress,
        };
        let err = sync_modules(&ctx, user, "tok").await.unwrap_err();
        assert_eq!(err.status_code(), 502);
    }
}
