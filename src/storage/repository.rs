use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::model::{
    Course, NewTask, Priority, SyncLog, SyncLogStatus, SyncTrigger, Task, TaskType, TaskUpdate,
    User,
};

// ── Users ──────────────────────────────────────────────────────────

pub fn insert_user(
    conn: &Connection,
    username: &str,
    password: &str,
    canvas_token: Option<&str>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO users (username, password, canvas_token) VALUES (?1, ?2, ?3)",
        params![username, password, canvas_token],
    )?;
    Ok(conn.last_insert_rowid())
}

const USER_COLUMNS: &str = "id, username, password, canvas_token, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        canvas_token: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn get_user(conn: &Connection, user_id: i64) -> Result<Option<User>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![user_id],
        user_from_row,
    )
    .optional()
}

pub fn get_user_by_username(
    conn: &Connection,
    username: &str,
) -> Result<Option<User>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
        params![username],
        user_from_row,
    )
    .optional()
}

/// Store or clear (`None`) the user's Canvas token. Returns false if the user
/// does not exist.
pub fn set_canvas_token(
    conn: &Connection,
    user_id: i64,
    token: Option<&str>,
) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "UPDATE users SET canvas_token = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![user_id, token],
    )?;
    Ok(changed > 0)
}

/// Users eligible for background sync: they hold a token and either have
/// never been synced or have a sync log newer than `cutoff`.
pub fn list_active_users(conn: &Connection, cutoff: &str) -> Result<Vec<User>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users u
         WHERE u.canvas_token IS NOT NULL AND u.canvas_token != ''
           AND (
             NOT EXISTS (SELECT 1 FROM sync_logs s WHERE s.user_id = u.id)
             OR EXISTS (SELECT 1 FROM sync_logs s WHERE s.user_id = u.id AND s.last_sync_at > ?1)
           )
         ORDER BY u.id"
    ))?;
    let rows = stmt.query_map(params![cutoff], user_from_row)?;
    rows.collect()
}

// ── Courses ────────────────────────────────────────────────────────

const COURSE_COLUMNS: &str =
    "id, user_id, name, professor, canvas_course_id, created_at, updated_at";

fn course_from_row(row: &Row<'_>) -> Result<Course, rusqlite::Error> {
    Ok(Course {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        professor: row.get(3)?,
        canvas_course_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub fn list_courses(conn: &Connection, user_id: i64) -> Result<Vec<Course>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE user_id = ?1 ORDER BY name, id"
    ))?;
    let rows = stmt.query_map(params![user_id], course_from_row)?;
    rows.collect()
}

/// Fetch a course only if it belongs to `user_id`.
pub fn get_owned_course(
    conn: &Connection,
    user_id: i64,
    course_id: i64,
) -> Result<Option<Course>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1 AND user_id = ?2"),
        params![course_id, user_id],
        course_from_row,
    )
    .optional()
}

/// First Canvas-sourced course of the user with exactly this display name.
pub fn find_canvas_course_by_name(
    conn: &Connection,
    user_id: i64,
    name: &str,
) -> Result<Option<Course>, rusqlite::Error> {
    conn.query_row(
        &format!(
            "SELECT {COURSE_COLUMNS} FROM courses
             WHERE user_id = ?1 AND name = ?2 AND canvas_course_id IS NOT NULL
             ORDER BY id LIMIT 1"
        ),
        params![user_id, name],
        course_from_row,
    )
    .optional()
}

pub fn insert_course(
    conn: &Connection,
    user_id: i64,
    name: &str,
    canvas_course_id: Option<&str>,
    professor: Option<&str>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO courses (user_id, name, canvas_course_id, professor)
         VALUES (?1, ?2, ?3, ?4)",
        params![user_id, name, canvas_course_id, professor],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Delete every Canvas-sourced course of the user. Manual courses stay.
pub fn delete_canvas_courses(conn: &Connection, user_id: i64) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM courses WHERE user_id = ?1 AND canvas_course_id IS NOT NULL",
        params![user_id],
    )
}

/// A course row as produced by Canvas sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasCourseRow {
    pub name: String,
    pub canvas_course_id: String,
    pub course_code: String,
}

/// Drop and rebuild the user's Canvas courses.
pub fn replace_canvas_courses(
    conn: &Connection,
    user_id: i64,
    rows: &[CanvasCourseRow],
) -> Result<usize, rusqlite::Error> {
    delete_canvas_courses(conn, user_id)?;
    for row in rows {
        insert_course(
            conn,
            user_id,
            &row.name,
            Some(&row.canvas_course_id),
            Some(&row.course_code),
        )?;
    }
    Ok(rows.len())
}

// ── Tasks ──────────────────────────────────────────────────────────

const TASK_COLUMNS: &str = "id, user_id, title, description, type, course, due_date, due_time, \
                            priority, completed, submitted, created_at, updated_at";

fn parse_column<T: std::str::FromStr<Err = crate::Error>>(
    row: &Row<'_>,
    idx: usize,
) -> Result<T, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn task_from_row(row: &Row<'_>) -> Result<Task, rusqlite::Error> {
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        task_type: parse_column::<TaskType>(row, 4)?,
        course: row.get(5)?,
        due_date: row.get(6)?,
        due_time: row.get(7)?,
        priority: parse_column::<Priority>(row, 8)?,
        completed: row.get(9)?,
        submitted: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// List a user's tasks ordered by due date and time. The range filter
/// (inclusive) only applies when both bounds are given.
pub fn list_tasks(
    conn: &Connection,
    user_id: i64,
    range: Option<(&str, &str)>,
) -> Result<Vec<Task>, rusqlite::Error> {
    let order = "ORDER BY due_date ASC, due_time ASC, id ASC";
    match range {
        Some((start, end)) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE user_id = ?1 AND due_date BETWEEN ?2 AND ?3 {order}"
            ))?;
            let rows = stmt.query_map(params![user_id, start, end], task_from_row)?;
            rows.collect()
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 {order}"
            ))?;
            let rows = stmt.query_map(params![user_id], task_from_row)?;
            rows.collect()
        }
    }
}

/// Fetch a task only if it belongs to `user_id`.
pub fn get_owned_task(
    conn: &Connection,
    user_id: i64,
    task_id: i64,
) -> Result<Option<Task>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"),
        params![task_id, user_id],
        task_from_row,
    )
    .optional()
}

pub fn insert_task(
    conn: &Connection,
    user_id: i64,
    task: &NewTask,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO tasks (
            user_id, title, description, type, course, due_date, due_time,
            priority, completed, submitted
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            user_id,
            task.title,
            task.description,
            task.task_type.as_str(),
            task.course,
            task.due_date,
            task.due_time,
            task.priority.as_str(),
            task.completed,
            task.submitted,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Find the task sync treats as the same item: equal user, title and course.
/// A missing course only matches a missing course.
pub fn find_task_id_by_title_and_course(
    conn: &Connection,
    user_id: i64,
    title: &str,
    course: Option<&str>,
) -> Result<Option<i64>, rusqlite::Error> {
    conn.query_row(
        "SELECT id FROM tasks WHERE user_id = ?1 AND title = ?2 AND course IS ?3
         ORDER BY id LIMIT 1",
        params![user_id, title, course],
        |row| row.get(0),
    )
    .optional()
}

/// Run `UPDATE tasks SET <assignments>, updated_at = now` on one task,
/// optionally restricted to an owner. No-op when `assignments` is empty.
fn update_task_columns(
    conn: &Connection,
    task_id: i64,
    owner: Option<i64>,
    assignments: Vec<(&'static str, Value)>,
) -> Result<usize, rusqlite::Error> {
    if assignments.is_empty() {
        return Ok(0);
    }
    let mut set_clauses: Vec<String> = Vec::with_capacity(assignments.len() + 1);
    let mut values: Vec<Value> = Vec::with_capacity(assignments.len() + 2);
    for (column, value) in assignments {
        values.push(value);
        set_clauses.push(format!("{column} = ?{}", values.len()));
    }
    set_clauses.push("updated_at = datetime('now')".to_string());

    values.push(Value::Integer(task_id));
    let mut filter = format!("id = ?{}", values.len());
    if let Some(user_id) = owner {
        values.push(Value::Integer(user_id));
        filter.push_str(&format!(" AND user_id = ?{}", values.len()));
    }

    let sql = format!("UPDATE tasks SET {} WHERE {filter}", set_clauses.join(", "));
    conn.execute(&sql, params_from_iter(values))
}

fn opt_text(v: &Option<String>) -> Value {
    match v {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

/// Apply a user edit. Returns false when the task is not owned by the user
/// or nothing was given to change.
pub fn update_task(
    conn: &Connection,
    user_id: i64,
    task_id: i64,
    update: &TaskUpdate,
) -> Result<bool, rusqlite::Error> {
    let mut assignments: Vec<(&'static str, Value)> = Vec::new();
    if let Some(ref title) = update.title {
        assignments.push(("title", Value::Text(title.clone())));
    }
    if update.description.is_some() {
        assignments.push(("description", opt_text(&update.description)));
    }
    if let Some(t) = update.task_type {
        assignments.push(("type", Value::Text(t.as_str().to_string())));
    }
    if update.course.is_some() {
        assignments.push(("course", opt_text(&update.course)));
    }
    if let Some(ref due_date) = update.due_date {
        assignments.push(("due_date", Value::Text(due_date.clone())));
    }
    if update.due_time.is_some() {
        assignments.push(("due_time", opt_text(&update.due_time)));
    }
    if let Some(p) = update.priority {
        assignments.push(("priority", Value::Text(p.as_str().to_string())));
    }
    if let Some(completed) = update.completed {
        assignments.push(("completed", Value::Integer(completed as i64)));
    }
    let changed = update_task_columns(conn, task_id, Some(user_id), assignments)?;
    Ok(changed > 0)
}

/// Columns a sync pass may overwrite on an existing task. `None` leaves the
/// column as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncedColumns {
    pub due_date: Option<String>,
    pub due_time: Option<String>,
    pub task_type: Option<TaskType>,
    pub submitted: Option<bool>,
    pub completed: Option<bool>,
    pub description: Option<Option<String>>,
}

pub fn apply_synced_columns(
    conn: &Connection,
    task_id: i64,
    columns: &SyncedColumns,
) -> Result<bool, rusqlite::Error> {
    let mut assignments: Vec<(&'static str, Value)> = Vec::new();
    if let Some(ref due_date) = columns.due_date {
        assignments.push(("due_date", Value::Text(due_date.clone())));
    }
    if let Some(ref due_time) = columns.due_time {
        assignments.push(("due_time", Value::Text(due_time.clone())));
    }
    if let Some(t) = columns.task_type {
        assignments.push(("type", Value::Text(t.as_str().to_string())));
    }
    if let Some(submitted) = columns.submitted {
        assignments.push(("submitted", Value::Integer(submitted as i64)));
    }
    if let Some(completed) = columns.completed {
        assignments.push(("completed", Value::Integer(completed as i64)));
    }
    if let Some(ref description) = columns.description {
        assignments.push(("description", opt_text(description)));
    }
    let changed = update_task_columns(conn, task_id, None, assignments)?;
    Ok(changed > 0)
}

pub fn delete_task(conn: &Connection, user_id: i64, task_id: i64) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
        params![task_id, user_id],
    )?;
    Ok(changed > 0)
}

pub fn delete_all_tasks(conn: &Connection, user_id: i64) -> Result<usize, rusqlite::Error> {
    conn.execute("DELETE FROM tasks WHERE user_id = ?1", params![user_id])
}

/// Number of (tasks, courses) stored for the user.
pub fn count_user_rows(conn: &Connection, user_id: i64) -> Result<(i64, i64), rusqlite::Error> {
    let tasks = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    let courses = conn.query_row(
        "SELECT COUNT(*) FROM courses WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok((tasks, courses))
}

// ── Sync Logs ──────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn insert_sync_log(
    conn: &Connection,
    user_id: i64,
    synced_at: &str,
    trigger: SyncTrigger,
    status: SyncLogStatus,
    assignments_count: u64,
    modules_count: u64,
    error_message: Option<&str>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_logs (
            user_id, last_sync_at, sync_type, status,
            assignments_count, modules_count, error_message
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user_id,
            synced_at,
            trigger.as_str(),
            status.as_str(),
            assignments_count as i64,
            modules_count as i64,
            error_message,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Timestamp of the most recent successful sync of the user.
pub fn last_successful_sync_at(
    conn: &Connection,
    user_id: i64,
) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT MAX(last_sync_at) FROM sync_logs WHERE user_id = ?1 AND status = 'success'",
        params![user_id],
        |row| row.get(0),
    )
}

pub fn list_sync_logs(
    conn: &Connection,
    user_id: i64,
    limit: u32,
) -> Result<Vec<SyncLog>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, last_sync_at, sync_type, status,
                assignments_count, modules_count, error_message
         FROM sync_logs WHERE user_id = ?1
         ORDER BY last_sync_at DESC, id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit], |row| {
        Ok(SyncLog {
            id: row.get(0)?,
            user_id: row.get(1)?,
            last_sync_at: row.get(2)?,
            sync_type: row.get(3)?,
            status: parse_column::<SyncLogStatus>(row, 4)?,
            assignments_count: row.get(5)?,
            modules_count: row.get(6)?,
            error_message: row.get(7)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    fn new_task(title: &str, course: Option<&str>) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: None,
            task_type: TaskType::Assignment,
            course: course.map(str::to_string),
            due_date: "2025-10-20".to_string(),
            due_time: Some("23:59".to_string()),
            priority: Priority::Medium,
            completed: false,
            submitted: false,
        }
    }

    #[tokio::test]
    async fn test_replace_canvas_courses_keeps_manual_courses() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let user = insert_user(conn, "ada", "pw", Some("tok"))?;
                insert_course(conn, user, "Study Group", None, None)?;
                replace_canvas_courses(
                    conn,
                    user,
                    &[
                        CanvasCourseRow {
                            name: "Old Course".into(),
                            canvas_course_id: "1".into(),
                            course_code: "OLD1000".into(),
                        },
                        CanvasCourseRow {
                            name: "Kept Course".into(),
                            canvas_course_id: "2".into(),
                            course_code: "KEPT2000".into(),
                        },
                    ],
                )?;
                replace_canvas_courses(
                    conn,
                    user,
                    &[CanvasCourseRow {
                        name: "Kept Course".into(),
                        canvas_course_id: "2".into(),
                        course_code: "KEPT2000".into(),
                    }],
                )?;

                let names: Vec<String> =
                    list_courses(conn, user)?.into_iter().map(|c| c.name).collect();
                assert_eq!(names, vec!["Kept Course".to_string(), "Study Group".to_string()]);

                let manual = list_courses(conn, user)?
                    .into_iter()
                    .find(|c| c.name == "Study Group")
                    .unwrap();
                assert!(!manual.is_from_canvas());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_task_by_title_and_course_is_null_safe() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let user = insert_user(conn, "ada", "pw", None)?;
                let other = insert_user(conn, "bob", "pw", None)?;
                let with_course = insert_task(conn, user, &new_task("HW1", Some("CS101")))?;
                let no_course = insert_task(conn, user, &new_task("HW1", None))?;

                assert_eq!(
                    find_task_id_by_title_and_course(conn, user, "HW1", Some("CS101"))?,
                    Some(with_course)
                );
                assert_eq!(
                    find_task_id_by_title_and_course(conn, user, "HW1", None)?,
                    Some(no_course)
                );
                assert_eq!(
                    find_task_id_by_title_and_course(conn, user, "HW1", Some("MATH200"))?,
                    None
                );
                assert_eq!(
                    find_task_id_by_title_and_course(conn, other, "HW1", Some("CS101"))?,
                    None
                );
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_and_delete_respect_ownership() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let owner = insert_user(conn, "ada", "pw", None)?;
                let intruder = insert_user(conn, "eve", "pw", None)?;
                let id = insert_task(conn, owner, &new_task("Essay", Some("ENG101")))?;

                let update = TaskUpdate {
                    priority: Some(Priority::High),
                    due_time: Some("09:00".into()),
                    ..Default::default()
                };
                assert!(!update_task(conn, intruder, id, &update)?);
                assert!(update_task(conn, owner, id, &update)?);
                assert!(!update_task(conn, owner, id, &TaskUpdate::default())?);

                let task = get_owned_task(conn, owner, id)?.unwrap();
                assert_eq!(task.priority, Priority::High);
                assert_eq!(task.due_time.as_deref(), Some("09:00"));
                assert_eq!(task.title, "Essay");
                assert!(get_owned_task(conn, intruder, id)?.is_none());

                assert!(!delete_task(conn, intruder, id)?);
                assert!(delete_task(conn, owner, id)?);
                assert!(get_owned_task(conn, owner, id)?.is_none());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_apply_synced_columns_only_touches_given_columns() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let user = insert_user(conn, "ada", "pw", None)?;
                let mut task = new_task("Quiz 2", Some("CS101"));
                task.description = Some("my notes".into());
                task.priority = Priority::Low;
                let id = insert_task(conn, user, &task)?;

                apply_synced_columns(
                    conn,
                    id,
                    &SyncedColumns {
                        due_date: Some("2025-11-01".into()),
                        due_time: Some("12:00".into()),
                        task_type: Some(TaskType::Exam),
                        submitted: Some(true),
                        completed: Some(true),
                        description: None,
                    },
                )?;

                let stored = get_owned_task(conn, user, id)?.unwrap();
                assert_eq!(stored.due_date, "2025-11-01");
                assert_eq!(stored.due_time.as_deref(), Some("12:00"));
                assert_eq!(stored.task_type, TaskType::Exam);
                assert!(stored.submitted && stored.completed);
                assert_eq!(stored.description.as_deref(), Some("my notes"));
                assert_eq!(stored.priority, Priority::Low);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_tasks_orders_and_filters_by_range() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let user = insert_user(conn, "ada", "pw", None)?;
                for (title, date, time) in [
                    ("late", "2025-10-22", "08:00"),
                    ("early", "2025-10-20", "23:00"),
                    ("earliest", "2025-10-20", "09:00"),
                    ("outside", "2025-12-01", "09:00"),
                ] {
                    let mut t = new_task(title, None);
                    t.due_date = date.into();
                    t.due_time = Some(time.into());
                    insert_task(conn, user, &t)?;
                }

                let all: Vec<String> =
                    list_tasks(conn, user, None)?.into_iter().map(|t| t.title).collect();
                assert_eq!(all, vec!["earliest", "early", "late", "outside"]);

                let ranged: Vec<String> =
                    list_tasks(conn, user, Some(("2025-10-20", "2025-10-22")))?
                        .into_iter()
                        .map(|t| t.title)
                        .collect();
                assert_eq!(ranged, vec!["earliest", "early", "late"]);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sync_logs_and_active_users() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let fresh = insert_user(conn, "fresh", "pw", Some("tok"))?;
                let recent = insert_user(conn, "recent", "pw", Some("tok"))?;
                let dormant = insert_user(conn, "dormant", "pw", Some("tok"))?;
                insert_user(conn, "tokenless", "pw", None)?;

                insert_sync_log(conn, recent, "2025-10-15 10:00:00", SyncTrigger::Login,
                    SyncLogStatus::Success, 4, 0, None)?;
                insert_sync_log(conn, recent, "2025-10-16 10:00:00", SyncTrigger::Background,
                    SyncLogStatus::Failed, 0, 0, Some("Canvas API error: 503"))?;
                insert_sync_log(conn, dormant, "2025-09-01 10:00:00", SyncTrigger::Manual,
                    SyncLogStatus::Success, 2, 0, None)?;

                assert_eq!(
                    last_successful_sync_at(conn, recent)?.as_deref(),
                    Some("2025-10-15 10:00:00")
                );
                assert_eq!(last_successful_sync_at(conn, fresh)?, None);

                let logs = list_sync_logs(conn, recent, 10)?;
                assert_eq!(logs.len(), 2);
                assert_eq!(logs[0].status, SyncLogStatus::Failed);
                assert_eq!(logs[0].sync_type, "background");

                let active: Vec<i64> = list_active_users(conn, "2025-10-10 00:00:00")?
                    .into_iter()
                    .map(|u| u.id)
                    .collect();
                assert_eq!(active, vec![fresh, recent]);
                assert!(!active.contains(&dormant));
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }
}
