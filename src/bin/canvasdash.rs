use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use canvasdash::{
    CanvasDash, ClientZone, Config, Database, HttpLmsClient, NewTask, Priority, ReconcileOutcome,
    Scheduler, SyncSummary, Task, TaskType, TaskUpdate,
};

#[derive(Parser)]
#[command(name = "canvasdash", about = "Canvas-backed student task dashboard")]
struct Cli {
    /// Database path (default: $CANVASDASH_DB or ~/.canvasdash/canvasdash.db)
    #[arg(long)]
    db: Option<String>,

    /// Canvas API root (default: $CANVAS_API_URL or https://uc.instructure.com/api/v1)
    #[arg(long)]
    canvas_url: Option<String>,

    /// Username the command acts for
    #[arg(long, short, global = true)]
    user: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Progress reporter that writes to stderr.
struct StderrProgress;

impl canvasdash::SyncProgress for StderrProgress {
    fn on_courses_fetched(&self, count: usize) {
        eprintln!("Found {count} active courses");
    }

    fn on_course_start(&self, course: &str, index: usize, total: usize) {
        eprintln!("[{}/{}] Syncing {}...", index + 1, total, course);
    }

    fn on_course_complete(&self, _course: &str, outcome: &ReconcileOutcome) {
        eprintln!(
            "  Done: {} new, {} updated, {} skipped",
            outcome.inserted, outcome.updated, outcome.skipped
        );
    }

    fn on_course_failed(&self, course: &str, error: &canvasdash::Error) {
        eprintln!("  Failed {course}: {error}");
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users and their Canvas tokens
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Log in, syncing from Canvas when the last sync is stale
    Login {
        username: String,
        password: String,
        #[command(flatten)]
        zone: ZoneArgs,
    },
    /// Pull data from Canvas
    Sync {
        #[command(subcommand)]
        target: SyncTarget,
        #[command(flatten)]
        zone: ZoneArgs,
    },
    /// Manage tasks
    Tasks {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Manage courses
    Courses {
        #[command(subcommand)]
        action: CourseAction,
    },
    /// Print the Canvas page of a task
    TaskUrl { task_id: i64 },
    /// Run the background sync
    Scheduler {
        #[command(subcommand)]
        action: SchedulerAction,
    },
    /// Show stored data and recent syncs for a user
    Status,
    /// List sync log entries
    History {
        #[arg(long, default_value = "20")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct ZoneArgs {
    /// IANA timezone reported by the client (recorded, not applied)
    #[arg(long)]
    timezone: Option<String>,
    /// Client UTC offset in minutes west of UTC (recorded, not applied)
    #[arg(long, allow_hyphen_values = true)]
    offset: Option<i32>,
}

impl ZoneArgs {
    fn zone(&self) -> ClientZone {
        ClientZone {
            timezone: self.timezone.clone(),
            offset_minutes: self.offset,
        }
    }
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user
    Add {
        username: String,
        password: String,
        /// Canvas API access token
        #[arg(long)]
        token: Option<String>,
    },
    /// Set the user's Canvas token; omit it to clear
    Token { token: Option<String> },
    /// Show the user
    Show,
}

#[derive(Subcommand)]
enum SyncTarget {
    /// Replace Canvas courses with the current dashboard
    Courses,
    /// Courses plus every course's assignments
    Assignments,
    /// Delete all tasks, then sync assignments
    Reset,
    /// Published quizzes of every course
    Quizzes,
    /// Gradable module items of every course
    Modules,
    /// Planner items around today
    Planner,
}

#[derive(Subcommand)]
enum TaskAction {
    /// List tasks by due date
    List {
        /// Start date (YYYY-MM-DD), used together with --end
        #[arg(long)]
        start: Option<String>,
        /// End date (YYYY-MM-DD), used together with --start
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Create a task
    Add {
        title: String,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: String,
        /// Due time (HH:MM)
        #[arg(long)]
        time: Option<String>,
        /// assignment, exam, project, meeting, study, deadline or other
        #[arg(long = "type", default_value = "assignment")]
        task_type: String,
        /// high, medium or low
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Change fields of a task
    Update {
        task_id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        time: Option<String>,
        #[arg(long = "type")]
        task_type: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        completed: Option<bool>,
    },
    /// Delete a task
    Delete { task_id: i64 },
}

#[derive(Subcommand)]
enum CourseAction {
    /// List courses
    List {
        #[arg(long)]
        json: bool,
    },
    /// Create a course by hand
    Add {
        name: String,
        #[arg(long)]
        professor: Option<String>,
    },
    /// Print the Canvas syllabus page of a course
    Syllabus { course_id: i64 },
}

#[derive(Subcommand)]
enum SchedulerAction {
    /// Run a pass every interval until interrupted
    Run,
    /// Run a single pass now
    Once,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = Config::from_env(cli.db.map(PathBuf::from), cli.canvas_url)?;

    let db = Database::open_at(&config.db_path).await?;
    let client = HttpLmsClient::new(&config.canvas_api_url)?;
    let dash = CanvasDash::new(db, Arc::new(client), config);
    let username = cli.user;

    match cli.command {
        Commands::User { action } => handle_user(&dash, username.as_deref(), action).await?,
        Commands::Login {
            username,
            password,
            zone,
        } => {
            let outcome = dash.login(&username, &password, &zone.zone()).await?;
            println!("Logged in as {}", outcome.user.username);
            match (outcome.synced, outcome.sync_error) {
                (Some(summary), _) => print_summary("Login sync", &summary),
                (None, Some(err)) => println!("Sync failed: {err}"),
                (None, None) => println!("Sync skipped (recent or no Canvas token)"),
            }
        }
        Commands::Sync { target, zone } => {
            let user = require_user(&dash, username.as_deref()).await?;
            handle_sync(&dash, user.id, target, &zone.zone()).await?;
        }
        Commands::Tasks { action } => {
            let user = require_user(&dash, username.as_deref()).await?;
            handle_tasks(&dash, user.id, action).await?;
        }
        Commands::Courses { action } => {
            let user = require_user(&dash, username.as_deref()).await?;
            handle_courses(&dash, user.id, action).await?;
        }
        Commands::TaskUrl { task_id } => {
            let user = require_user(&dash, username.as_deref()).await?;
            let link = dash.task_canvas_url(user.id, task_id).await?;
            print_link(&link);
        }
        Commands::Scheduler { action } => {
            let scheduler = Scheduler::new(dash.clone());
            match action {
                SchedulerAction::Run => scheduler.start().await,
                SchedulerAction::Once => {
                    let report = scheduler.run_once(chrono::Utc::now()).await?;
                    println!("Background sync");
                    println!("  Active:  {}", report.active);
                    println!("  Synced:  {}", report.synced);
                    println!("  Fresh:   {}", report.fresh);
                    println!("  Busy:    {}", report.busy);
                    println!("  Failed:  {}", report.failed);
                }
            }
        }
        Commands::Status => {
            let user = require_user(&dash, username.as_deref()).await?;
            let status = dash.sync_status(user.id).await?;
            println!("Status for {}", user.username);
            println!("  Tasks:        {}", status.tasks);
            println!("  Courses:      {}", status.courses);
            println!(
                "  Canvas token: {}",
                if user.has_canvas_token() { "set" } else { "missing" }
            );
            println!(
                "  Last sync:    {}",
                status.last_success.unwrap_or_else(|| "never".to_string())
            );
            if !status.recent.is_empty() {
                println!("  Recent:");
                for log in &status.recent {
                    println!(
                        "    {} {:<10} {:<7} {}",
                        log.last_sync_at,
                        log.sync_type,
                        log.status.as_str(),
                        log.error_message.as_deref().unwrap_or("")
                    );
                }
            }
        }
        Commands::History { limit, json } => {
            let user = require_user(&dash, username.as_deref()).await?;
            let logs = dash.sync_history(user.id, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&logs)?);
            } else {
                for log in &logs {
                    println!(
                        "{} {:<10} {:<7} {:>4} assignments {:>4} modules {}",
                        log.last_sync_at,
                        log.sync_type,
                        log.status.as_str(),
                        log.assignments_count,
                        log.modules_count,
                        log.error_message.as_deref().unwrap_or("")
                    );
                }
            }
        }
    }

    Ok(())
}

async fn require_user(
    dash: &CanvasDash,
    username: Option<&str>,
) -> anyhow::Result<canvasdash::User> {
    let username = username.context("this command needs --user <USERNAME>")?;
    Ok(dash.find_user(username).await?)
}

/// Vendor failures read better as the end-user message.
fn sync_error(e: canvasdash::Error) -> anyhow::Error {
    match e.category() {
        canvasdash::ErrorCategory::VendorAuth | canvasdash::ErrorCategory::VendorUnavailable => {
            anyhow::anyhow!("{} ({e})", e.user_message())
        }
        _ => e.into(),
    }
}

async fn handle_user(
    dash: &CanvasDash,
    username: Option<&str>,
    action: UserAction,
) -> anyhow::Result<()> {
    match action {
        UserAction::Add {
            username,
            password,
            token,
        } => {
            let user = dash.add_user(&username, &password, token.as_deref()).await?;
            println!("Created user {} (id {})", user.username, user.id);
        }
        UserAction::Token { token } => {
            let user = require_user(dash, username).await?;
            dash.set_canvas_token(user.id, token.as_deref()).await?;
            match token {
                Some(_) => println!("Canvas token updated."),
                None => println!("Canvas token cleared."),
            }
        }
        UserAction::Show => {
            let user = require_user(dash, username).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
    }
    Ok(())
}

async fn handle_sync(
    dash: &CanvasDash,
    user_id: i64,
    target: SyncTarget,
    zone: &ClientZone,
) -> anyhow::Result<()> {
    let progress = StderrProgress;
    let (label, result) = match target {
        SyncTarget::Courses => {
            let courses = dash.sync_courses(user_id).await.map_err(sync_error)?;
            let synced = courses.iter().filter(|c| c.is_from_canvas()).count();
            println!("Synced {synced} courses");
            return Ok(());
        }
        SyncTarget::Assignments => (
            "Assignments",
            dash.sync_assignments(user_id, zone, &progress).await,
        ),
        SyncTarget::Reset => (
            "Reset and sync",
            dash.reset_and_sync(user_id, zone, &progress).await,
        ),
        SyncTarget::Quizzes => ("Quizzes", dash.sync_quizzes(user_id, zone, &progress).await),
        SyncTarget::Modules => ("Modules", dash.sync_modules(user_id, zone, &progress).await),
        SyncTarget::Planner => {
            let today = chrono::Local::now().date_naive();
            ("Planner", dash.sync_planner(user_id, zone, today).await)
        }
    };
    let summary = result.map_err(sync_error)?;
    print_summary(label, &summary);
    Ok(())
}

async fn handle_tasks(dash: &CanvasDash, user_id: i64, action: TaskAction) -> anyhow::Result<()> {
    match action {
        TaskAction::List { start, end, json } => {
            let tasks = dash.list_tasks(user_id, start.as_deref(), end.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                print_tasks(&tasks);
            }
        }
        TaskAction::Add {
            title,
            due,
            time,
            task_type,
            priority,
            course,
            description,
        } => {
            let task = dash
                .create_task(
                    user_id,
                    NewTask {
                        title,
                        description,
                        task_type: task_type.parse::<TaskType>()?,
                        course,
                        due_date: due,
                        due_time: time,
                        priority: priority.parse::<Priority>()?,
                        completed: false,
                        submitted: false,
                    },
                )
                .await?;
            println!("Created task {}", task.id);
        }
        TaskAction::Update {
            task_id,
            title,
            due,
            time,
            task_type,
            priority,
            course,
            description,
            completed,
        } => {
            let update = TaskUpdate {
                title,
                description,
                task_type: task_type.map(|t| t.parse::<TaskType>()).transpose()?,
                course,
                due_date: due,
                due_time: time,
                priority: priority.map(|p| p.parse::<Priority>()).transpose()?,
                completed,
            };
            let task = dash.update_task(user_id, task_id, update).await?;
            print_tasks(std::slice::from_ref(&task));
        }
        TaskAction::Delete { task_id } => {
            dash.delete_task(user_id, task_id).await?;
            println!("Deleted task {task_id}");
        }
    }
    Ok(())
}

async fn handle_courses(
    dash: &CanvasDash,
    user_id: i64,
    action: CourseAction,
) -> anyhow::Result<()> {
    match action {
        CourseAction::List { json } => {
            let courses = dash.list_courses(user_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&courses)?);
            } else {
                for c in &courses {
                    println!(
                        "{:>5}  {:<40} {:<10} {}",
                        c.id,
                        c.name,
                        c.professor.as_deref().unwrap_or("-"),
                        c.canvas_course_id.as_deref().unwrap_or("manual")
                    );
                }
            }
        }
        CourseAction::Add { name, professor } => {
            let course = dash.add_course(user_id, &name, professor.as_deref()).await?;
            println!("Created course {} (id {})", course.name, course.id);
        }
        CourseAction::Syllabus { course_id } => {
            let link = dash.syllabus_url(user_id, course_id).await?;
            print_link(&link);
        }
    }
    Ok(())
}

fn print_tasks(tasks: &[Task]) {
    for t in tasks {
        let status = if t.completed {
            "done"
        } else if t.submitted {
            "sent"
        } else {
            ""
        };
        println!(
            "{:>5}  {} {:<5}  {:<10} {:<6} {:<4}  {}{}",
            t.id,
            t.due_date,
            t.due_time.as_deref().unwrap_or(""),
            t.task_type.as_str(),
            t.priority.as_str(),
            status,
            t.title,
            t.course.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default()
        );
    }
}

fn print_summary(label: &str, summary: &SyncSummary) {
    println!("{label}:");
    println!("  Courses:     {}", summary.courses);
    println!("  Assignments: {}", summary.assignments);
    if summary.modules > 0 {
        println!("  Modules:     {}", summary.modules);
    }
}

fn print_link(link: &canvasdash::CanvasLink) {
    if link.confirmed {
        println!("{}", link.url);
    } else {
        println!("{} (unverified)", link.url);
    }
}
