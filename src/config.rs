use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_CANVAS_API_URL: &str = "https://uc.instructure.com/api/v1";

/// Runtime configuration for the dashboard.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Canvas REST API, including the `/api/v1` suffix.
    pub canvas_api_url: String,
    /// SQLite database location.
    pub db_path: PathBuf,
    pub sync: SyncSettings,
}

impl Config {
    /// Build a config from `CANVAS_API_URL` and `CANVASDASH_DB`, falling back
    /// to the hosted Canvas instance and `~/.canvasdash/canvasdash.db`.
    /// Explicit values (CLI flags) take precedence over the environment; the
    /// default database path is only resolved when neither gives one.
    pub fn from_env(db_path: Option<PathBuf>, canvas_api_url: Option<String>) -> Result<Self> {
        let canvas_api_url = canvas_api_url
            .or_else(|| std::env::var("CANVAS_API_URL").ok())
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CANVAS_API_URL.to_string());
        let db_path = resolve_db_path(
            db_path,
            std::env::var("CANVASDASH_DB").ok(),
            default_db_path,
        )?;
        let config = Self {
            canvas_api_url,
            db_path,
            sync: SyncSettings::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.canvas_api_url)
            .map_err(|e| Error::Config(format!("CANVAS_API_URL is not a valid URL: {e}")))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(Error::Config(format!(
                "CANVAS_API_URL must use http or https, got '{other}'"
            ))),
        }
    }
}

/// Timing policy of the background sync.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Period of the background job.
    pub interval: Duration,
    /// A user whose last successful sync is younger than this is skipped.
    pub staleness: chrono::Duration,
    /// Users without any sync log inside this window are not considered active.
    pub active_window: chrono::Duration,
    /// Pause between per-course assignment fetches of one background sync.
    pub course_delay: Duration,
    pub planner_months_before: u32,
    pub planner_months_after: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3 * 60 * 60),
            staleness: chrono::Duration::hours(1),
            active_window: chrono::Duration::days(7),
            course_delay: Duration::from_millis(500),
            planner_months_before: 2,
            planner_months_after: 3,
        }
    }
}

fn resolve_db_path(
    explicit: Option<PathBuf>,
    from_env: Option<String>,
    default: impl FnOnce() -> Result<PathBuf>,
) -> Result<PathBuf> {
    if let Some(path) = explicit.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(path);
    }
    match from_env {
        Some(path) if !path.trim().is_empty() => Ok(PathBuf::from(path)),
        _ => default(),
    }
}

fn default_db_path() -> Result<PathBuf> {
    let dir = dirs::home_dir()
        .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
        .join(".canvasdash");
    std::fs::create_dir_all(&dir).map_err(|e| Error::Config(e.to_string()))?;
    Ok(dir.join("canvasdash.db"))
}
