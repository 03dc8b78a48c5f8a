use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use crate::date_util::sql_timestamp;
use crate::error::{Error, Result};
use crate::storage::repository;
use crate::CanvasDash;

/// Tally of one background pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerReport {
    pub active: usize,
    pub synced: usize,
    /// Synced recently enough to be left alone.
    pub fresh: usize,
    /// Another sync for the user was already running.
    pub busy: usize,
    pub failed: usize,
}

/// Periodic background sync of every active user.
pub struct Scheduler {
    dash: CanvasDash,
}

impl Scheduler {
    pub fn new(dash: CanvasDash) -> Self {
        Self { dash }
    }

    /// One pass over the active users. A failing user is logged and the
    /// pass moves on.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SchedulerReport> {
        let settings = &self.dash.config().sync;
        let cutoff = sql_timestamp(now - settings.active_window);
        let users = self
            .dash
            .db()
            .reader()
            .call(move |conn| repository::list_active_users(conn, &cutoff))
            .await?;

        let mut report = SchedulerReport {
            active: users.len(),
            ..Default::default()
        };
        log::info!("Background sync: {} active users", users.len());

        for user in &users {
            if self.dash.sync_guard().is_running(user.id) {
                log::info!("Skipping {}: sync already running", user.username);
                report.busy += 1;
                continue;
            }
            if !self.dash.should_sync(user.id, now).await {
                log::debug!("Skipping {}: synced recently", user.username);
                report.fresh += 1;
                continue;
            }
            let Some(token) = user.canvas_token.as_deref() else {
                continue;
            };
            match self.dash.background_sync(user, token).await {
                Ok(summary) => {
                    log::info!(
                        "Synced {}: {} courses, {} assignments",
                        user.username,
                        summary.courses,
                        summary.assignments
                    );
                    report.synced += 1;
                }
                Err(Error::SyncInProgress(_)) => {
                    log::info!("Skipping {}: sync already running", user.username);
                    report.busy += 1;
                }
                Err(e) => {
                    log::error!("Failed to sync {}: {e}", user.username);
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Background sync complete: {} synced, {} fresh, {} busy, {} failed",
            report.synced,
            report.fresh,
            report.busy,
            report.failed
        );
        Ok(report)
    }

    /// Run a pass every configured interval, forever. The first pass starts
    /// one interval after the call.
    pub async fn start(self) {
        let period = self.dash.config().sync.interval;
        log::info!("Starting background sync scheduler (interval: {period:?})");

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once(Utc::now()).await {
                log::warn!("Background sync pass failed: {e}");
            }
        }
    }
}
