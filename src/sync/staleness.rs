use chrono::{DateTime, Duration, Utc};

use crate::date_util::parse_sql_timestamp;
use crate::storage::repository;
use crate::storage::Database;

/// Whether the user is due for another sync.
///
/// True when no successful sync is on record or the latest one is older
/// than `threshold`. Any failure reading the log also yields true.
pub async fn should_sync(
    db: &Database,
    user_id: i64,
    now: DateTime<Utc>,
    threshold: Duration,
) -> bool {
    let last = db
        .reader()
        .call(move |conn| repository::last_successful_sync_at(conn, user_id))
        .await;
    match last {
        Ok(Some(raw)) => match parse_sql_timestamp(&raw) {
            Some(at) => now - at > threshold,
            None => {
                log::warn!("Unreadable sync timestamp '{raw}' for user {user_id}");
                true
            }
        },
        Ok(None) => true,
        Err(e) => {
            log::warn!("Could not read sync log for user {user_id}: {e}");
            true
        }
    }
}
