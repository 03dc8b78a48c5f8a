use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::error::{Error, Result};

/// Zone every persisted due date/time is rendered in.
pub const REFERENCE_TZ: Tz = chrono_tz::America::New_York;

/// Timezone hints sent by a client alongside a sync request.
///
/// They are carried through every sync path but do not influence what gets
/// stored: persisted values are always rendered in [`REFERENCE_TZ`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientZone {
    pub timezone: Option<String>,
    /// Minutes west of UTC, as reported by browsers.
    pub offset_minutes: Option<i32>,
}

impl ClientZone {
    pub fn is_empty(&self) -> bool {
        self.timezone.is_none() && self.offset_minutes.is_none()
    }
}

/// A calendar date plus a wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueStamp {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl DueStamp {
    fn from_naive(dt: NaiveDateTime) -> Self {
        Self {
            date: dt.date(),
            time: dt.time(),
        }
    }

    /// `YYYY-MM-DD`
    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    /// 24-hour `HH:MM`
    pub fn time_string(&self) -> String {
        self.time.format("%H:%M").to_string()
    }
}

/// Parse a Canvas timestamp as UTC.
///
/// Accepts RFC 3339 (`2025-10-15T03:59:00Z`, explicit offsets) and bare
/// `YYYY-MM-DDTHH:MM[:SS[.fff]]`, which is taken to be UTC.
pub fn parse_lms_timestamp(input: &str) -> Result<DateTime<Utc>> {
    let s = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    parse_naive(s).map(|naive| naive.and_utc())
}

fn parse_naive(s: &str) -> Result<NaiveDateTime> {
    let s = s.strip_suffix('Z').unwrap_or(s);
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .map_err(|e| Error::Timestamp {
            input: s.to_string(),
            message: e.to_string(),
        })
}

/// The persisted computation: parse as UTC, render in [`REFERENCE_TZ`].
pub fn normalize_due(input: &str, client: &ClientZone) -> Result<DueStamp> {
    if !client.is_empty() {
        log::debug!(
            "client zone {:?}/{:?} ignored for '{input}', rendering in {REFERENCE_TZ}",
            client.timezone,
            client.offset_minutes
        );
    }
    in_zone(input, REFERENCE_TZ)
}

/// Parse as UTC and render in `tz`.
pub fn in_zone(input: &str, tz: Tz) -> Result<DueStamp> {
    let utc = parse_lms_timestamp(input)?;
    Ok(DueStamp::from_naive(utc.with_timezone(&tz).naive_local()))
}

/// Read the wall-clock components exactly as written, discarding the `Z`
/// or offset. Matches the case where Canvas emits local time labelled UTC.
pub fn wall_clock_ignoring_offset(input: &str) -> Result<DueStamp> {
    let s = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(DueStamp::from_naive(dt.naive_local()));
    }
    parse_naive(s).map(DueStamp::from_naive)
}

/// Parse as UTC and read the UTC components.
pub fn utc_components(input: &str) -> Result<DueStamp> {
    parse_lms_timestamp(input).map(|dt| DueStamp::from_naive(dt.naive_utc()))
}

/// Date window for planner queries: `months_before` back to `months_after`
/// ahead of `today`.
pub fn planner_range(
    today: NaiveDate,
    months_before: u32,
    months_after: u32,
) -> (NaiveDate, NaiveDate) {
    let start = today
        .checked_sub_months(Months::new(months_before))
        .unwrap_or(NaiveDate::MIN);
    let end = today
        .checked_add_months(Months::new(months_after))
        .unwrap_or(NaiveDate::MAX);
    (start, end)
}

/// Validate a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| Error::InvalidInput(format!("'{s}' is not a YYYY-MM-DD date")))
}

/// Validate an `HH:MM` (or `HH:MM:SS`) clock time.
pub fn parse_clock(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| Error::InvalidInput(format!("'{s}' is not an HH:MM time")))
}

/// SQLite-friendly UTC timestamp, matching `datetime('now')`.
pub fn sql_timestamp(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn parse_sql_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|n| n.and_utc())
}
