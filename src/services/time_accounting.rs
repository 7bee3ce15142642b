//! Time accounting
//!
//! Pure calendar arithmetic used to record and bucket playtime. Every
//! calendar-day computation is done in UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Accepted calendar day format
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// A calendar day string that is not `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid date '{0}', expected YYYY-MM-DD")]
pub struct InvalidDay(pub String);

/// Whole minutes from `a` to `b`, truncated toward zero.
///
/// When `b` is earlier than `a` the result is negative; it is not clamped.
pub fn minutes_between(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    (b - a).num_minutes()
}

/// True when both instants fall on the same UTC calendar day.
pub fn is_same_calendar_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.date_naive() == b.date_naive()
}

/// 00:00:00 of the UTC day containing `t`.
pub fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    day_start(t.date_naive())
}

/// 23:59:59 of the UTC day containing `t`, with no sub-second part.
pub fn end_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(t) + Duration::seconds(86_399)
}

/// Half-open instant range `[00:00:00 of day, 00:00:00 of the next day)`.
pub fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day_start(day);
    (start, start + Duration::days(1))
}

/// Parse a `YYYY-MM-DD` calendar day.
pub fn parse_day(text: &str) -> Result<NaiveDate, InvalidDay> {
    NaiveDate::parse_from_str(text.trim(), DAY_FORMAT).map_err(|_| InvalidDay(text.to_string()))
}

fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}
