//! Daily quota policy

/// True when the minutes already played today are over the daily quota.
///
/// The comparison is strict: a player exactly at quota may still start one
/// more session. A non-positive quota blocks every start once any time has
/// been recorded for the day.
pub fn exceeds_quota(minutes_played_today: i64, daily_quota_minutes: i64) -> bool {
    minutes_played_today > daily_quota_minutes
}
