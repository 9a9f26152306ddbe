use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Utc};

/// Timestamp layouts accepted from Gerrit and the warehouse, tried in order.
/// Gerrit's REST API emits `2024-01-31 09:15:00.000000000` (always UTC).
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%d %H:%M",
];

/// Working days crossed when moving from one weekday to the next occurrence
/// of another, indexed `[start][end]` with Monday = 0. Saturday and Sunday
/// never count; the diagonal is zero.
const WEEKDAY_TRANSITIONS: [[i64; 7]; 7] = [
    // Mon Tue Wed Thu Fri Sat Sun
    [0, 1, 2, 3, 4, 4, 4], // Mon
    [4, 0, 1, 2, 3, 3, 3], // Tue
    [3, 4, 0, 1, 2, 2, 2], // Wed
    [2, 3, 4, 0, 1, 1, 1], // Thu
    [1, 2, 3, 4, 0, 0, 0], // Fri
    [1, 2, 3, 4, 5, 0, 0], // Sat
    [1, 2, 3, 4, 5, 5, 0], // Sun
];

/// Business hours credited for each working day inside a multi-day span.
const BUSINESS_HOURS_PER_WORKING_DAY: i64 = 10;

/// Parse a Gerrit or warehouse timestamp as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Format a date as the `YYYY-MM-DD` key used for window comparisons.
pub fn date_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Working days between two calendar dates: five per whole week plus the
/// weekday transition for the remainder. Zero when `end` is not after `start`.
pub fn working_days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    let span = (end - start).num_days();
    if span <= 0 {
        return 0;
    }
    let from = start.weekday().num_days_from_monday() as usize;
    let to = end.weekday().num_days_from_monday() as usize;
    5 * (span / 7) + WEEKDAY_TRANSITIONS[from][to]
}

/// Elapsed business time between two instants.
///
/// Within a single calendar day the real duration passes through. Across
/// days every weekend day is removed entirely and every working day keeps
/// only [`BUSINESS_HOURS_PER_WORKING_DAY`] hours (i.e. 14 hours are taken
/// off per working day). Never negative.
pub fn business_duration(start: DateTime<Utc>, end: DateTime<Utc>) -> TimeDelta {
    let real = end - start;
    let real_days = (end.date_naive() - start.date_naive()).num_days();
    if real_days <= 0 {
        return real.max(TimeDelta::zero());
    }

    let working_days = working_days_between(start.date_naive(), end.date_naive());
    let weekend_days = real_days - working_days;
    let off_hours = weekend_days * 24 + working_days * (24 - BUSINESS_HOURS_PER_WORKING_DAY);

    (real - TimeDelta::hours(off_hours)).max(TimeDelta::zero())
}
