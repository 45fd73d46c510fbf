//! Time-zone policy and local-calendar helpers
//!
//! Samples carry only an epoch-millisecond timestamp. Every "hour of day",
//! "today" or "this week" question is answered through a [`TimeZonePolicy`]
//! supplied by the caller, so the grouping zone is always explicit.

use crate::error::ComputeError;
use chrono::{
    DateTime, Datelike, Days, Duration, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime,
    TimeZone, Timelike, Utc, Weekday,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Milliseconds in one hour
pub const HOUR_MS: i64 = 60 * 60 * 1000;

/// Milliseconds in one nominal day (24h, not a calendar day)
pub const DAY_MS: i64 = 24 * HOUR_MS;

/// Which wall clock is used to interpret sample timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeZonePolicy {
    /// The viewer's runtime local zone (DST-aware)
    #[default]
    Local,
    /// Coordinated universal time
    Utc,
    /// A fixed offset from UTC, e.g. `+08:00`
    Fixed(FixedOffset),
}

impl TimeZonePolicy {
    /// Convert an epoch-millisecond timestamp to local wall-clock time.
    ///
    /// Returns `None` for timestamps chrono cannot represent.
    pub fn to_local(&self, ts_ms: i64) -> Option<NaiveDateTime> {
        let utc = DateTime::<Utc>::from_timestamp_millis(ts_ms)?;
        Some(match self {
            TimeZonePolicy::Local => utc.with_timezone(&Local).naive_local(),
            TimeZonePolicy::Utc => utc.naive_utc(),
            TimeZonePolicy::Fixed(offset) => utc.with_timezone(offset).naive_local(),
        })
    }

    /// Local hour of day (0-23)
    pub fn hour_of_day(&self, ts_ms: i64) -> Option<u32> {
        self.to_local(ts_ms).map(|t| t.hour())
    }

    /// Local calendar date
    pub fn local_date(&self, ts_ms: i64) -> Option<NaiveDate> {
        self.to_local(ts_ms).map(|t| t.date())
    }

    /// Local day of week
    pub fn weekday(&self, ts_ms: i64) -> Option<Weekday> {
        self.to_local(ts_ms).map(|t| t.weekday())
    }

    /// Convert a local wall-clock time back to epoch milliseconds.
    ///
    /// Ambiguous times (DST fall-back) resolve to the earlier instant; times
    /// inside a DST gap are pushed forward by the gap length.
    pub fn local_to_millis(&self, local: NaiveDateTime) -> i64 {
        match self {
            TimeZonePolicy::Local => resolve_local(&Local, local),
            TimeZonePolicy::Utc => local.and_utc().timestamp_millis(),
            TimeZonePolicy::Fixed(offset) => resolve_local(offset, local),
        }
    }

    /// Epoch milliseconds of local midnight starting `date`
    pub fn start_of_day_millis(&self, date: NaiveDate) -> i64 {
        self.local_to_millis(date.and_hms_opt(0, 0, 0).unwrap_or_default())
    }

    /// Local midnight starting `date`, or `i64::MAX` when `date` lies past the
    /// representable calendar. Used for exclusive window ends.
    pub fn boundary_millis(&self, date: Option<NaiveDate>) -> i64 {
        date.map_or(i64::MAX, |d| self.start_of_day_millis(d))
    }

    /// `YYYY-MM` key of the local month containing `ts_ms`
    pub fn month_key(&self, ts_ms: i64) -> Option<String> {
        self.local_date(ts_ms).map(format_month_key)
    }

    /// Local `HH:MM` label
    pub fn format_hm(&self, ts_ms: i64) -> String {
        self.to_local(ts_ms)
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".to_string())
    }
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> i64 {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.timestamp_millis(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp_millis(),
        LocalResult::None => {
            // Wall clock skipped this time; DST gaps are at most one hour.
            local
                .checked_add_signed(Duration::hours(1))
                .and_then(|shifted| tz.from_local_datetime(&shifted).earliest())
                .map(|dt| dt.timestamp_millis())
                .unwrap_or_else(|| local.and_utc().timestamp_millis())
        }
    }
}

impl fmt::Display for TimeZonePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeZonePolicy::Local => write!(f, "local"),
            TimeZonePolicy::Utc => write!(f, "utc"),
            TimeZonePolicy::Fixed(offset) => write!(f, "{}", offset),
        }
    }
}

impl FromStr for TimeZonePolicy {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "local" => return Ok(TimeZonePolicy::Local),
            "utc" | "z" | "gmt" => return Ok(TimeZonePolicy::Utc),
            _ => {}
        }

        let (sign, rest) = match trimmed.as_bytes().first() {
            Some(b'+') => (1, &trimmed[1..]),
            Some(b'-') => (-1, &trimmed[1..]),
            _ => return Err(ComputeError::InvalidTimezone(s.to_string())),
        };

        let (hours, minutes) = match rest.split_once(':') {
            Some((h, m)) => (h, m),
            None if rest.len() == 4 => rest.split_at(2),
            None => (rest, "0"),
        };

        let hours: i32 = hours
            .parse()
            .map_err(|_| ComputeError::InvalidTimezone(s.to_string()))?;
        let minutes: i32 = minutes
            .parse()
            .map_err(|_| ComputeError::InvalidTimezone(s.to_string()))?;
        if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
            return Err(ComputeError::InvalidTimezone(s.to_string()));
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(TimeZonePolicy::Fixed)
            .ok_or_else(|| ComputeError::InvalidTimezone(s.to_string()))
    }
}

impl TryFrom<String> for TimeZonePolicy {
    type Error = ComputeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeZonePolicy> for String {
    fn from(policy: TimeZonePolicy) -> Self {
        policy.to_string()
    }
}

/// First day of the week containing `date`
pub fn start_of_week(date: NaiveDate, week_starts_on: Weekday) -> NaiveDate {
    let back = (7 + date.weekday().num_days_from_monday() - week_starts_on.num_days_from_monday()) % 7;
    add_days(date, -(back as i64)).unwrap_or(NaiveDate::MIN)
}

/// `date` shifted by `days`, or `None` outside the representable calendar
pub fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

/// First day of the month containing `date`
pub fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the month `months` away from the month containing `date`,
/// or `None` outside the representable calendar
pub fn add_months(date: NaiveDate, months: i32) -> Option<NaiveDate> {
    let index = i64::from(date.year()) * 12 + i64::from(date.month0()) + i64::from(months);
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month0 = index.rem_euclid(12) as u32;
    NaiveDate::from_ymd_opt(year, month0 + 1, 1)
}

/// Format `YYYY-MM`
pub fn format_month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Parse a `YYYY-MM` key into the first day of that month
pub fn parse_month_key(key: &str) -> Result<NaiveDate, ComputeError> {
    let (year, month) = key
        .trim()
        .split_once('-')
        .ok_or_else(|| ComputeError::ParseError(format!("Invalid month key: {}", key)))?;
    let year: i32 = year
        .parse()
        .map_err(|_| ComputeError::ParseError(format!("Invalid month key: {}", key)))?;
    let month: u32 = month
        .parse()
        .map_err(|_| ComputeError::ParseError(format!("Invalid month key: {}", key)))?;
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ComputeError::ParseError(format!("Invalid month key: {}", key)))
}

/// Whether the weekday is Saturday or Sunday
pub fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}
