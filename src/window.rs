//! Time windows and sample filters
//!
//! A [`WindowSpec`] names a window relative to "now" (trailing N days, or a
//! calendar week/month paged backward). Resolving it against a clock and a
//! time-zone policy yields concrete bounds plus the day rows used by the
//! heatmap.

use crate::error::ComputeError;
use crate::timezone::{
    add_days, add_months, format_month_key, is_weekend, start_of_month, start_of_week,
    TimeZonePolicy, DAY_MS,
};
use crate::types::Sample;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Default trailing heatmap window
pub const DEFAULT_TRAILING_DAYS: u32 = 7;

/// Upper bound on trailing windows (about ten years)
pub const MAX_TRAILING_DAYS: u32 = 3660;

/// Which window a heatmap covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WindowSpec {
    /// `[now - days*24h, now]`, row 0 = the most recent 24h
    Trailing { days: u32 },
    /// Calendar week, `offset` weeks from the current one (never positive)
    CalendarWeek { offset: i32 },
    /// Calendar month, `offset` months from the current one (never positive)
    CalendarMonth { offset: i32 },
}

impl Default for WindowSpec {
    fn default() -> Self {
        WindowSpec::Trailing {
            days: DEFAULT_TRAILING_DAYS,
        }
    }
}

impl WindowSpec {
    /// Clamp paging so a calendar window never starts after the current one
    pub fn clamped(self) -> Self {
        match self {
            WindowSpec::Trailing { days } => WindowSpec::Trailing {
                days: days.clamp(1, MAX_TRAILING_DAYS),
            },
            WindowSpec::CalendarWeek { offset } => WindowSpec::CalendarWeek {
                offset: offset.min(0),
            },
            WindowSpec::CalendarMonth { offset } => WindowSpec::CalendarMonth {
                offset: offset.min(0),
            },
        }
    }

    /// Page one window back (negative `step`) or forward, respecting the clamp
    pub fn paged(self, step: i32) -> Self {
        match self {
            WindowSpec::Trailing { .. } => self,
            WindowSpec::CalendarWeek { offset } => WindowSpec::CalendarWeek {
                offset: offset.saturating_add(step),
            }
            .clamped(),
            WindowSpec::CalendarMonth { offset } => WindowSpec::CalendarMonth {
                offset: offset.saturating_add(step),
            }
            .clamped(),
        }
    }

    /// Resolve against `now_ms`.
    ///
    /// An unrepresentable `now_ms` yields an empty window rather than an error.
    /// A window running past the end of the representable calendar is
    /// truncated there and its `end_ms` is `i64::MAX`.
    pub fn resolve(
        &self,
        now_ms: i64,
        policy: &TimeZonePolicy,
        week_starts_on: Weekday,
    ) -> ResolvedWindow {
        let Some(today) = policy.local_date(now_ms) else {
            warn!(now_ms, "query instant is not representable, using empty window");
            return ResolvedWindow::empty(*self, now_ms);
        };

        match self.clamped() {
            spec @ WindowSpec::Trailing { days } => {
                let rows = (0..days as i64)
                    .filter_map(|d| {
                        policy
                            .local_date(now_ms - d * DAY_MS)
                            .or_else(|| add_days(today, -d))
                    })
                    .collect();
                ResolvedWindow {
                    spec,
                    start_ms: now_ms - days as i64 * DAY_MS,
                    end_ms: now_ms,
                    now_ms,
                    rows,
                }
            }
            spec @ WindowSpec::CalendarWeek { offset } => {
                let Some(first) =
                    add_days(start_of_week(today, week_starts_on), i64::from(offset) * 7)
                else {
                    warn!(offset, "week offset is not representable, using empty window");
                    return ResolvedWindow::empty(spec, now_ms);
                };
                let rows: Vec<NaiveDate> = (0..7).map_while(|d| add_days(first, d)).collect();
                ResolvedWindow {
                    spec,
                    start_ms: policy.start_of_day_millis(first),
                    end_ms: policy.boundary_millis(add_days(first, 7)),
                    now_ms,
                    rows,
                }
            }
            spec @ WindowSpec::CalendarMonth { offset } => {
                let Some(first) = add_months(start_of_month(today), offset) else {
                    warn!(offset, "month offset is not representable, using empty window");
                    return ResolvedWindow::empty(spec, now_ms);
                };
                let next = add_months(first, 1);
                let rows: Vec<NaiveDate> = (0..)
                    .map_while(|d| add_days(first, d))
                    .take_while(|d| next.map_or(true, |n| *d < n))
                    .collect();
                ResolvedWindow {
                    spec,
                    start_ms: policy.start_of_day_millis(first),
                    end_ms: policy.boundary_millis(next),
                    now_ms,
                    rows,
                }
            }
        }
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowSpec::Trailing { days } => write!(f, "trailing:{}", days),
            WindowSpec::CalendarWeek { offset } => write!(f, "week:{}", offset),
            WindowSpec::CalendarMonth { offset } => write!(f, "month:{}", offset),
        }
    }
}

impl FromStr for WindowSpec {
    type Err = ComputeError;

    /// Parse `trailing:N`, `week:OFFSET` or `month:OFFSET`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mode, arg) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| ComputeError::InvalidWindow(s.to_string()))?;

        match mode.to_ascii_lowercase().as_str() {
            "trailing" => {
                let days: u32 = arg
                    .parse()
                    .map_err(|_| ComputeError::InvalidWindow(s.to_string()))?;
                if days == 0 {
                    return Err(ComputeError::InvalidWindow(format!(
                        "{}: trailing window needs at least one day",
                        s
                    )));
                }
                Ok(WindowSpec::Trailing { days })
            }
            "week" | "month" => {
                let offset: i32 = arg
                    .parse()
                    .map_err(|_| ComputeError::InvalidWindow(s.to_string()))?;
                let spec = if mode.eq_ignore_ascii_case("week") {
                    WindowSpec::CalendarWeek { offset }
                } else {
                    WindowSpec::CalendarMonth { offset }
                };
                Ok(spec.clamped())
            }
            _ => Err(ComputeError::InvalidWindow(s.to_string())),
        }
    }
}

/// Concrete window bounds and day rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedWindow {
    /// The clamped spec this window was resolved from
    pub spec: WindowSpec,
    pub start_ms: i64,
    pub end_ms: i64,
    pub now_ms: i64,
    /// Local dates of each row; trailing rows run newest first
    pub rows: Vec<NaiveDate>,
}

impl ResolvedWindow {
    fn empty(spec: WindowSpec, now_ms: i64) -> Self {
        Self {
            spec,
            start_ms: now_ms,
            end_ms: now_ms,
            now_ms,
            rows: Vec::new(),
        }
    }

    pub fn contains(&self, ts_ms: i64) -> bool {
        match self.spec {
            WindowSpec::Trailing { .. } => ts_ms >= self.start_ms && ts_ms <= self.end_ms,
            _ => ts_ms >= self.start_ms && ts_ms < self.end_ms,
        }
    }

    /// Row index for a timestamp, or `None` if it falls outside the window
    pub fn row_index(&self, ts_ms: i64, policy: &TimeZonePolicy) -> Option<usize> {
        if !self.contains(ts_ms) || self.rows.is_empty() {
            return None;
        }
        match self.spec {
            WindowSpec::Trailing { .. } => {
                let days_ago = ((self.now_ms - ts_ms) / DAY_MS) as usize;
                // A sample exactly N*24h old lands on the boundary; keep it in the oldest row
                Some(days_ago.min(self.rows.len() - 1))
            }
            _ => {
                let date = policy.local_date(ts_ms)?;
                self.rows.iter().position(|row| *row == date)
            }
        }
    }
}

/// Weekday/weekend filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    #[default]
    All,
    Weekday,
    Weekend,
}

impl DayType {
    pub fn matches(&self, weekday: Weekday) -> bool {
        match self {
            DayType::All => true,
            DayType::Weekday => !is_weekend(weekday),
            DayType::Weekend => is_weekend(weekday),
        }
    }
}

impl fmt::Display for DayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DayType::All => "all",
            DayType::Weekday => "weekday",
            DayType::Weekend => "weekend",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DayType {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(DayType::All),
            "weekday" | "weekdays" => Ok(DayType::Weekday),
            "weekend" | "weekends" => Ok(DayType::Weekend),
            other => Err(ComputeError::ParseError(format!("Unknown day type: {}", other))),
        }
    }
}

/// Tag and day-type filter applied before any bucketing
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SampleFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub day_type: DayType,
}

impl SampleFilter {
    pub fn new(tag: Option<String>, day_type: DayType) -> Self {
        // "all" is how a missing tag filter is spelled in the UI
        let tag = tag.filter(|t| !t.is_empty() && t != "all");
        Self { tag, day_type }
    }

    pub fn is_noop(&self) -> bool {
        self.tag.is_none() && self.day_type == DayType::All
    }

    pub fn matches(&self, sample: &Sample, policy: &TimeZonePolicy) -> bool {
        if let Some(tag) = &self.tag {
            if !sample.has_tag(tag) {
                return false;
            }
        }
        if self.day_type == DayType::All {
            return true;
        }
        policy
            .weekday(sample.timestamp)
            .is_some_and(|weekday| self.day_type.matches(weekday))
    }

    /// Samples passing the filter, cloned in input order
    pub fn apply(&self, samples: &[Sample], policy: &TimeZonePolicy) -> Vec<Sample> {
        samples
            .iter()
            .filter(|s| self.matches(s, policy))
            .cloned()
            .collect()
    }
}

/// Samples in `[start_ms, end_ms)`, input order preserved
pub fn samples_in_range(samples: &[Sample], start_ms: i64, end_ms: i64) -> Vec<Sample> {
    samples
        .iter()
        .filter(|s| s.timestamp >= start_ms && s.timestamp < end_ms)
        .cloned()
        .collect()
}

/// A labelled calendar period and the samples inside it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodData {
    /// e.g. `2025-11 week 4` or `2025-11`
    pub period: String,
    pub start_ms: i64,
    pub end_ms: i64,
    /// Samples in `[start_ms, end_ms)`, ascending by timestamp
    pub samples: Vec<Sample>,
}

fn period_data(samples: &[Sample], period: String, start_ms: i64, end_ms: i64) -> PeriodData {
    let mut samples = samples_in_range(samples, start_ms, end_ms);
    samples.sort_by_key(|s| s.timestamp);
    PeriodData {
        period,
        start_ms,
        end_ms,
        samples,
    }
}

/// Week label: month of the week start and `ceil(day / 7)`
pub fn week_label(week_start: NaiveDate) -> String {
    format!(
        "{} week {}",
        format_month_key(week_start),
        week_start.day().div_ceil(7)
    )
}

/// Samples of the week starting on `week_start`
pub fn week_data(samples: &[Sample], week_start: NaiveDate, policy: &TimeZonePolicy) -> PeriodData {
    let start_ms = policy.start_of_day_millis(week_start);
    let end_ms = policy.boundary_millis(add_days(week_start, 7));
    period_data(samples, week_label(week_start), start_ms, end_ms)
}

/// Samples of the month containing `date`
pub fn month_data(samples: &[Sample], date: NaiveDate, policy: &TimeZonePolicy) -> PeriodData {
    let first = start_of_month(date);
    let start_ms = policy.start_of_day_millis(first);
    let end_ms = policy.boundary_millis(add_months(first, 1));
    period_data(samples, format_month_key(first), start_ms, end_ms)
}

/// Start dates of every week intersecting the month that contains `date`
pub fn weeks_of_month(date: NaiveDate, week_starts_on: Weekday) -> Vec<NaiveDate> {
    let first = start_of_month(date);
    let next = add_months(first, 1);
    let mut week = Some(start_of_week(first, week_starts_on));
    let mut weeks = Vec::new();
    while let Some(start) = week.filter(|w| next.map_or(true, |n| *w < n)) {
        weeks.push(start);
        week = add_days(start, 7);
    }
    weeks
}

/// Week-by-week listing of the month containing `date`
pub fn month_weeks(
    samples: &[Sample],
    date: NaiveDate,
    policy: &TimeZonePolicy,
    week_starts_on: Weekday,
) -> Vec<PeriodData> {
    weeks_of_month(date, week_starts_on)
        .into_iter()
        .map(|week| week_data(samples, week, policy))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrinityValue;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn ms(y: i32, mo: u32, d: u32, h: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap().timestamp_millis()
    }

    fn date(y: i32, mo: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap()
    }

    fn sample(ts: i64) -> Sample {
        Sample::new(ts, TrinityValue::new(5.0, 5.0, 5.0))
    }

    #[test]
    fn test_parse_window_specs() {
        assert_eq!("trailing:30".parse::<WindowSpec>().unwrap(), WindowSpec::Trailing { days: 30 });
        assert_eq!("week:-2".parse::<WindowSpec>().unwrap(), WindowSpec::CalendarWeek { offset: -2 });
        // forward paging is clamped to the current period
        assert_eq!("month:3".parse::<WindowSpec>().unwrap(), WindowSpec::CalendarMonth { offset: 0 });
        assert!("trailing:0".parse::<WindowSpec>().is_err());
        assert!("fortnight:1".parse::<WindowSpec>().is_err());
        assert!("week".parse::<WindowSpec>().is_err());
    }

    #[test]
    fn test_paging_never_passes_current_week() {
        let spec = WindowSpec::CalendarWeek { offset: -1 };
        assert_eq!(spec.paged(1), WindowSpec::CalendarWeek { offset: 0 });
        assert_eq!(spec.paged(1).paged(1), WindowSpec::CalendarWeek { offset: 0 });
        assert_eq!(spec.paged(-1), WindowSpec::CalendarWeek { offset: -2 });
    }

    #[test]
    fn test_trailing_window_bounds_and_rows() {
        let now = ms(2025, 11, 20, 12);
        let window = WindowSpec::Trailing { days: 7 }.resolve(now, &TimeZonePolicy::Utc, Weekday::Sun);

        assert_eq!(window.rows.len(), 7);
        assert_eq!(window.rows[0], date(2025, 11, 20));
        assert_eq!(window.rows[6], date(2025, 11, 14));

        assert_eq!(window.row_index(now, &TimeZonePolicy::Utc), Some(0));
        assert_eq!(window.row_index(now - DAY_MS - 1, &TimeZonePolicy::Utc), Some(1));
        // exactly 7x24h old: included, clamped into the oldest row
        assert_eq!(window.row_index(now - 7 * DAY_MS, &TimeZonePolicy::Utc), Some(6));
        assert_eq!(window.row_index(now - 7 * DAY_MS - 1, &TimeZonePolicy::Utc), None);
        // future samples are skipped
        assert_eq!(window.row_index(now + 1, &TimeZonePolicy::Utc), None);
    }

    #[test]
    fn test_calendar_week_window() {
        // 2025-11-20 is a Thursday; the Sunday-start week begins 2025-11-16
        let now = ms(2025, 11, 20, 12);
        let window = WindowSpec::CalendarWeek { offset: 0 }.resolve(now, &TimeZonePolicy::Utc, Weekday::Sun);

        assert_eq!(window.rows[0], date(2025, 11, 16));
        assert_eq!(window.start_ms, ms(2025, 11, 16, 0));
        assert_eq!(window.end_ms, ms(2025, 11, 23, 0));
        assert_eq!(window.row_index(ms(2025, 11, 16, 0), &TimeZonePolicy::Utc), Some(0));
        assert_eq!(window.row_index(ms(2025, 11, 23, 0), &TimeZonePolicy::Utc), None);

        let previous = WindowSpec::CalendarWeek { offset: -1 }.resolve(now, &TimeZonePolicy::Utc, Weekday::Sun);
        assert_eq!(previous.rows[0], date(2025, 11, 9));
        assert_eq!(previous.end_ms, window.start_ms);

        let clamped = WindowSpec::CalendarWeek { offset: 4 }.resolve(now, &TimeZonePolicy::Utc, Weekday::Sun);
        assert_eq!(clamped.start_ms, window.start_ms);
    }

    #[test]
    fn test_calendar_month_window() {
        let now = ms(2025, 3, 10, 12);
        let window = WindowSpec::CalendarMonth { offset: -1 }.resolve(now, &TimeZonePolicy::Utc, Weekday::Sun);
        assert_eq!(window.rows.len(), 28);
        assert_eq!(window.rows[0], date(2025, 2, 1));
        assert_eq!(window.end_ms, ms(2025, 3, 1, 0));
    }

    #[test]
    fn test_filter_by_tag_and_day_type() {
        // 2025-11-22 is a Saturday, 2025-11-20 a Thursday
        let weekend = sample(ms(2025, 11, 22, 10)).with_tags(["gym"]);
        let weekday = sample(ms(2025, 11, 20, 10)).with_tags(["work", "gym"]);
        let samples = vec![weekend, weekday];

        let gym_weekend = SampleFilter::new(Some("gym".to_string()), DayType::Weekend);
        assert_eq!(gym_weekend.apply(&samples, &TimeZonePolicy::Utc).len(), 1);

        let work = SampleFilter::new(Some("work".to_string()), DayType::Weekend);
        assert!(work.apply(&samples, &TimeZonePolicy::Utc).is_empty());

        let all = SampleFilter::new(Some("all".to_string()), DayType::All);
        assert!(all.is_noop());
        assert_eq!(all.apply(&samples, &TimeZonePolicy::Utc).len(), 2);
    }

    #[test]
    fn test_week_and_month_period_data() {
        let samples = vec![
            sample(ms(2025, 11, 25, 9)),
            sample(ms(2025, 11, 23, 0)),
            sample(ms(2025, 11, 30, 0)),
            sample(ms(2025, 12, 1, 0)),
        ];

        let week = week_data(&samples, date(2025, 11, 23), &TimeZonePolicy::Utc);
        assert_eq!(week.period, "2025-11 week 4");
        let ts: Vec<i64> = week.samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![ms(2025, 11, 23, 0), ms(2025, 11, 25, 9)]);

        let month = month_data(&samples, date(2025, 11, 5), &TimeZonePolicy::Utc);
        assert_eq!(month.period, "2025-11");
        assert_eq!(month.samples.len(), 3);
        assert_eq!(month.end_ms, ms(2025, 12, 1, 0));
    }

    #[test]
    fn test_weeks_of_month() {
        let weeks = weeks_of_month(date(2025, 11, 15), Weekday::Sun);
        assert_eq!(weeks.first(), Some(&date(2025, 10, 26)));
        assert_eq!(weeks.last(), Some(&date(2025, 11, 30)));
        assert_eq!(weeks.len(), 6);
    }

    #[test]
    fn test_month_weeks_listing() {
        let samples = vec![
            sample(ms(2025, 11, 1, 8)),
            sample(ms(2025, 11, 30, 8)),
            sample(ms(2025, 12, 1, 8)),
        ];
        let weeks = month_weeks(&samples, date(2025, 11, 15), &TimeZonePolicy::Utc, Weekday::Sun);

        let labels: Vec<&str> = weeks.iter().map(|w| w.period.as_str()).collect();
        assert_eq!(labels.first(), Some(&"2025-10 week 4"));
        assert_eq!(labels.last(), Some(&"2025-11 week 5"));
        let counts: Vec<usize> = weeks.iter().map(|w| w.samples.len()).collect();
        assert_eq!(counts, vec![1, 0, 0, 0, 0, 2]);
        assert_eq!(weeks[1].start_ms, weeks[0].end_ms);
    }

    #[test]
    fn test_windows_truncate_at_end_of_calendar() {
        let now = DateTime::<Utc>::MAX_UTC.timestamp_millis();

        let week = WindowSpec::CalendarWeek { offset: 0 }.resolve(now, &TimeZonePolicy::Utc, Weekday::Sun);
        assert!(!week.rows.is_empty() && week.rows.len() <= 7);
        assert_eq!(week.rows.last(), Some(&NaiveDate::MAX));
        assert_eq!(week.end_ms, i64::MAX);
        assert!(week.contains(now));

        let month = WindowSpec::CalendarMonth { offset: 0 }.resolve(now, &TimeZonePolicy::Utc, Weekday::Sun);
        assert_eq!(month.rows.len(), 31);
        assert_eq!(month.end_ms, i64::MAX);

        let far_back = WindowSpec::CalendarWeek { offset: i32::MIN }.resolve(now, &TimeZonePolicy::Utc, Weekday::Sun);
        assert!(far_back.rows.is_empty());
        assert!(weeks_of_month(NaiveDate::MAX, Weekday::Sun).len() >= 4);
    }

    #[test]
    fn test_day_type_parse() {
        assert_eq!("Weekend".parse::<DayType>().unwrap(), DayType::Weekend);
        assert!("holiday".parse::<DayType>().is_err());
    }
}
