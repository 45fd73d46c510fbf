//! Period and seasonal summaries
//!
//! Simple arithmetic means over coarse buckets ("today", trailing 7/30 days,
//! all-time, calendar seasons) and the plain-text context handed to an
//! external narrative generator.

use crate::timezone::{add_days, TimeZonePolicy, DAY_MS};
use crate::types::{clamp_score, CalendarEvent, Dimension, PeriodSummary, Sample, TrinityValue};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Meteorological season of a local month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Winter, Season::Spring, Season::Summer, Season::Autumn];

    /// Season of a zero-based month (0 = January)
    pub fn from_month0(month0: u32) -> Self {
        match month0 {
            2..=4 => Season::Spring,
            5..=7 => Season::Summer,
            8..=10 => Season::Autumn,
            _ => Season::Winter,
        }
    }

    /// Season of the local month containing `ts_ms`
    pub fn of(ts_ms: i64, policy: &TimeZonePolicy) -> Option<Self> {
        policy.local_date(ts_ms).map(|d| Self::from_month0(d.month0()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
        }
    }
}

/// A named group of samples to average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodBucket {
    /// The local calendar day containing "now"
    Today,
    /// `[now - 7d, now]`
    Last7Days,
    /// `[now - 30d, now]`
    Last30Days,
    AllTime,
    Season(Season),
}

impl PeriodBucket {
    /// The buckets shown in the narrative summary
    pub const NARRATIVE: [PeriodBucket; 3] = [
        PeriodBucket::Today,
        PeriodBucket::Last7Days,
        PeriodBucket::Last30Days,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PeriodBucket::Today => "today",
            PeriodBucket::Last7Days => "last 7 days",
            PeriodBucket::Last30Days => "last 30 days",
            PeriodBucket::AllTime => "all time",
            PeriodBucket::Season(season) => season.as_str(),
        }
    }

    pub fn contains(&self, ts_ms: i64, now_ms: i64, policy: &TimeZonePolicy) -> bool {
        match self {
            PeriodBucket::Today => match policy.local_date(now_ms) {
                Some(today) => {
                    let start = policy.start_of_day_millis(today);
                    let end = policy.boundary_millis(add_days(today, 1));
                    ts_ms >= start && ts_ms < end
                }
                None => false,
            },
            PeriodBucket::Last7Days => ts_ms >= now_ms - 7 * DAY_MS && ts_ms <= now_ms,
            PeriodBucket::Last30Days => ts_ms >= now_ms - 30 * DAY_MS && ts_ms <= now_ms,
            PeriodBucket::AllTime => true,
            PeriodBucket::Season(season) => Season::of(ts_ms, policy) == Some(*season),
        }
    }
}

impl fmt::Display for PeriodBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Arithmetic mean per dimension over `samples`.
///
/// Non-finite values are dropped per dimension; samples with no finite value
/// are not counted. An empty set yields zeros with `count == 0`.
pub fn mean_summary(label: impl Into<String>, samples: &[&Sample]) -> PeriodSummary {
    let mut sum = [0.0_f64; 3];
    let mut n = [0_usize; 3];
    let mut count = 0;

    for sample in samples {
        let mut any = false;
        for (idx, dimension) in Dimension::ALL.iter().enumerate() {
            if let Some(v) = sample.values.finite(*dimension) {
                sum[idx] += v;
                n[idx] += 1;
                any = true;
            }
        }
        if any {
            count += 1;
        }
    }

    let mean = |idx: usize| {
        if n[idx] == 0 {
            0.0
        } else {
            clamp_score(sum[idx] / n[idx] as f64).unwrap_or(0.0)
        }
    };

    PeriodSummary {
        label: label.into(),
        mean: TrinityValue::new(mean(0), mean(1), mean(2)),
        count,
    }
}

/// Summarize the samples falling in one bucket
pub fn summarize_period(
    samples: &[Sample],
    bucket: PeriodBucket,
    now_ms: i64,
    policy: &TimeZonePolicy,
) -> PeriodSummary {
    let selected: Vec<&Sample> = samples
        .iter()
        .filter(|s| bucket.contains(s.timestamp, now_ms, policy))
        .collect();
    mean_summary(bucket.label(), &selected)
}

/// Summaries for several buckets, in the given order
pub fn summarize_periods(
    samples: &[Sample],
    buckets: &[PeriodBucket],
    now_ms: i64,
    policy: &TimeZonePolicy,
) -> Vec<PeriodSummary> {
    buckets
        .iter()
        .map(|bucket| summarize_period(samples, *bucket, now_ms, policy))
        .collect()
}

/// One summary per season across all samples, winter first
pub fn summarize_seasons(samples: &[Sample], policy: &TimeZonePolicy) -> Vec<PeriodSummary> {
    let mut groups: [Vec<&Sample>; 4] = Default::default();
    for sample in samples {
        if let Some(season) = Season::of(sample.timestamp, policy) {
            groups[season as usize].push(sample);
        }
    }

    Season::ALL
        .iter()
        .zip(groups.iter())
        .map(|(season, group)| mean_summary(season.as_str(), group))
        .collect()
}

/// `label: avg P:x C:y S:z, samples N` or `label: insufficient data`
pub fn render_summary_line(summary: &PeriodSummary) -> String {
    if summary.count == 0 {
        return format!("{}: insufficient data", summary.label);
    }
    format!(
        "{}: avg P:{:.1} C:{:.1} S:{:.1}, samples {}",
        summary.label, summary.mean.p, summary.mean.c, summary.mean.s, summary.count
    )
}

fn format_score(value: f64) -> String {
    match clamp_score(value) {
        Some(v) if v.fract() == 0.0 => format!("{}", v as i64),
        Some(v) => format!("{:.1}", v),
        None => "-".to_string(),
    }
}

/// One line per sample: `[HH:MM] P:x C:y S:z (tags)`
pub fn render_recent_samples(samples: &[Sample], policy: &TimeZonePolicy) -> String {
    samples
        .iter()
        .map(|s| {
            format!(
                "[{}] P:{} C:{} S:{} ({})",
                policy.format_hm(s.timestamp),
                format_score(s.values.p),
                format_score(s.values.c),
                format_score(s.values.s),
                s.tags.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Events starting within the next 24h, sorted, one `[HH:MM] title` per line
pub fn render_upcoming_events(
    events: &[CalendarEvent],
    now_ms: i64,
    policy: &TimeZonePolicy,
) -> String {
    let mut upcoming: Vec<&CalendarEvent> = events
        .iter()
        .filter(|e| e.start_time >= now_ms && e.start_time < now_ms + DAY_MS)
        .collect();
    upcoming.sort_by_key(|e| e.start_time);

    upcoming
        .iter()
        .map(|e| format!("[{}] {}", policy.format_hm(e.start_time), e.title))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sections of the narrative prompt context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptContext {
    /// Samples from the last 24 hours
    pub recent: String,
    pub weekly: String,
    pub calendar: String,
    /// Today / 7 days / 30 days lines
    pub summary: String,
    pub seasons: String,
}

impl PromptContext {
    pub fn build(
        samples: &[Sample],
        events: &[CalendarEvent],
        now_ms: i64,
        policy: &TimeZonePolicy,
    ) -> Self {
        let mut recent: Vec<Sample> = samples
            .iter()
            .filter(|s| s.timestamp >= now_ms - DAY_MS && s.timestamp <= now_ms)
            .cloned()
            .collect();
        recent.sort_by_key(|s| s.timestamp);

        let summaries = summarize_periods(samples, &PeriodBucket::NARRATIVE, now_ms, policy);
        let weekly = summarize_period(samples, PeriodBucket::Last7Days, now_ms, policy);

        debug!(
            recent = recent.len(),
            events = events.len(),
            "built prompt context"
        );

        Self {
            recent: render_recent_samples(&recent, policy),
            weekly: render_summary_line(&weekly),
            calendar: render_upcoming_events(events, now_ms, policy),
            summary: summaries
                .iter()
                .map(render_summary_line)
                .collect::<Vec<_>>()
                .join("\n"),
            seasons: summarize_seasons(samples, policy)
                .iter()
                .map(render_summary_line)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Human-readable text for the narrative generator
    pub fn render(&self) -> String {
        let or = |text: &str, fallback: &str| {
            if text.is_empty() {
                fallback.to_string()
            } else {
                text.to_string()
            }
        };
        format!(
            "[Last 24 hours]\n{}\n\n[Last 7 days]\n{}\n\n[Upcoming events]\n{}\n\n[Summary (day/week/month)]\n{}\n\n[Seasons]\n{}\n",
            or(&self.recent, "No data"),
            or(&self.weekly, "No weekly data available."),
            or(&self.calendar, "No events in next 24h."),
            or(&self.summary, "No summary"),
            or(&self.seasons, "No seasonal data"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timezone::HOUR_MS;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn ms(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().timestamp_millis()
    }

    fn sample(ts: i64, p: f64, c: f64, s: f64) -> Sample {
        let mut sample = Sample::new(ts, TrinityValue::new(p, c, s));
        sample.values = TrinityValue::new(p, c, s);
        sample
    }

    #[test]
    fn test_season_mapping() {
        assert_eq!(Season::of(ms(2025, 1, 15, 12, 0), &TimeZonePolicy::Utc), Some(Season::Winter));
        assert_eq!(Season::of(ms(2025, 7, 15, 12, 0), &TimeZonePolicy::Utc), Some(Season::Summer));
        assert_eq!(Season::from_month0(11), Season::Winter);
        assert_eq!(Season::from_month0(2), Season::Spring);
        assert_eq!(Season::from_month0(10), Season::Autumn);
    }

    #[test]
    fn test_season_uses_local_month() {
        // 2025-02-28 20:00 UTC is already March in +08:00
        let ts = ms(2025, 2, 28, 20, 0);
        let east: TimeZonePolicy = "+08:00".parse().unwrap();
        assert_eq!(Season::of(ts, &TimeZonePolicy::Utc), Some(Season::Winter));
        assert_eq!(Season::of(ts, &east), Some(Season::Spring));
    }

    #[test]
    fn test_seasonal_summaries() {
        let samples = vec![
            sample(ms(2025, 1, 10, 9, 0), 4.0, 6.0, 2.0),
            sample(ms(2025, 12, 10, 9, 0), 6.0, 8.0, 4.0),
            sample(ms(2025, 7, 10, 9, 0), 9.0, 9.0, 9.0),
        ];
        let seasons = summarize_seasons(&samples, &TimeZonePolicy::Utc);

        assert_eq!(seasons.len(), 4);
        assert_eq!(seasons[0].label, "winter");
        assert_eq!(seasons[0].count, 2);
        assert_eq!(seasons[0].mean, TrinityValue::new(5.0, 7.0, 3.0));
        assert_eq!(seasons[1].count, 0);
        assert_eq!(seasons[1].mean, TrinityValue::new(0.0, 0.0, 0.0));
        assert_eq!(seasons[2].count, 1);
    }

    #[test]
    fn test_period_buckets() {
        let now = ms(2025, 11, 20, 12, 0);
        let samples = vec![
            sample(ms(2025, 11, 20, 1, 0), 8.0, 8.0, 8.0),
            sample(now - 3 * DAY_MS, 4.0, 4.0, 4.0),
            sample(now - 20 * DAY_MS, 2.0, 2.0, 2.0),
            sample(now - 40 * DAY_MS, 1.0, 1.0, 1.0),
        ];

        let summaries = summarize_periods(
            &samples,
            &[
                PeriodBucket::Today,
                PeriodBucket::Last7Days,
                PeriodBucket::Last30Days,
                PeriodBucket::AllTime,
            ],
            now,
            &TimeZonePolicy::Utc,
        );
        let counts: Vec<usize> = summaries.iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![1, 2, 3, 4]);
        assert_eq!(summaries[1].mean.p, 6.0);
    }

    #[test]
    fn test_mean_skips_non_finite() {
        let a = sample(0, f64::NAN, 4.0, 4.0);
        let b = sample(1, 6.0, 6.0, 6.0);
        let c = sample(2, f64::NAN, f64::NAN, f64::NAN);
        let summary = mean_summary("x", &[&a, &b, &c]);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.mean, TrinityValue::new(6.0, 5.0, 5.0));
    }

    #[test]
    fn test_render_lines() {
        let empty = mean_summary("today", &[]);
        assert_eq!(render_summary_line(&empty), "today: insufficient data");

        let s = sample(ms(2025, 11, 20, 9, 5), 7.0, 6.5, 3.0).with_tags(["coffee", "work"]);
        let summary = mean_summary("today", &[&s]);
        assert_eq!(
            render_summary_line(&summary),
            "today: avg P:7.0 C:6.5 S:3.0, samples 1"
        );
        assert_eq!(
            render_recent_samples(&[s], &TimeZonePolicy::Utc),
            "[09:05] P:7 C:6.5 S:3 (coffee, work)"
        );
    }

    #[test]
    fn test_upcoming_events_within_24h() {
        let now = ms(2025, 11, 20, 12, 0);
        let event = |id: &str, start: i64| CalendarEvent {
            id: id.to_string(),
            title: format!("event {}", id),
            start_time: start,
            end_time: start + HOUR_MS,
            description: None,
            log_id: None,
        };
        let events = vec![
            event("late", now + 5 * HOUR_MS),
            event("early", now + HOUR_MS),
            event("past", now - HOUR_MS),
            event("tomorrow", now + DAY_MS),
        ];

        assert_eq!(
            render_upcoming_events(&events, now, &TimeZonePolicy::Utc),
            "[13:00] event early\n[17:00] event late"
        );
    }

    #[test]
    fn test_prompt_context_sections() {
        let now = ms(2025, 11, 20, 12, 0);
        let samples = vec![
            sample(now - 2 * HOUR_MS, 6.0, 6.0, 6.0),
            sample(now - 2 * DAY_MS, 4.0, 4.0, 4.0),
        ];
        let context = PromptContext::build(&samples, &[], now, &TimeZonePolicy::Utc);

        assert_eq!(context.recent, "[10:00] P:6 C:6 S:6 ()");
        assert_eq!(context.weekly, "last 7 days: avg P:5.0 C:5.0 S:5.0, samples 2");
        assert!(context.calendar.is_empty());

        let text = context.render();
        assert!(text.contains("[Upcoming events]\nNo events in next 24h."));
        assert!(text.contains("today: avg P:6.0"));
        assert!(text.contains("autumn: avg"));
    }
}
