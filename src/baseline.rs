//! Dynamic baseline curves
//!
//! This module reconstructs a smooth 24-hour "what is typical at hour H"
//! curve per dimension from sparse samples. Missing hours are interpolated
//! and the curve is smoothed circularly so 23:00 and 00:00 join cleanly.

use crate::timezone::{TimeZonePolicy, DAY_MS};
use crate::types::{BaselinePoint, Dimension, Sample};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Number of hours in the curve
pub const HOURS_PER_DAY: usize = 24;

/// Smoothing window size
pub const DEFAULT_SMOOTHING_WINDOW: usize = 3;

/// Hours wrapped onto each end before smoothing
const WRAP_HOURS: usize = 3;

/// Anchor used when no earlier hour has data
const DEFAULT_ANCHOR: f64 = 5.0;

/// Trailing window for the weekly trend check
const WEEKLY_TREND_DAYS: i64 = 7;

/// Moving average; each output is the mean of the window clipped to the slice bounds.
pub fn smooth_data(data: &[f64], window_size: usize) -> Vec<f64> {
    let before = window_size / 2;
    let after = window_size.div_ceil(2);

    (0..data.len())
        .map(|idx| {
            let start = idx.saturating_sub(before);
            let end = (idx + after).min(data.len());
            let window = &data[start..end];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}

/// Plain per-hour mean of the finite values; `None` for hours without data
pub fn hourly_means(
    history: &[Sample],
    dimension: Dimension,
    policy: &TimeZonePolicy,
) -> [Option<f64>; HOURS_PER_DAY] {
    let mut sums = [0.0_f64; HOURS_PER_DAY];
    let mut counts = [0_u32; HOURS_PER_DAY];
    let mut dropped = 0_usize;

    for sample in history {
        let (Some(value), Some(hour)) = (
            sample.values.finite(dimension),
            policy.hour_of_day(sample.timestamp),
        ) else {
            dropped += 1;
            continue;
        };
        sums[hour as usize] += value;
        counts[hour as usize] += 1;
    }

    if dropped > 0 {
        warn!(
            dropped,
            dimension = dimension.label(),
            "skipped samples with missing values or invalid timestamps"
        );
    }

    let mut means = [None; HOURS_PER_DAY];
    for hour in 0..HOURS_PER_DAY {
        if counts[hour] > 0 {
            means[hour] = Some(sums[hour] / counts[hour] as f64);
        }
    }
    means
}

/// Fill gaps left to right with the average of the previous and next known hours.
///
/// "Previous" includes hours filled earlier in the same pass; with none it
/// defaults to 5. "Next" only sees original values and falls back to the
/// previous anchor. No wrap-around at this stage.
fn fill_missing(raw: &[Option<f64>; HOURS_PER_DAY]) -> [f64; HOURS_PER_DAY] {
    let mut filled = *raw;

    for hour in 0..HOURS_PER_DAY {
        if filled[hour].is_some() {
            continue;
        }
        let prev = filled[..hour]
            .iter()
            .rev()
            .find_map(|v| *v)
            .unwrap_or(DEFAULT_ANCHOR);
        let next = filled[hour + 1..].iter().find_map(|v| *v).unwrap_or(prev);
        filled[hour] = Some((prev + next) / 2.0);
    }

    filled.map(|v| v.unwrap_or(DEFAULT_ANCHOR))
}

/// Build the 24-point expected-value curve for one dimension.
///
/// Callers should fall back to the standard curve when `history` is empty;
/// an empty history here yields a flat curve at the default anchor.
pub fn calculate_dynamic_baseline(
    history: &[Sample],
    dimension: Dimension,
    policy: &TimeZonePolicy,
) -> Vec<BaselinePoint> {
    let filled = fill_missing(&hourly_means(history, dimension, policy));

    let mut extended = Vec::with_capacity(HOURS_PER_DAY + 2 * WRAP_HOURS);
    extended.extend_from_slice(&filled[HOURS_PER_DAY - WRAP_HOURS..]);
    extended.extend_from_slice(&filled);
    extended.extend_from_slice(&filled[..WRAP_HOURS]);

    let smoothed = smooth_data(&extended, DEFAULT_SMOOTHING_WINDOW);

    smoothed[WRAP_HOURS..WRAP_HOURS + HOURS_PER_DAY]
        .iter()
        .enumerate()
        .map(|(hour, value)| BaselinePoint {
            hour: hour as u32,
            value: *value,
        })
        .collect()
}

/// Baseline curves for all three dimensions, computed from one history window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicBaseline {
    pub p: Vec<BaselinePoint>,
    pub c: Vec<BaselinePoint>,
    pub s: Vec<BaselinePoint>,
    /// Number of history samples the curves were built from
    pub sample_count: usize,
}

impl DynamicBaseline {
    /// Compute curves for every dimension.
    ///
    /// A dimension whose history has no finite values gets an empty curve so
    /// lookups fall back to the standard reference.
    pub fn from_history(history: &[Sample], policy: &TimeZonePolicy) -> Self {
        let curve = |dimension: Dimension| {
            if history.iter().any(|s| s.values.finite(dimension).is_some()) {
                calculate_dynamic_baseline(history, dimension, policy)
            } else {
                Vec::new()
            }
        };

        debug!(samples = history.len(), "computed dynamic baseline");

        Self {
            p: curve(Dimension::Physical),
            c: curve(Dimension::Cognitive),
            s: curve(Dimension::Impulse),
            sample_count: history.len(),
        }
    }

    pub fn curve(&self, dimension: Dimension) -> &[BaselinePoint] {
        match dimension {
            Dimension::Physical => &self.p,
            Dimension::Cognitive => &self.c,
            Dimension::Impulse => &self.s,
        }
    }

    /// Curve value at `hour`, if this dimension has a curve
    pub fn value_at(&self, dimension: Dimension, hour: u32) -> Option<f64> {
        self.curve(dimension)
            .iter()
            .find(|point| point.hour == hour)
            .map(|point| point.value)
    }

    /// Load curves from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize curves to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Classification of the trailing week's physical average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStatus {
    Normal,
    BurnoutRisk,
    ManicRisk,
}

/// Result of [`analyze_weekly_trend`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeeklyTrend {
    pub status: TrendStatus,
    /// Mean P over the trailing seven days
    pub average: f64,
    pub sample_count: usize,
}

/// Flag burnout (mean P < 3) or manic (mean P > 8) risk over `[now - 7d, now]`
pub fn analyze_weekly_trend(samples: &[Sample], now_ms: i64) -> WeeklyTrend {
    let start = now_ms - WEEKLY_TREND_DAYS * DAY_MS;
    let values: Vec<f64> = samples
        .iter()
        .filter(|s| s.timestamp >= start && s.timestamp <= now_ms)
        .filter_map(|s| s.values.finite(Dimension::Physical))
        .collect();

    if values.is_empty() {
        return WeeklyTrend {
            status: TrendStatus::Normal,
            average: DEFAULT_ANCHOR,
            sample_count: 0,
        };
    }

    let average = values.iter().sum::<f64>() / values.len() as f64;
    let status = if average > 8.0 {
        TrendStatus::ManicRisk
    } else if average < 3.0 {
        TrendStatus::BurnoutRisk
    } else {
        TrendStatus::Normal
    };

    WeeklyTrend {
        status,
        average,
        sample_count: values.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timezone::HOUR_MS;
    use crate::types::TrinityValue;

    const EPS: f64 = 1e-9;

    fn at_hour(day: i64, hour: i64, p: f64) -> Sample {
        let mut sample = Sample::new(day * DAY_MS + hour * HOUR_MS, TrinityValue::new(p, p, p));
        sample.values = TrinityValue::new(p, p, p);
        sample
    }

    #[test]
    fn test_smooth_data_clips_window() {
        let smoothed = smooth_data(&[0.0, 3.0, 6.0], 3);
        assert!((smoothed[0] - 1.5).abs() < EPS);
        assert!((smoothed[1] - 3.0).abs() < EPS);
        assert!((smoothed[2] - 4.5).abs() < EPS);
    }

    #[test]
    fn test_baseline_has_24_hours_once() {
        let history = vec![at_hour(0, 9, 8.0)];
        let curve = calculate_dynamic_baseline(&history, Dimension::Physical, &TimeZonePolicy::Utc);

        assert_eq!(curve.len(), 24);
        for (idx, point) in curve.iter().enumerate() {
            assert_eq!(point.hour, idx as u32);
            assert!(point.value.is_finite());
            assert!(point.value >= 0.0);
        }
    }

    #[test]
    fn test_flat_history_stays_flat() {
        let history: Vec<Sample> = (0..24).map(|h| at_hour(0, h, 6.0)).collect();
        let curve = calculate_dynamic_baseline(&history, Dimension::Cognitive, &TimeZonePolicy::Utc);
        assert!(curve.iter().all(|p| (p.value - 6.0).abs() < EPS));
    }

    #[test]
    fn test_fill_missing_uses_filled_previous() {
        let mut raw = [None; HOURS_PER_DAY];
        raw[2] = Some(9.0);

        let filled = fill_missing(&raw);
        // hour 0: prev default 5, next 9 -> 7
        assert!((filled[0] - 7.0).abs() < EPS);
        // hour 1: prev is the filled 7, next 9 -> 8
        assert!((filled[1] - 8.0).abs() < EPS);
        assert!((filled[2] - 9.0).abs() < EPS);
        // trailing gap: next falls back to prev
        assert!((filled[3] - 9.0).abs() < EPS);
        assert!((filled[23] - 9.0).abs() < EPS);
    }

    #[test]
    fn test_hourly_means_are_plain_means() {
        let history = vec![at_hour(0, 10, 4.0), at_hour(1, 10, 6.0), at_hour(2, 10, 8.0)];
        let means = hourly_means(&history, Dimension::Physical, &TimeZonePolicy::Utc);
        assert_eq!(means[10], Some(6.0));
        assert_eq!(means[11], None);
    }

    #[test]
    fn test_non_finite_values_are_ignored() {
        let mut broken = at_hour(0, 10, 6.0);
        broken.values.p = f64::NAN;
        let history = vec![broken, at_hour(1, 10, 4.0)];
        let means = hourly_means(&history, Dimension::Physical, &TimeZonePolicy::Utc);
        assert_eq!(means[10], Some(4.0));
    }

    #[test]
    fn test_wrap_around_smoothing() {
        // Only midnight is high; hour 23 should be lifted by the wrap
        let mut history: Vec<Sample> = (0..24).map(|h| at_hour(0, h, 2.0)).collect();
        history[0].values.s = 8.0;
        let curve = calculate_dynamic_baseline(&history, Dimension::Impulse, &TimeZonePolicy::Utc);
        assert!((curve[23].value - 4.0).abs() < EPS);
        assert!((curve[0].value - 4.0).abs() < EPS);
        assert!((curve[12].value - 2.0).abs() < EPS);
    }

    #[test]
    fn test_dynamic_baseline_missing_dimension_has_empty_curve() {
        let mut sample = at_hour(0, 8, 7.0);
        sample.values.c = f64::NAN;
        let baseline = DynamicBaseline::from_history(&[sample], &TimeZonePolicy::Utc);

        assert_eq!(baseline.p.len(), 24);
        assert!(baseline.c.is_empty());
        assert_eq!(baseline.value_at(Dimension::Cognitive, 8), None);

        let restored = DynamicBaseline::from_json(&baseline.to_json().unwrap()).unwrap();
        assert_eq!(restored, baseline);
    }

    #[test]
    fn test_weekly_trend() {
        let now = 10 * DAY_MS;
        assert_eq!(analyze_weekly_trend(&[], now).status, TrendStatus::Normal);
        assert_eq!(analyze_weekly_trend(&[], now).average, 5.0);

        let low = vec![at_hour(9, 0, 2.0), at_hour(8, 0, 2.5)];
        let trend = analyze_weekly_trend(&low, now);
        assert_eq!(trend.status, TrendStatus::BurnoutRisk);
        assert_eq!(trend.sample_count, 2);

        let high = vec![at_hour(9, 0, 9.0), at_hour(1, 0, 1.0)];
        let trend = analyze_weekly_trend(&high, now);
        assert_eq!(trend.status, TrendStatus::ManicRisk);
        assert!((trend.average - 9.0).abs() < EPS);
    }
}
