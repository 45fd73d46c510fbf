//! Chart series composition
//!
//! Merges one day's actual samples, the standard circadian reference curve
//! and the dynamic baseline into 48 aligned 30-minute slots.

use crate::baseline::DynamicBaseline;
use crate::timezone::{TimeZonePolicy, HOUR_MS};
use crate::types::{clamp_score, ChartDataPoint, Dimension, Sample, TrinityValue};
use chrono::{NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Slot width in milliseconds
pub const SLOT_MS: i64 = HOUR_MS / 2;

/// Slots per chart day
pub const SLOTS_PER_DAY: usize = 48;

/// Half-width of the window that matches a sample to a slot
pub const MATCH_TOLERANCE_MS: i64 = 15 * 60 * 1000;

/// Deltas smaller than this are reported as "close to baseline"
pub const CLOSE_TO_BASELINE: f64 = 0.2;

/// Fixed circadian reference value for a fractional hour of day
pub fn standard_value(hour: f64, dimension: Dimension) -> f64 {
    match dimension {
        Dimension::Physical => {
            if hour < 6.0 {
                2.0
            } else if hour < 12.0 {
                2.0 + (hour - 6.0) * 1.3
            } else if hour < 15.0 {
                8.0
            } else if hour < 18.0 {
                9.0
            } else {
                9.0 - (hour - 18.0) * 1.2
            }
        }
        Dimension::Cognitive => {
            if hour < 5.0 {
                1.0
            } else if hour < 11.0 {
                9.0
            } else if hour < 14.0 {
                5.0
            } else if hour < 17.0 {
                8.0
            } else {
                4.0
            }
        }
        Dimension::Impulse => {
            if hour < 8.0 {
                7.0
            } else if hour < 20.0 {
                3.0
            } else {
                8.0
            }
        }
    }
}

/// Start timestamps of the 48 slots of `day`, anchored to local midnight.
///
/// Slots advance in fixed 30-minute steps, so on DST transition days the
/// labels follow the wall clock while the spacing stays uniform.
pub fn time_slots(day: NaiveDate, policy: &TimeZonePolicy) -> Vec<i64> {
    let start = policy.start_of_day_millis(day);
    (0..SLOTS_PER_DAY as i64).map(|i| start + i * SLOT_MS).collect()
}

fn find_actual(samples: &[Sample], slot: i64) -> Option<&Sample> {
    samples.iter().find(|s| {
        s.timestamp >= slot - MATCH_TOLERANCE_MS && s.timestamp < slot + MATCH_TOLERANCE_MS
    })
}

/// Compose the chart series for `day`.
///
/// `today` supplies actual readings; `history` feeds the dynamic baseline.
/// An empty history, or a dimension without finite history values, uses the
/// standard curve as its baseline.
///
/// A reading matches a slot when it lies in `[slot - 15min, slot + 15min)`.
/// A reading exactly on a quarter-hour boundary (:15 or :45) therefore goes
/// to the later slot; a strict `|ts - slot| < 15min` test would drop it. A
/// reading at 23:45 or later belongs to the next day's first slot and does
/// not appear.
pub fn process_chart_data(
    today: &[Sample],
    history: &[Sample],
    day: NaiveDate,
    policy: &TimeZonePolicy,
) -> Vec<ChartDataPoint> {
    let baseline = DynamicBaseline::from_history(history, policy);

    let points: Vec<ChartDataPoint> = time_slots(day, policy)
        .into_iter()
        .map(|slot| {
            let (hour, hour_float) = policy
                .to_local(slot)
                .map(|t| (t.hour(), t.hour() as f64 + t.minute() as f64 / 60.0))
                .unwrap_or((0, 0.0));

            let standard = TrinityValue::from_fn(|d| standard_value(hour_float, d));
            let baseline_values = TrinityValue::from_fn(|d| {
                baseline
                    .value_at(d, hour)
                    .and_then(clamp_score)
                    .unwrap_or_else(|| standard.get(d))
            });
            let log = find_actual(today, slot);
            let actual = |d: Dimension| log.and_then(|s| s.values.finite(d)).and_then(clamp_score);

            ChartDataPoint {
                time: policy.format_hm(slot),
                timestamp: slot,
                p_standard: standard.p,
                p_baseline: baseline_values.p,
                p_actual: actual(Dimension::Physical),
                c_standard: standard.c,
                c_baseline: baseline_values.c,
                c_actual: actual(Dimension::Cognitive),
                s_standard: standard.s,
                s_baseline: baseline_values.s,
                s_actual: actual(Dimension::Impulse),
            }
        })
        .collect();

    debug!(
        today = today.len(),
        history = history.len(),
        slots = points.len(),
        "composed chart series"
    );

    points
}

/// How a reading compares with the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaDirection {
    Above,
    Below,
    CloseToBaseline,
}

/// Insight derived from the most recent slot with an actual reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaInsight {
    pub time: String,
    pub timestamp: i64,
    pub deltas: TrinityValue,
    /// Dimension with the largest absolute delta
    pub dominant: Dimension,
    pub direction: DeltaDirection,
}

impl DeltaInsight {
    pub fn describe(&self) -> String {
        let delta = self.deltas.get(self.dominant);
        match self.direction {
            DeltaDirection::CloseToBaseline => {
                format!("{} all dimensions are close to baseline", self.time)
            }
            DeltaDirection::Above => format!(
                "{} {} is {:.1} above baseline",
                self.time,
                self.dominant.label(),
                delta
            ),
            DeltaDirection::Below => format!(
                "{} {} is {:.1} below baseline",
                self.time,
                self.dominant.label(),
                delta.abs()
            ),
        }
    }
}

/// Insight for the latest slot carrying any actual value; `None` if there is none
pub fn latest_delta_insight(points: &[ChartDataPoint]) -> Option<DeltaInsight> {
    let point = points.iter().rev().find(|p| p.has_actual())?;
    let deltas = point.deltas();

    let mut dominant = Dimension::Physical;
    for dimension in Dimension::ALL {
        if deltas.get(dimension).abs() > deltas.get(dominant).abs() {
            dominant = dimension;
        }
    }

    let delta = deltas.get(dominant);
    let direction = if delta.abs() < CLOSE_TO_BASELINE {
        DeltaDirection::CloseToBaseline
    } else if delta > 0.0 {
        DeltaDirection::Above
    } else {
        DeltaDirection::Below
    };

    Some(DeltaInsight {
        time: point.time.clone(),
        timestamp: point.timestamp,
        deltas,
        dominant,
        direction,
    })
}

/// How much history backs the baseline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineCoverage {
    pub sample_count: usize,
    pub baseline_days: u32,
    /// `min(1, samples / baseline_days)`
    pub ratio: f64,
}

pub fn baseline_coverage(sample_count: usize, baseline_days: u32) -> BaselineCoverage {
    let ratio = if baseline_days == 0 {
        0.0
    } else {
        (sample_count as f64 / baseline_days as f64).min(1.0)
    };
    BaselineCoverage {
        sample_count,
        baseline_days,
        ratio,
    }
}
