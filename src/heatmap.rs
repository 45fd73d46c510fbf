//! Heatmap aggregation
//!
//! Buckets samples into a `days x 24` grid of per-cell means, plus a
//! per-hour summary across the whole window.

use crate::timezone::TimeZonePolicy;
use crate::types::{
    clamp_score, CellHighlight, CellValue, Dimension, HeatmapMatrix, HeatmapRow, HourSummary,
    Sample, StateLabel,
};
use crate::window::{ResolvedWindow, SampleFilter};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Per-cell running sums
#[derive(Debug, Clone, Copy, Default)]
struct CellAccumulator {
    sum: [f64; 3],
    count: [u32; 3],
    samples: u32,
}

impl CellAccumulator {
    fn add(&mut self, sample: &Sample) {
        for (idx, dimension) in Dimension::ALL.iter().enumerate() {
            if let Some(v) = sample.values.finite(*dimension) {
                self.sum[idx] += v;
                self.count[idx] += 1;
            }
        }
        self.samples += 1;
    }

    fn finish(&self) -> CellValue {
        let mean = |idx: usize| {
            if self.count[idx] == 0 {
                None
            } else {
                clamp_score(self.sum[idx] / self.count[idx] as f64)
            }
        };
        CellValue {
            p: mean(0),
            c: mean(1),
            s: mean(2),
            count: self.samples,
        }
    }
}

/// Whether a sample has at least one usable value
fn has_any_value(sample: &Sample) -> bool {
    Dimension::ALL
        .iter()
        .any(|d| sample.values.finite(*d).is_some())
}

/// Build the heatmap matrix for a resolved window.
///
/// Samples outside the window, failing the filter, or without any finite
/// value are skipped. Cells without samples stay empty (`count == 0`).
pub fn build_heatmap_matrix(
    samples: &[Sample],
    window: &ResolvedWindow,
    filter: &SampleFilter,
    policy: &TimeZonePolicy,
) -> HeatmapMatrix {
    let mut grid = vec![[CellAccumulator::default(); 24]; window.rows.len()];
    let mut malformed = 0_usize;

    for sample in samples {
        if !filter.matches(sample, policy) {
            continue;
        }
        let Some(row) = window.row_index(sample.timestamp, policy) else {
            continue;
        };
        let Some(hour) = policy.hour_of_day(sample.timestamp) else {
            continue;
        };
        if !has_any_value(sample) {
            malformed += 1;
            continue;
        }
        grid[row][hour as usize].add(sample);
    }

    if malformed > 0 {
        warn!(malformed, "skipped samples without finite values");
    }

    let rows: Vec<HeatmapRow> = window
        .rows
        .iter()
        .zip(grid.iter())
        .map(|(date, cells)| {
            let hours: Vec<CellValue> = cells.iter().map(CellAccumulator::finish).collect();
            HeatmapRow {
                label: date.format("%m/%d").to_string(),
                date: *date,
                highlights: hours.iter().map(dominant_channel).collect(),
                hours,
            }
        })
        .collect();

    let matrix = HeatmapMatrix {
        start_ms: window.start_ms,
        end_ms: window.end_ms,
        timezone: *policy,
        rows,
    };

    debug!(
        window = %window.spec,
        rows = matrix.rows.len(),
        counted = matrix.total_count(),
        "built heatmap matrix"
    );

    matrix
}

/// Per-hour means across the whole window, each with a state label
pub fn build_hour_map(
    samples: &[Sample],
    window: &ResolvedWindow,
    filter: &SampleFilter,
    policy: &TimeZonePolicy,
) -> Vec<HourSummary> {
    let mut hours = [CellAccumulator::default(); 24];

    for sample in samples {
        if !window.contains(sample.timestamp)
            || !filter.matches(sample, policy)
            || !has_any_value(sample)
        {
            continue;
        }
        if let Some(hour) = policy.hour_of_day(sample.timestamp) {
            hours[hour as usize].add(sample);
        }
    }

    hours
        .iter()
        .enumerate()
        .map(|(hour, acc)| {
            let values = acc.finish();
            HourSummary {
                hour: hour as u32,
                values,
                label: state_label(&values),
            }
        })
        .collect()
}

/// Rule-based description of a cell's mean state
pub fn state_label(cell: &CellValue) -> StateLabel {
    if cell.is_empty() {
        return StateLabel::NoData;
    }
    // Missing dimensions read as the neutral midpoint
    let p = cell.p.unwrap_or(5.0);
    let c = cell.c.unwrap_or(5.0);
    let s = cell.s.unwrap_or(5.0);

    if p >= 8.0 && c >= 8.0 && s <= 4.0 {
        StateLabel::HighEnergyFocus
    } else if p <= 4.0 && c <= 4.0 && s <= 4.0 {
        StateLabel::LowEnergyRest
    } else if s >= 7.0 && c <= 5.0 {
        StateLabel::ImpulseElevated
    } else if c >= 7.0 && p >= 6.0 && s <= 6.0 {
        StateLabel::DeepWorkFriendly
    } else if p >= 6.0 && s >= 6.0 {
        StateLabel::SocialOrActive
    } else {
        StateLabel::Steady
    }
}

/// Threshold above which a channel dominates a cell
const HIGHLIGHT_THRESHOLD: f64 = 6.5;

/// Dominant channel of a cell: impulse, then cognitive, then physical
pub fn dominant_channel(cell: &CellValue) -> Option<CellHighlight> {
    if cell.is_empty() {
        return None;
    }
    [Dimension::Impulse, Dimension::Cognitive, Dimension::Physical]
        .into_iter()
        .find_map(|dimension| {
            let v = cell.get(dimension)?;
            (v >= HIGHLIGHT_THRESHOLD).then(|| CellHighlight {
                dimension,
                intensity: ((v - 6.0) / 4.0).min(1.0),
            })
        })
}

/// Distinct non-empty tags in first-seen order
pub fn collect_tags(samples: &[Sample]) -> Vec<String> {
    let mut seen = HashSet::new();
    samples
        .iter()
        .flat_map(|s| s.tags.iter())
        .filter(|t| !t.is_empty() && seen.insert(t.as_str()))
        .cloned()
        .collect()
}
