//! Outlier-resistant statistics
//!
//! Median and IQR-based outlier filtering per Trinity dimension, plus the
//! monthly median snapshot built on top of them.

use crate::timezone::TimeZonePolicy;
use crate::types::{Dimension, MedianStats, MonthlyBaseline, Sample, TrinityValue};
use tracing::debug;

/// Fallback values used when a dimension has no usable data
pub const DEFAULT_BASELINE: TrinityValue = TrinityValue {
    p: 5.0,
    c: 5.0,
    s: 2.0,
};

/// Statistics computed from fewer samples than this are flagged low confidence
pub const LOW_CONFIDENCE_THRESHOLD: usize = 5;

/// Below this many values, outlier filtering is skipped
const MIN_VALUES_FOR_IQR: usize = 4;

/// Median of `values`; `0.0` for empty input.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    median_of_sorted(&sorted)
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let mid = n / 2;
    if n % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Drop values outside `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]`.
///
/// Inputs with fewer than four values are returned unchanged. Otherwise the
/// kept values are returned in ascending order.
pub fn filter_outliers(values: &[f64]) -> Vec<f64> {
    if values.len() < MIN_VALUES_FOR_IQR {
        return values.to_vec();
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let q1 = median_of_sorted(&sorted[..n / 2]);
    let q3 = median_of_sorted(&sorted[n.div_ceil(2)..]);
    let iqr = q3 - q1;
    let lower = q1 - 1.5 * iqr;
    let upper = q3 + 1.5 * iqr;

    sorted.retain(|v| *v >= lower && *v <= upper);
    sorted
}

/// Finite values of one dimension across `samples`
pub fn dimension_values(samples: &[Sample], dimension: Dimension) -> Vec<f64> {
    samples
        .iter()
        .filter_map(|s| s.values.finite(dimension))
        .collect()
}

/// Per-dimension median after outlier removal.
pub fn compute_median_stats(samples: &[Sample]) -> MedianStats {
    compute_median_stats_with_threshold(samples, LOW_CONFIDENCE_THRESHOLD)
}

/// [`compute_median_stats`] with a caller-chosen low-confidence threshold
pub fn compute_median_stats_with_threshold(samples: &[Sample], threshold: usize) -> MedianStats {
    if samples.is_empty() {
        return MedianStats {
            values: DEFAULT_BASELINE,
            sample: 0,
            low_confidence: true,
        };
    }

    let mut sample = usize::MAX;
    let values = TrinityValue::from_fn(|dimension| {
        let filtered = filter_outliers(&dimension_values(samples, dimension));
        sample = sample.min(filtered.len());
        if filtered.is_empty() {
            DEFAULT_BASELINE.get(dimension)
        } else {
            median(&filtered)
        }
    });

    debug!(input = samples.len(), sample, "computed median stats");

    MedianStats {
        values,
        sample,
        low_confidence: sample < threshold,
    }
}

impl MonthlyBaseline {
    /// Compute a snapshot for `month_key` from the samples of that month
    pub fn compute(month_key: impl Into<String>, samples: &[Sample], computed_at: i64) -> Self {
        let stats = compute_median_stats(samples);
        Self {
            month_key: month_key.into(),
            values: stats.values,
            sample: stats.sample,
            low_confidence: stats.low_confidence,
            computed_at,
        }
    }

    /// Keep only the samples whose local month matches `month_key`, then compute
    pub fn compute_for_month(
        month_key: &str,
        samples: &[Sample],
        policy: &TimeZonePolicy,
        computed_at: i64,
    ) -> Self {
        let in_month: Vec<Sample> = samples
            .iter()
            .filter(|s| policy.month_key(s.timestamp).as_deref() == Some(month_key))
            .cloned()
            .collect();
        Self::compute(month_key, &in_month, computed_at)
    }

    pub fn stats(&self) -> MedianStats {
        MedianStats {
            values: self.values,
            sample: self.sample,
            low_confidence: self.low_confidence,
        }
    }

    /// Load a snapshot from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the snapshot to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(ts: i64, p: f64, c: f64, s: f64) -> Sample {
        let mut sample = Sample::new(ts, TrinityValue::new(p, c, s));
        sample.values = TrinityValue::new(p, c, s);
        sample
    }

    #[test]
    fn test_median_basic_cases() {
        assert_eq!(median(&[]), 0.0);
        assert_eq!(median(&[7.0]), 7.0);
        assert_eq!(median(&[2.0, 5.0]), 3.5);
        assert_eq!(median(&[9.0, 1.0, 4.0]), 4.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_filter_outliers_short_input_unchanged() {
        let values = vec![10.0, 1.0, 5.0];
        assert_eq!(filter_outliers(&values), values);
    }

    #[test]
    fn test_filter_outliers_drops_extreme_value() {
        let values = vec![5.0, 6.0, 5.0, 6.0, 5.0, 6.0, 50.0];
        let filtered = filter_outliers(&values);
        assert_eq!(filtered, vec![5.0, 5.0, 5.0, 6.0, 6.0, 6.0]);
        assert!(filtered.iter().all(|v| values.contains(v)));
    }

    #[test]
    fn test_filter_outliers_inclusive_bounds() {
        // sorted [1,2,3,4]: q1 = 1.5, q3 = 3.5, iqr = 2, range [-1.5, 6.5]
        assert_eq!(filter_outliers(&[4.0, 3.0, 2.0, 1.0]), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(filter_outliers(&[1.0, 2.0, 3.0, 4.0, 6.5]).len(), 5);
    }

    #[test]
    fn test_filter_outliers_monotone_with_more_extremes() {
        let mut values = vec![5.0, 5.5, 6.0, 6.5, 5.0, 6.0];
        let base_len = filter_outliers(&values).len();
        values.push(100.0);
        let with_one = filter_outliers(&values).len();
        values.push(-100.0);
        let with_two = filter_outliers(&values).len();
        assert!(with_one <= base_len + 1);
        assert_eq!(with_one, base_len);
        assert_eq!(with_two, base_len);
    }

    #[test]
    fn test_median_stats_empty() {
        let stats = compute_median_stats(&[]);
        assert_eq!(
            stats,
            MedianStats {
                values: TrinityValue::new(5.0, 5.0, 2.0),
                sample: 0,
                low_confidence: true,
            }
        );
    }

    #[test]
    fn test_median_stats_drops_non_finite_and_uses_defaults() {
        let samples = vec![
            sample(0, 6.0, f64::NAN, f64::NAN),
            sample(1, 8.0, f64::NAN, f64::NAN),
        ];
        let stats = compute_median_stats(&samples);
        assert_eq!(stats.values.p, 7.0);
        assert_eq!(stats.values.c, 5.0);
        assert_eq!(stats.values.s, 2.0);
        assert_eq!(stats.sample, 0);
        assert!(stats.low_confidence);
    }

    #[test]
    fn test_median_stats_confidence() {
        let samples: Vec<Sample> = (0..6)
            .map(|i| sample(i, 6.0 + (i % 2) as f64, 5.0, 3.0))
            .collect();
        let stats = compute_median_stats(&samples);
        assert_eq!(stats.sample, 6);
        assert!(!stats.low_confidence);
        assert_eq!(stats.values.p, 6.5);

        let strict = compute_median_stats_with_threshold(&samples, 10);
        assert!(strict.low_confidence);
    }

    #[test]
    fn test_monthly_baseline_for_month() {
        // 2025-11-10 and 2025-12-01 (UTC)
        let nov = 1_762_765_200_000;
        let dec = 1_764_547_200_000;
        let samples = vec![sample(nov, 8.0, 8.0, 4.0), sample(dec, 2.0, 2.0, 9.0)];

        let snapshot =
            MonthlyBaseline::compute_for_month("2025-11", &samples, &TimeZonePolicy::Utc, 42);
        assert_eq!(snapshot.values, TrinityValue::new(8.0, 8.0, 4.0));
        assert_eq!(snapshot.sample, 1);
        assert!(snapshot.low_confidence);
        assert_eq!(snapshot.computed_at, 42);

        let restored = MonthlyBaseline::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(restored, snapshot);
    }
}
