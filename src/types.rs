//! Core types for Trinity Flux
//!
//! This module defines the data structures that flow through the analytics
//! core: raw samples, the monthly baseline snapshot, and the derived chart,
//! heatmap, hour-of-day and period outputs.

use crate::error::ValidationError;
use crate::timezone::TimeZonePolicy;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Lowest score a user can record
pub const MIN_INPUT_SCORE: f64 = 1.0;

/// Highest score a user can record
pub const MAX_INPUT_SCORE: f64 = 10.0;

/// Lowest score any derived output may display
pub const MIN_DISPLAY_SCORE: f64 = 0.0;

/// Clamp a derived score into the displayable 0-10 range.
///
/// Non-finite input maps to `None` so NaN never reaches a caller.
pub fn clamp_score(value: f64) -> Option<f64> {
    value
        .is_finite()
        .then(|| value.clamp(MIN_DISPLAY_SCORE, MAX_INPUT_SCORE))
}

/// One axis of the Trinity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// P: physical wakefulness
    #[serde(rename = "p")]
    Physical,
    /// C: cognitive focus
    #[serde(rename = "c")]
    Cognitive,
    /// S: impulse
    #[serde(rename = "s")]
    Impulse,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Physical, Dimension::Cognitive, Dimension::Impulse];

    pub fn as_char(&self) -> char {
        match self {
            Dimension::Physical => 'p',
            Dimension::Cognitive => 'c',
            Dimension::Impulse => 's',
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Physical => "physical",
            Dimension::Cognitive => "cognitive",
            Dimension::Impulse => "impulse",
        }
    }
}

/// Three-dimensional subjective state: P, C, S
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrinityValue {
    #[serde(default = "missing_value", deserialize_with = "lenient_score")]
    pub p: f64,
    #[serde(default = "missing_value", deserialize_with = "lenient_score")]
    pub c: f64,
    #[serde(default = "missing_value", deserialize_with = "lenient_score")]
    pub s: f64,
}

fn missing_value() -> f64 {
    f64::NAN
}

/// Accept any JSON value; anything other than a number becomes NaN.
fn lenient_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64().unwrap_or(f64::NAN))
}

fn missing_values() -> TrinityValue {
    TrinityValue::new(f64::NAN, f64::NAN, f64::NAN)
}

/// A missing, `null` or non-object `values` field becomes all-NaN so the
/// sample still parses and is dropped at aggregation time.
fn lenient_values<'de, D>(deserializer: D) -> Result<TrinityValue, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        value @ serde_json::Value::Object(_) => {
            serde_json::from_value(value).map_err(serde::de::Error::custom)
        }
        _ => Ok(missing_values()),
    }
}

impl TrinityValue {
    pub fn new(p: f64, c: f64, s: f64) -> Self {
        Self { p, c, s }
    }

    /// Raw value for one dimension (may be NaN for malformed samples)
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Physical => self.p,
            Dimension::Cognitive => self.c,
            Dimension::Impulse => self.s,
        }
    }

    /// Finite value for one dimension, or `None` if malformed
    pub fn finite(&self, dimension: Dimension) -> Option<f64> {
        let v = self.get(dimension);
        v.is_finite().then_some(v)
    }

    pub fn set(&mut self, dimension: Dimension, value: f64) {
        match dimension {
            Dimension::Physical => self.p = value,
            Dimension::Cognitive => self.c = value,
            Dimension::Impulse => self.s = value,
        }
    }

    /// Build a value by evaluating `f` for every dimension
    pub fn from_fn(mut f: impl FnMut(Dimension) -> f64) -> Self {
        Self {
            p: f(Dimension::Physical),
            c: f(Dimension::Cognitive),
            s: f(Dimension::Impulse),
        }
    }
}

impl Default for TrinityValue {
    fn default() -> Self {
        Self::new(5.0, 5.0, 5.0)
    }
}

/// Self-reported direction of change at recording time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    #[default]
    Flat,
    Down,
}

/// One recorded observation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unique identifier
    pub id: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    /// Recorded Trinity values
    #[serde(default = "missing_values", deserialize_with = "lenient_values")]
    pub values: TrinityValue,
    /// Free-form tags; duplicates permitted, order irrelevant for matching
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub trend: Trend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Sample {
    /// Record a new sample with a fresh id. Values are clamped to the 1-10 input range.
    pub fn new(timestamp: i64, values: TrinityValue) -> Self {
        let clamp = |v: f64| {
            if v.is_finite() {
                v.clamp(MIN_INPUT_SCORE, MAX_INPUT_SCORE)
            } else {
                v
            }
        };
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp,
            values: TrinityValue::new(clamp(values.p), clamp(values.c), clamp(values.s)),
            tags: Vec::new(),
            trend: Trend::Flat,
            note: None,
        }
    }

    /// Add tags to the sample
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_trend(mut self, trend: Trend) -> Self {
        self.trend = trend;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Validate the sample against the data model
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }

        if chrono::DateTime::from_timestamp_millis(self.timestamp).is_none() {
            return Err(ValidationError::InvalidTimestamp(self.timestamp));
        }

        for dimension in Dimension::ALL {
            let value = self.values.get(dimension);
            if !value.is_finite() {
                return Err(ValidationError::NonFiniteValue {
                    dimension: dimension.as_char(),
                });
            }
            if !(MIN_DISPLAY_SCORE..=MAX_INPUT_SCORE).contains(&value) {
                return Err(ValidationError::OutOfRange {
                    dimension: dimension.as_char(),
                    value,
                });
            }
        }

        Ok(())
    }
}

/// Validate a collection, including id uniqueness. Returns `(index, error)` per failure.
pub fn validate_samples(samples: &[Sample]) -> Vec<(usize, ValidationError)> {
    let mut seen = HashSet::new();
    let mut failures = Vec::new();

    for (index, sample) in samples.iter().enumerate() {
        if let Err(e) = sample.validate() {
            failures.push((index, e));
            continue;
        }
        if !seen.insert(sample.id.as_str()) {
            failures.push((index, ValidationError::DuplicateId(sample.id.clone())));
        }
    }

    failures
}

/// A calendar event supplied as narrative context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    /// Epoch milliseconds
    pub start_time: i64,
    /// Epoch milliseconds
    pub end_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional link to a sample
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_id: Option<String>,
}

/// Result of the outlier-resistant median computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MedianStats {
    pub values: TrinityValue,
    /// Minimum filtered-list length across the three dimensions
    pub sample: usize,
    pub low_confidence: bool,
}

/// Cached monthly median snapshot. Never authoritative; recomputable from samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBaseline {
    /// `YYYY-MM`
    pub month_key: String,
    pub values: TrinityValue,
    pub sample: usize,
    pub low_confidence: bool,
    /// Epoch milliseconds
    pub computed_at: i64,
}

/// One point of a 24-hour baseline curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselinePoint {
    pub hour: u32,
    pub value: f64,
}

/// One 30-minute slot of the chart series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDataPoint {
    /// Local `HH:MM`
    pub time: String,
    /// Epoch milliseconds of the slot start
    pub timestamp: i64,
    pub p_standard: f64,
    pub p_baseline: f64,
    pub p_actual: Option<f64>,
    pub c_standard: f64,
    pub c_baseline: f64,
    pub c_actual: Option<f64>,
    pub s_standard: f64,
    pub s_baseline: f64,
    pub s_actual: Option<f64>,
}

impl ChartDataPoint {
    pub fn standard(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Physical => self.p_standard,
            Dimension::Cognitive => self.c_standard,
            Dimension::Impulse => self.s_standard,
        }
    }

    pub fn baseline(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Physical => self.p_baseline,
            Dimension::Cognitive => self.c_baseline,
            Dimension::Impulse => self.s_baseline,
        }
    }

    pub fn actual(&self, dimension: Dimension) -> Option<f64> {
        match dimension {
            Dimension::Physical => self.p_actual,
            Dimension::Cognitive => self.c_actual,
            Dimension::Impulse => self.s_actual,
        }
    }

    pub fn has_actual(&self) -> bool {
        Dimension::ALL.iter().any(|d| self.actual(*d).is_some())
    }

    /// Actual if present, otherwise baseline
    pub fn effective(&self, dimension: Dimension) -> f64 {
        self.actual(dimension).unwrap_or_else(|| self.baseline(dimension))
    }

    /// Effective value minus baseline; zero where no actual exists
    pub fn delta(&self, dimension: Dimension) -> f64 {
        self.effective(dimension) - self.baseline(dimension)
    }

    pub fn deltas(&self) -> TrinityValue {
        TrinityValue::from_fn(|d| self.delta(d))
    }
}

/// Mean values of one heatmap cell or hour bucket.
///
/// `None` means "no data" and is distinct from a true zero reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CellValue {
    pub p: Option<f64>,
    pub c: Option<f64>,
    pub s: Option<f64>,
    /// Number of samples that landed in this cell
    pub count: u32,
}

impl CellValue {
    pub fn get(&self, dimension: Dimension) -> Option<f64> {
        match dimension {
            Dimension::Physical => self.p,
            Dimension::Cognitive => self.c,
            Dimension::Impulse => self.s,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// All three means, if every dimension has data
    pub fn values(&self) -> Option<TrinityValue> {
        Some(TrinityValue::new(self.p?, self.c?, self.s?))
    }
}

/// Dominant channel of a heatmap cell, used for colouring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellHighlight {
    pub dimension: Dimension,
    /// 0-1 intensity
    pub intensity: f64,
}

/// One day row of a heatmap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapRow {
    /// Row label, local `MM/DD`
    pub label: String,
    /// Local calendar date of the row
    pub date: chrono::NaiveDate,
    /// 24 cells, index = local hour
    pub hours: Vec<CellValue>,
    /// Dominant channel per cell, parallel to `hours`
    pub highlights: Vec<Option<CellHighlight>>,
}

/// `days x 24` grid of per-cell means
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapMatrix {
    /// Inclusive start of the window (epoch ms)
    pub start_ms: i64,
    /// End of the window (epoch ms)
    pub end_ms: i64,
    pub timezone: TimeZonePolicy,
    pub rows: Vec<HeatmapRow>,
}

impl HeatmapMatrix {
    pub fn total_count(&self) -> u32 {
        self.rows
            .iter()
            .flat_map(|r| r.hours.iter())
            .map(|c| c.count)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }
}

/// Rule-based description of an hour's typical state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateLabel {
    HighEnergyFocus,
    LowEnergyRest,
    ImpulseElevated,
    DeepWorkFriendly,
    SocialOrActive,
    Steady,
    NoData,
}

impl StateLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateLabel::HighEnergyFocus => "high energy, focused",
            StateLabel::LowEnergyRest => "low energy, resting",
            StateLabel::ImpulseElevated => "impulse elevated",
            StateLabel::DeepWorkFriendly => "good for deep work",
            StateLabel::SocialOrActive => "good for social or physical activity",
            StateLabel::Steady => "steady",
            StateLabel::NoData => "no data",
        }
    }
}

/// Per-hour mean across a whole window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourSummary {
    pub hour: u32,
    pub values: CellValue,
    pub label: StateLabel,
}

/// Mean values over a named period bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub label: String,
    /// Arithmetic mean per dimension; zeros when `count == 0`
    pub mean: TrinityValue,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_value_deserialization() {
        let json = r#"{"id":"a","timestamp":1700000000000,"values":{"p":7,"c":"high","s":null}}"#;
        let sample: Sample = serde_json::from_str(json).unwrap();

        assert_eq!(sample.values.finite(Dimension::Physical), Some(7.0));
        assert_eq!(sample.values.finite(Dimension::Cognitive), None);
        assert_eq!(sample.values.finite(Dimension::Impulse), None);
        assert_eq!(sample.trend, Trend::Flat);
        assert!(sample.tags.is_empty());
    }

    #[test]
    fn test_missing_value_field() {
        let json = r#"{"id":"a","timestamp":1700000000000,"values":{"p":7,"c":6}}"#;
        let sample: Sample = serde_json::from_str(json).unwrap();
        assert!(sample.values.s.is_nan());
        assert!(matches!(
            sample.validate(),
            Err(ValidationError::NonFiniteValue { dimension: 's' })
        ));
    }

    #[test]
    fn test_missing_or_null_values_object() {
        let missing = r#"{"id":"a","timestamp":1700000000000}"#;
        let null = r#"{"id":"b","timestamp":1700000000000,"values":null}"#;
        let scalar = r#"{"id":"c","timestamp":1700000000000,"values":7}"#;

        for json in [missing, null, scalar] {
            let sample: Sample = serde_json::from_str(json).unwrap();
            assert!(Dimension::ALL.iter().all(|d| sample.values.finite(*d).is_none()));
            assert!(matches!(
                sample.validate(),
                Err(ValidationError::NonFiniteValue { dimension: 'p' })
            ));
        }
    }

    #[test]
    fn test_new_sample_clamps_and_assigns_id() {
        let a = Sample::new(1_700_000_000_000, TrinityValue::new(12.0, 0.0, 5.5));
        let b = Sample::new(1_700_000_000_000, TrinityValue::new(5.0, 5.0, 5.0));

        assert_eq!(a.values, TrinityValue::new(10.0, 1.0, 5.5));
        assert_ne!(a.id, b.id);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_validate_samples_reports_duplicates_and_range() {
        let mut first = Sample::new(1_700_000_000_000, TrinityValue::new(5.0, 5.0, 5.0));
        first.id = "dup".to_string();
        let second = first.clone();
        let mut out_of_range = Sample::new(1_700_000_000_000, TrinityValue::new(5.0, 5.0, 5.0));
        out_of_range.values.c = 11.0;

        let failures = validate_samples(&[first, second, out_of_range]);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0], (1, ValidationError::DuplicateId("dup".to_string())));
        assert!(matches!(failures[1], (2, ValidationError::OutOfRange { dimension: 'c', .. })));
    }

    #[test]
    fn test_chart_point_delta_uses_baseline_when_actual_missing() {
        let point = ChartDataPoint {
            time: "09:00".to_string(),
            timestamp: 0,
            p_standard: 6.0,
            p_baseline: 5.0,
            p_actual: Some(8.0),
            c_standard: 9.0,
            c_baseline: 7.0,
            c_actual: None,
            s_standard: 3.0,
            s_baseline: 3.0,
            s_actual: Some(2.0),
        };

        assert_eq!(point.delta(Dimension::Physical), 3.0);
        assert_eq!(point.delta(Dimension::Cognitive), 0.0);
        assert_eq!(point.delta(Dimension::Impulse), -1.0);
        assert!(point.has_actual());
    }

    #[test]
    fn test_sample_builders() {
        let sample = Sample::new(1_700_000_000_000, TrinityValue::new(6.0, 6.0, 6.0))
            .with_tags(["work"])
            .with_trend(Trend::Up)
            .with_note("after lunch");

        assert!(sample.has_tag("work"));
        assert_eq!(sample.trend, Trend::Up);
        assert_eq!(sample.note.as_deref(), Some("after lunch"));

        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["trend"], "up");
        assert_eq!(json["note"], "after lunch");
    }

    #[test]
    fn test_cell_values_require_every_dimension() {
        let full = CellValue {
            p: Some(6.0),
            c: Some(5.0),
            s: Some(4.0),
            count: 2,
        };
        assert_eq!(full.values(), Some(TrinityValue::new(6.0, 5.0, 4.0)));

        let partial = CellValue { s: None, ..full };
        assert_eq!(partial.values(), None);
        assert!(!partial.is_empty());
    }

    #[test]
    fn test_clamp_score_guards_nan() {
        assert_eq!(clamp_score(f64::NAN), None);
        assert_eq!(clamp_score(-3.0), Some(0.0));
        assert_eq!(clamp_score(14.0), Some(10.0));
        assert_eq!(clamp_score(4.2), Some(4.2));
    }

    #[test]
    fn test_dimension_serde_short_names() {
        assert_eq!(serde_json::to_string(&Dimension::Impulse).unwrap(), "\"s\"");
        let d: Dimension = serde_json::from_str("\"c\"").unwrap();
        assert_eq!(d, Dimension::Cognitive);
    }
}
