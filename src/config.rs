//! Analytics configuration via TOML files.
//!
//! Every field is optional; missing keys take the defaults below and unknown
//! keys are rejected so typos surface early.
//!
//! ```toml
//! timezone = "+08:00"
//! week_starts_on = "Mon"
//! baseline_days = 7
//! heatmap_days = 30
//! day_type = "weekday"
//! tag = "work"
//! ```

use crate::error::ComputeError;
use crate::timezone::TimeZonePolicy;
use crate::window::{DayType, SampleFilter, WindowSpec};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default history window for the dynamic baseline
pub const DEFAULT_BASELINE_DAYS: u32 = 30;

/// Default trailing heatmap window
pub const DEFAULT_HEATMAP_DAYS: u32 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyticsConfig {
    /// Zone used to interpret timestamps
    pub timezone: TimeZonePolicy,
    pub week_starts_on: Weekday,
    /// History window feeding the dynamic baseline, in days
    pub baseline_days: u32,
    pub heatmap_days: u32,
    pub day_type: DayType,
    /// Only samples carrying this tag are analysed
    pub tag: Option<String>,
    pub low_confidence_threshold: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            timezone: TimeZonePolicy::Local,
            week_starts_on: Weekday::Sun,
            baseline_days: DEFAULT_BASELINE_DAYS,
            heatmap_days: DEFAULT_HEATMAP_DAYS,
            day_type: DayType::All,
            tag: None,
            low_confidence_threshold: crate::stats::LOW_CONFIDENCE_THRESHOLD,
        }
    }
}

impl AnalyticsConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ComputeError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ComputeError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self, ComputeError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ComputeError> {
        toml::to_string(self).map_err(|e| ComputeError::ConfigError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.baseline_days == 0 {
            return Err(ComputeError::ConfigError(
                "baseline_days must be at least 1".to_string(),
            ));
        }
        if self.heatmap_days == 0 {
            return Err(ComputeError::ConfigError(
                "heatmap_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Tag and day-type filter described by this config
    pub fn filter(&self) -> SampleFilter {
        SampleFilter::new(self.tag.clone(), self.day_type)
    }

    /// Default trailing heatmap window
    pub fn heatmap_window(&self) -> WindowSpec {
        WindowSpec::Trailing {
            days: self.heatmap_days,
        }
    }
}
