//! Trinity Flux - baseline reconstruction and analytics for sparse self-tracking samples
//!
//! A user records a three-dimensional subjective state (Physical, Cognitive,
//! Impulse; each 1-10) at irregular times. Flux turns that sparse stream into
//! an expected per-hour baseline curve, outlier-resistant statistics, chart
//! series with deltas, day x hour heatmaps and plain-text period summaries.
//!
//! ## Modules
//!
//! - **Analytics core**: `stats`, `baseline`, `chart`, `heatmap`, `summary` are
//!   pure functions over in-memory samples
//! - **Plumbing**: `repository` (storage boundary), `config`, `pipeline`
//!   (orchestration), `encoder` (report envelope)

pub mod baseline;
pub mod chart;
pub mod config;
pub mod encoder;
pub mod error;
pub mod heatmap;
pub mod pipeline;
pub mod repository;
pub mod stats;
pub mod summary;
pub mod timezone;
pub mod types;
pub mod window;

pub use baseline::{analyze_weekly_trend, calculate_dynamic_baseline, DynamicBaseline};
pub use chart::{latest_delta_insight, process_chart_data};
pub use config::AnalyticsConfig;
pub use encoder::ReportEncoder;
pub use error::{ComputeError, ValidationError};
pub use heatmap::{build_heatmap_matrix, build_hour_map};
pub use pipeline::{samples_to_report, DashboardReport, TrinityAnalyzer};
pub use repository::{InMemoryRepository, SampleRepository};
pub use stats::{compute_median_stats, filter_outliers, median};
pub use summary::{summarize_period, PeriodBucket, PromptContext, Season};
pub use timezone::TimeZonePolicy;
pub use types::{Dimension, Sample, TrinityValue};
pub use window::{DayType, SampleFilter, WindowSpec};

/// Crate version embedded in every report envelope
pub const TRINITY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for report envelopes
pub const PRODUCER_NAME: &str = "trinity-flux";
