//! Pipeline orchestration
//!
//! This module provides the public API for Trinity Flux. It reads sample
//! windows through a [`SampleRepository`], runs the pure analytics over them
//! and assembles dashboard reports.

use crate::baseline::{analyze_weekly_trend, WeeklyTrend};
use crate::chart::{
    baseline_coverage, latest_delta_insight, process_chart_data, BaselineCoverage, DeltaInsight,
};
use crate::config::AnalyticsConfig;
use crate::encoder::ReportEncoder;
use crate::error::ComputeError;
use crate::heatmap::{build_heatmap_matrix, build_hour_map, collect_tags};
use crate::repository::{parse_samples_json, InMemoryRepository, SampleRepository};
use crate::stats::compute_median_stats_with_threshold;
use crate::summary::{summarize_periods, summarize_seasons, PeriodBucket, PromptContext};
use crate::timezone::{add_days, add_months, parse_month_key, TimeZonePolicy, DAY_MS};
use crate::types::{
    ChartDataPoint, HeatmapMatrix, HourSummary, MedianStats, MonthlyBaseline, PeriodSummary, Sample,
};
use crate::window::{DayType, ResolvedWindow, SampleFilter, WindowSpec};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Chart series for one day with its derived signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartReport {
    pub date: NaiveDate,
    pub points: Vec<ChartDataPoint>,
    pub latest: Option<DeltaInsight>,
    pub coverage: BaselineCoverage,
}

/// Everything the dashboard shows for one query instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardReport {
    /// Query instant (epoch ms)
    pub now_ms: i64,
    pub chart: ChartReport,
    pub monthly_baseline: MonthlyBaseline,
    pub weekly_trend: WeeklyTrend,
    pub heatmap: HeatmapMatrix,
    pub hours: Vec<HourSummary>,
    pub summaries: Vec<PeriodSummary>,
    pub seasons: Vec<PeriodSummary>,
    /// Distinct tags across all samples
    pub tags: Vec<String>,
}

/// Build a dashboard report from a JSON array of samples.
///
/// # Arguments
/// * `samples_json` - JSON array of samples
/// * `timezone` - `local`, `utc` or a fixed offset such as `+08:00`
/// * `now_ms` - Query instant in epoch milliseconds
///
/// # Returns
/// The report wrapped in a versioned JSON envelope
///
/// # Example
/// ```ignore
/// let json = samples_to_report(samples_json, "+08:00".to_string(), now_ms)?;
/// ```
pub fn samples_to_report(
    samples_json: String,
    timezone: String,
    now_ms: i64,
) -> Result<String, ComputeError> {
    let samples = parse_samples_json(&samples_json)?;
    let config = AnalyticsConfig {
        timezone: timezone.parse()?,
        ..AnalyticsConfig::default()
    };
    let mut analyzer = TrinityAnalyzer::new(InMemoryRepository::with_samples(samples), config);
    analyzer.report_json(now_ms)
}

/// Stateful analyzer over a repository.
///
/// Holds the configuration and a report encoder; every query re-reads the
/// repository and recomputes from scratch.
pub struct TrinityAnalyzer<R: SampleRepository> {
    repository: R,
    config: AnalyticsConfig,
    encoder: ReportEncoder,
}

impl<R: SampleRepository> TrinityAnalyzer<R> {
    pub fn new(repository: R, config: AnalyticsConfig) -> Self {
        Self {
            repository,
            config,
            encoder: ReportEncoder::new(),
        }
    }

    /// Analyzer with default configuration
    pub fn with_defaults(repository: R) -> Self {
        Self::new(repository, AnalyticsConfig::default())
    }

    pub fn with_encoder(mut self, encoder: ReportEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut R {
        &mut self.repository
    }

    pub fn into_repository(self) -> R {
        self.repository
    }

    fn policy(&self) -> &TimeZonePolicy {
        &self.config.timezone
    }

    fn today(&self, now_ms: i64) -> Result<NaiveDate, ComputeError> {
        self.policy()
            .local_date(now_ms)
            .ok_or_else(|| ComputeError::InvalidWindow(format!("unrepresentable instant {}", now_ms)))
    }

    /// Validate and store a new sample
    pub fn record(&mut self, sample: Sample) -> Result<(), ComputeError> {
        sample
            .validate()
            .map_err(|e| ComputeError::ParseError(e.to_string()))?;
        debug!(id = %sample.id, ts = sample.timestamp, "recording sample");
        self.repository.save_sample(sample)
    }

    /// Chart for the local day containing `now_ms`.
    ///
    /// Today's samples honour the tag filter only; the baseline history
    /// (`baseline_days` before local midnight) honours tag and day type.
    pub fn chart(&self, now_ms: i64) -> Result<ChartReport, ComputeError> {
        let policy = self.policy();
        let date = self.today(now_ms)?;
        let start = policy.start_of_day_millis(date);
        let end = policy.boundary_millis(add_days(date, 1));
        let history_start = start - self.config.baseline_days as i64 * DAY_MS;

        let today_filter = SampleFilter::new(self.config.tag.clone(), DayType::All);
        let today = today_filter.apply(&self.repository.get_samples_in_range(start, end)?, policy);
        let history = self
            .config
            .filter()
            .apply(&self.repository.get_samples_in_range(history_start, start)?, policy);

        let points = process_chart_data(&today, &history, date, policy);
        Ok(ChartReport {
            date,
            latest: latest_delta_insight(&points),
            coverage: baseline_coverage(history.len(), self.config.baseline_days),
            points,
        })
    }

    /// Samples that could fall inside `window`
    fn window_samples(&self, window: &ResolvedWindow) -> Result<Vec<Sample>, ComputeError> {
        // Trailing windows include their end instant
        self.repository
            .get_samples_in_range(window.start_ms, window.end_ms.saturating_add(1))
    }

    pub fn resolve(&self, spec: WindowSpec, now_ms: i64) -> ResolvedWindow {
        spec.resolve(now_ms, self.policy(), self.config.week_starts_on)
    }

    pub fn heatmap(&self, spec: WindowSpec, now_ms: i64) -> Result<HeatmapMatrix, ComputeError> {
        let window = self.resolve(spec, now_ms);
        let samples = self.window_samples(&window)?;
        Ok(build_heatmap_matrix(&samples, &window, &self.config.filter(), self.policy()))
    }

    pub fn hours(&self, spec: WindowSpec, now_ms: i64) -> Result<Vec<HourSummary>, ComputeError> {
        let window = self.resolve(spec, now_ms);
        let samples = self.window_samples(&window)?;
        Ok(build_hour_map(&samples, &window, &self.config.filter(), self.policy()))
    }

    /// Outlier-resistant medians over every stored sample
    pub fn median_stats(&self) -> Result<MedianStats, ComputeError> {
        let samples = self.repository.get_all_samples()?;
        Ok(compute_median_stats_with_threshold(
            &samples,
            self.config.low_confidence_threshold,
        ))
    }

    /// Monthly median snapshot for `month_key`, served from cache when final.
    ///
    /// A cached snapshot is reused only if it was computed after the month
    /// ended; anything else is recomputed from raw samples and re-saved.
    pub fn monthly_baseline(
        &mut self,
        month_key: &str,
        now_ms: i64,
    ) -> Result<MonthlyBaseline, ComputeError> {
        let first = parse_month_key(month_key)?;
        let start = self.policy().start_of_day_millis(first);
        let end = self.policy().boundary_millis(add_months(first, 1));

        if let Some(cached) = self.repository.get_cached_monthly_baseline(month_key)? {
            if cached.computed_at >= end {
                debug!(month_key, "using cached monthly baseline");
                return Ok(cached);
            }
        }

        let samples = self.repository.get_samples_in_range(start, end)?;
        let stats = compute_median_stats_with_threshold(&samples, self.config.low_confidence_threshold);
        let snapshot = MonthlyBaseline {
            month_key: month_key.to_string(),
            values: stats.values,
            sample: stats.sample,
            low_confidence: stats.low_confidence,
            computed_at: now_ms,
        };
        self.repository.save_monthly_baseline(snapshot.clone())?;
        info!(month_key, sample = snapshot.sample, "recomputed monthly baseline");
        Ok(snapshot)
    }

    pub fn weekly_trend(&self, now_ms: i64) -> Result<WeeklyTrend, ComputeError> {
        let samples = self
            .repository
            .get_samples_in_range(now_ms - 7 * DAY_MS, now_ms.saturating_add(1))?;
        Ok(analyze_weekly_trend(&samples, now_ms))
    }

    /// Today / 7 days / 30 days / all-time summaries
    pub fn summaries(&self, now_ms: i64) -> Result<Vec<PeriodSummary>, ComputeError> {
        let samples = self.repository.get_all_samples()?;
        Ok(summarize_periods(
            &samples,
            &[
                PeriodBucket::Today,
                PeriodBucket::Last7Days,
                PeriodBucket::Last30Days,
                PeriodBucket::AllTime,
            ],
            now_ms,
            self.policy(),
        ))
    }

    pub fn seasons(&self) -> Result<Vec<PeriodSummary>, ComputeError> {
        let samples = self.repository.get_all_samples()?;
        Ok(summarize_seasons(&samples, self.policy()))
    }

    /// Narrative prompt context for the external chat collaborator
    pub fn prompt_context(&self, now_ms: i64) -> Result<PromptContext, ComputeError> {
        let samples = self.repository.get_all_samples()?;
        let events = self.repository.get_events()?;
        Ok(PromptContext::build(&samples, &events, now_ms, self.policy()))
    }

    /// Full dashboard report
    pub fn report(&mut self, now_ms: i64) -> Result<DashboardReport, ComputeError> {
        let month_key = self
            .policy()
            .month_key(now_ms)
            .ok_or_else(|| ComputeError::InvalidWindow(format!("unrepresentable instant {}", now_ms)))?;

        let monthly_baseline = self.monthly_baseline(&month_key, now_ms)?;
        let heatmap_window = self.config.heatmap_window();
        let all = self.repository.get_all_samples()?;

        let report = DashboardReport {
            now_ms,
            chart: self.chart(now_ms)?,
            monthly_baseline,
            weekly_trend: self.weekly_trend(now_ms)?,
            heatmap: self.heatmap(heatmap_window, now_ms)?,
            hours: self.hours(heatmap_window, now_ms)?,
            summaries: self.summaries(now_ms)?,
            seasons: summarize_seasons(&all, self.policy()),
            tags: collect_tags(&all),
        };

        info!(
            samples = all.len(),
            heatmap_count = report.heatmap.total_count(),
            "built dashboard report"
        );
        Ok(report)
    }

    /// Full dashboard report wrapped in the JSON envelope
    pub fn report_json(&mut self, now_ms: i64) -> Result<String, ComputeError> {
        let report = self.report(now_ms)?;
        self.encoder.encode_to_json(&report, self.config.timezone)
    }
}
