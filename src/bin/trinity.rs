//! Trinity CLI - Command-line interface for Trinity Flux
//!
//! Commands:
//! - report: Full dashboard report in a versioned envelope
//! - chart: 48-slot chart series for today
//! - heatmap: Day x hour matrix for a trailing or calendar window
//! - hours: Per-hour summary with state labels
//! - stats: Outlier-resistant median statistics
//! - summary: Plain-text period and seasonal summaries
//! - context: Narrative prompt context
//! - validate: Check samples for malformed values
//! - doctor: Diagnose configuration and environment

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use trinity_flux::repository::{parse_samples_json, parse_samples_ndjson};
use trinity_flux::summary::render_summary_line;
use trinity_flux::types::{validate_samples, CalendarEvent, MonthlyBaseline, Sample};
use trinity_flux::{
    AnalyticsConfig, ComputeError, DayType, InMemoryRepository, SampleRepository,
    TimeZonePolicy, TrinityAnalyzer, WindowSpec, PRODUCER_NAME, TRINITY_VERSION,
};

/// Trinity - baseline reconstruction and analytics for self-tracking samples
#[derive(Parser)]
#[command(name = "trinity")]
#[command(version = TRINITY_VERSION)]
#[command(about = "Analyse sparse Trinity (P/C/S) samples", long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Input file path (use - for stdin)
    #[arg(short, long, global = true, default_value = "-")]
    input: PathBuf,

    /// Input format
    #[arg(long, global = true, default_value = "ndjson")]
    input_format: InputFormat,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Time zone: local, utc, or a fixed offset such as +08:00
    #[arg(long, global = true)]
    timezone: Option<TimeZonePolicy>,

    /// Query instant (RFC 3339); defaults to the current time
    #[arg(long, global = true)]
    now: Option<String>,
}

#[derive(Args)]
struct FilterArgs {
    /// Only use samples carrying this tag
    #[arg(long)]
    tag: Option<String>,

    /// Restrict to weekdays or weekends (all, weekday, weekend)
    #[arg(long)]
    day_type: Option<DayType>,
}

#[derive(Subcommand)]
enum Commands {
    /// Full dashboard report (JSON envelope)
    Report {
        /// Monthly baseline cache file, loaded before and saved after the run
        #[arg(long)]
        cache: Option<PathBuf>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Chart series for the local day containing --now
    Chart {
        /// History window for the dynamic baseline, in days
        #[arg(long)]
        baseline_days: Option<u32>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Day x hour heatmap
    Heatmap {
        /// trailing:N, week:OFFSET or month:OFFSET
        #[arg(long)]
        window: Option<WindowSpec>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Per-hour means with state labels
    Hours {
        /// trailing:N, week:OFFSET or month:OFFSET
        #[arg(long)]
        window: Option<WindowSpec>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Outlier-resistant median statistics
    Stats {
        /// Restrict to one month (YYYY-MM)
        #[arg(long)]
        month: Option<String>,
    },

    /// Plain-text period and seasonal summaries
    Summary,

    /// Narrative prompt context
    Context {
        /// JSON array of calendar events
        #[arg(long)]
        events: Option<PathBuf>,
    },

    /// Validate samples
    Validate {
        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one sample per line)
    Ndjson,
    /// JSON array of samples
    Json,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr so stdout stays machine-readable
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), TrinityCliError> {
    let common = cli.common;

    if let Commands::Doctor { json } = cli.command {
        return cmd_doctor(&common, json);
    }

    let config = load_config(&common)?;
    let now_ms = parse_now(common.now.as_deref())?;
    let samples = read_samples(&common.input, &common.input_format)?;
    debug!(samples = samples.len(), now_ms, "loaded input");

    match cli.command {
        Commands::Report { cache, filter } => {
            let config = with_overrides(config, &filter, None)?;
            cmd_report(samples, config, now_ms, cache.as_deref())
        }
        Commands::Chart {
            baseline_days,
            filter,
        } => {
            let config = with_overrides(config, &filter, baseline_days)?;
            let analyzer = analyzer(samples, config);
            print_json(&analyzer.chart(now_ms)?)
        }
        Commands::Heatmap { window, filter } => {
            let config = with_overrides(config, &filter, None)?;
            let spec = window.unwrap_or_else(|| config.heatmap_window());
            let analyzer = analyzer(samples, config);
            print_json(&analyzer.heatmap(spec, now_ms)?)
        }
        Commands::Hours { window, filter } => {
            let config = with_overrides(config, &filter, None)?;
            let spec = window.unwrap_or_else(|| config.heatmap_window());
            let analyzer = analyzer(samples, config);
            print_json(&analyzer.hours(spec, now_ms)?)
        }
        Commands::Stats { month } => cmd_stats(samples, config, now_ms, month.as_deref()),
        Commands::Summary => cmd_summary(samples, config, now_ms),
        Commands::Context { events } => {
            let events = match events {
                Some(path) => read_events(&path)?,
                None => Vec::new(),
            };
            let repo = InMemoryRepository::with_samples(samples).with_events(events);
            let analyzer = TrinityAnalyzer::new(repo, config);
            print!("{}", analyzer.prompt_context(now_ms)?.render());
            Ok(())
        }
        Commands::Validate { json } => cmd_validate(&samples, json),
        Commands::Doctor { .. } => Ok(()),
    }
}

fn analyzer(samples: Vec<Sample>, config: AnalyticsConfig) -> TrinityAnalyzer<InMemoryRepository> {
    TrinityAnalyzer::new(InMemoryRepository::with_samples(samples), config)
}

fn cmd_report(
    samples: Vec<Sample>,
    config: AnalyticsConfig,
    now_ms: i64,
    cache: Option<&Path>,
) -> Result<(), TrinityCliError> {
    let mut repo = InMemoryRepository::with_samples(samples);

    if let Some(path) = cache.filter(|p| p.exists()) {
        let snapshots: Vec<MonthlyBaseline> = serde_json::from_str(&fs::read_to_string(path)?)?;
        for snapshot in snapshots {
            repo.save_monthly_baseline(snapshot)?;
        }
        debug!(path = %path.display(), "loaded baseline cache");
    }

    let mut analyzer = TrinityAnalyzer::new(repo, config);
    let json = analyzer.report_json(now_ms)?;

    if let Some(path) = cache {
        let snapshots: Vec<&MonthlyBaseline> = analyzer.repository().baselines().collect();
        fs::write(path, serde_json::to_string_pretty(&snapshots)?)?;
        info!(path = %path.display(), months = snapshots.len(), "saved baseline cache");
    }

    println!("{}", json);
    Ok(())
}

fn cmd_stats(
    samples: Vec<Sample>,
    config: AnalyticsConfig,
    now_ms: i64,
    month: Option<&str>,
) -> Result<(), TrinityCliError> {
    let mut analyzer = analyzer(samples, config);
    match month {
        Some(key) => print_json(&analyzer.monthly_baseline(key, now_ms)?),
        None => print_json(&analyzer.median_stats()?),
    }
}

fn cmd_summary(
    samples: Vec<Sample>,
    config: AnalyticsConfig,
    now_ms: i64,
) -> Result<(), TrinityCliError> {
    let analyzer = analyzer(samples, config);

    println!("Period Summary");
    println!("==============");
    for summary in analyzer.summaries(now_ms)? {
        println!("  {}", render_summary_line(&summary));
    }

    let trend = analyzer.weekly_trend(now_ms)?;
    println!("\nWeekly trend: {:?} (avg P {:.1})", trend.status, trend.average);

    println!("\nSeasons");
    println!("=======");
    for summary in analyzer.seasons()? {
        println!("  {}", render_summary_line(&summary));
    }
    Ok(())
}

fn cmd_validate(samples: &[Sample], json: bool) -> Result<(), TrinityCliError> {
    let failures = validate_samples(samples);

    let report = ValidationReport {
        total_samples: samples.len(),
        valid_samples: samples.len() - failures.len(),
        invalid_samples: failures.len(),
        errors: failures
            .iter()
            .map(|(index, error)| ValidationErrorDetail {
                index: *index,
                sample_id: samples.get(*index).map(|s| s.id.clone()),
                error: error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total samples:   {}", report.total_samples);
        println!("Valid samples:   {}", report.valid_samples);
        println!("Invalid samples: {}", report.invalid_samples);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Sample {} (index {}): {}",
                    err.sample_id.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.error
                );
            }
        }
    }

    if report.invalid_samples > 0 {
        Err(TrinityCliError::ValidationFailed(report.invalid_samples))
    } else {
        Ok(())
    }
}

fn cmd_doctor(common: &CommonArgs, json: bool) -> Result<(), TrinityCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "trinity_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Trinity Flux version {}", TRINITY_VERSION),
    });

    let config = match &common.config {
        Some(path) if !path.exists() => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: format!("Config file {} does not exist", path.display()),
            });
            None
        }
        Some(path) => match AnalyticsConfig::load_from_file(path) {
            Ok(config) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (baseline {} days, heatmap {} days)",
                        config.baseline_days, config.heatmap_days
                    ),
                });
                Some(config)
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                });
                None
            }
        },
        None => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: "No config file, using defaults".to_string(),
            });
            None
        }
    };

    let timezone = common
        .timezone
        .or(config.map(|c| c.timezone))
        .unwrap_or_default();
    checks.push(DoctorCheck {
        name: "timezone".to_string(),
        status: CheckStatus::Ok,
        message: format!("Grouping by {} wall-clock time", timezone),
    });

    if let Some(now) = &common.now {
        checks.push(match parse_now(Some(now)) {
            Ok(_) => DoctorCheck {
                name: "now".to_string(),
                status: CheckStatus::Ok,
                message: format!("Fixed query instant {}", now),
            },
            Err(e) => DoctorCheck {
                name: "now".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            },
        });
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (ready to read samples)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: TRINITY_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Trinity Doctor Report");
        println!("=====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(TrinityCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn load_config(common: &CommonArgs) -> Result<AnalyticsConfig, TrinityCliError> {
    let mut config = match &common.config {
        Some(path) => AnalyticsConfig::load_from_file(path)?,
        None => AnalyticsConfig::default(),
    };
    if let Some(timezone) = common.timezone {
        config.timezone = timezone;
    }
    Ok(config)
}

/// Apply per-command flags on top of the loaded config and re-validate
fn with_overrides(
    mut config: AnalyticsConfig,
    filter: &FilterArgs,
    baseline_days: Option<u32>,
) -> Result<AnalyticsConfig, TrinityCliError> {
    if let Some(tag) = &filter.tag {
        config.tag = Some(tag.clone());
    }
    if let Some(day_type) = filter.day_type {
        config.day_type = day_type;
    }
    if let Some(days) = baseline_days {
        config.baseline_days = days;
    }
    config.validate()?;
    Ok(config)
}

fn parse_now(now: Option<&str>) -> Result<i64, TrinityCliError> {
    match now {
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|t| t.timestamp_millis())
            .map_err(|e| TrinityCliError::ParseError(format!("Invalid --now '{}': {}", text, e))),
        None => Ok(Utc::now().timestamp_millis()),
    }
}

fn read_input(input: &Path) -> Result<String, TrinityCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_samples(input: &Path, format: &InputFormat) -> Result<Vec<Sample>, TrinityCliError> {
    let data = read_input(input)?;
    let samples = match format {
        InputFormat::Ndjson => parse_samples_ndjson(&data)?,
        InputFormat::Json => parse_samples_json(&data)?,
    };
    Ok(samples)
}

fn read_events(path: &Path) -> Result<Vec<CalendarEvent>, TrinityCliError> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), TrinityCliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// Error types

#[derive(Debug)]
enum TrinityCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for TrinityCliError {
    fn from(e: io::Error) -> Self {
        TrinityCliError::Io(e)
    }
}

impl From<ComputeError> for TrinityCliError {
    fn from(e: ComputeError) -> Self {
        TrinityCliError::Compute(e)
    }
}

impl From<serde_json::Error> for TrinityCliError {
    fn from(e: serde_json::Error) -> Self {
        TrinityCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<TrinityCliError> for CliError {
    fn from(e: TrinityCliError) -> Self {
        match e {
            TrinityCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            TrinityCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::ConfigError(_) => ("CONFIG_ERROR", "Check the TOML config keys and values"),
                    ComputeError::InvalidTimezone(_) => ("TIMEZONE_ERROR", "Use local, utc or an offset like +08:00"),
                    ComputeError::InvalidWindow(_) => ("WINDOW_ERROR", "Use trailing:N, week:OFFSET or month:OFFSET"),
                    ComputeError::StorageError(_) | ComputeError::NotFound(_) => {
                        ("STORAGE_ERROR", "Check for duplicate or missing sample ids")
                    }
                    ComputeError::ParseError(_) | ComputeError::JsonError(_) => {
                        ("PARSE_ERROR", "Ensure input contains one sample object per line or a JSON array")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            TrinityCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            TrinityCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} samples failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            TrinityCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            TrinityCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_samples: usize,
    valid_samples: usize,
    invalid_samples: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    sample_id: Option<String>,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
