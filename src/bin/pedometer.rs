//! Pedometer CLI - step metrics over a recorded step log
//!
//! Commands:
//! - steps: Total step count for a range
//! - walking-duration: Active walking duration for a range
//! - call: Dispatch a method-channel call through the plugin bridge
//! - doctor: Diagnose configuration and input files

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use simple_pedometer::types::instant_from_millis;
use simple_pedometer::{
    AggregatorConfig, FailurePolicy, MethodCall, Pedometer, PedometerError, PedometerPlugin,
    SampleOrder, StepLog, TimeRange, PEDOMETER_VERSION, PRODUCER_NAME,
};

/// Pedometer - step count and active walking duration
#[derive(Parser)]
#[command(name = "pedometer")]
#[command(version = PEDOMETER_VERSION)]
#[command(about = "Step count and active walking duration over recorded steps", long_about = None)]
struct Cli {
    /// Emit debug logs to stderr (RUST_LOG refines the filter)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct LogArgs {
    /// Step log path (use - for stdin)
    #[arg(short, long)]
    log: PathBuf,

    /// Step log format
    #[arg(long, default_value = "json")]
    input_format: InputFormat,
}

#[derive(clap::Args)]
struct RangeArgs {
    /// Range start (RFC 3339 or epoch milliseconds)
    #[arg(long)]
    start: String,

    /// Range end (RFC 3339 or epoch milliseconds)
    #[arg(long)]
    end: String,
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// Aggregator configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sub-interval width in seconds
    #[arg(long)]
    window_secs: Option<f64>,

    /// Failure policy for sub-interval queries
    #[arg(long)]
    failure_policy: Option<PolicyArg>,

    /// Order in which samples are applied
    #[arg(long)]
    order: Option<OrderArg>,

    /// Largest number of sub-intervals a range may be split into
    #[arg(long)]
    max_sub_intervals: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Total step count for a range
    Steps {
        #[command(flatten)]
        log: LogArgs,

        #[command(flatten)]
        range: RangeArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Active walking duration for a range
    WalkingDuration {
        #[command(flatten)]
        log: LogArgs,

        #[command(flatten)]
        range: RangeArgs,

        #[command(flatten)]
        config: ConfigArgs,

        /// Output the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Dispatch a method-channel call (JSON) through the plugin bridge
    Call {
        #[command(flatten)]
        log: LogArgs,

        #[command(flatten)]
        config: ConfigArgs,

        /// Call JSON, e.g. {"method":"getSteps","arguments":{...}} (read from stdin if omitted)
        #[arg(long)]
        request: Option<String>,
    },

    /// Diagnose configuration and input files
    Doctor {
        /// Check an aggregator configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check a step log file
        #[arg(long)]
        log: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// JSON array of steps, or {"steps": [...], "outages": [...]}
    Json,
    /// Newline-delimited JSON (one step event per line)
    Ndjson,
}

#[derive(Clone, ValueEnum)]
enum PolicyArg {
    /// Any failed sub-interval fails the computation
    DiscardAll,
    /// Failed sub-intervals are skipped
    SkipFailed,
}

#[derive(Clone, ValueEnum)]
enum OrderArg {
    /// Apply samples as queries complete (timing dependent)
    Completion,
    /// Apply samples in partition order
    Interval,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

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

fn init_tracing(verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(io::stderr)
            .init();
    }
}

fn run(cli: Cli) -> Result<(), PedometerCliError> {
    match cli.command {
        Commands::Steps { log, range, json } => cmd_steps(&log, &range, json),
        Commands::WalkingDuration {
            log,
            range,
            config,
            json,
        } => cmd_walking_duration(&log, &range, &config, json),
        Commands::Call {
            log,
            config,
            request,
        } => cmd_call(&log, &config, request),
        Commands::Doctor { config, log, json } => {
            cmd_doctor(config.as_deref(), log.as_deref(), json)
        }
    }
}

fn cmd_steps(log: &LogArgs, range: &RangeArgs, json: bool) -> Result<(), PedometerCliError> {
    let pedometer = Pedometer::new(Arc::new(load_log(log)?))?;
    let range = parse_range(range)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let steps = runtime.block_on(pedometer.total_steps(&range))?;

    if json {
        let report = StepsReport {
            start: range.start,
            end: range.end,
            steps,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", steps);
    }

    Ok(())
}

fn cmd_walking_duration(
    log: &LogArgs,
    range: &RangeArgs,
    config: &ConfigArgs,
    json: bool,
) -> Result<(), PedometerCliError> {
    let pedometer = Pedometer::with_config(Arc::new(load_log(log)?), load_config(config)?)?;
    let range = parse_range(range)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(pedometer.walking_duration(&range))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Active duration: {:.3} s", report.total_seconds);
        println!(
            "Sub-intervals:   {} active / {} queried",
            report.active_intervals, report.sub_intervals
        );
        if report.failed_intervals > 0 {
            println!("Skipped:         {} failed", report.failed_intervals);
        }
    }

    Ok(())
}

fn cmd_call(
    log: &LogArgs,
    config: &ConfigArgs,
    request: Option<String>,
) -> Result<(), PedometerCliError> {
    let request = match request {
        Some(request) => request,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let call: MethodCall = serde_json::from_str(request.trim())?;

    let pedometer = Pedometer::with_config(Arc::new(load_log(log)?), load_config(config)?)?;
    let plugin = PedometerPlugin::new(pedometer);

    let runtime = tokio::runtime::Runtime::new()?;
    let response = runtime.block_on(plugin.handle(&call));

    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

fn cmd_doctor(
    config: Option<&Path>,
    log: Option<&Path>,
    json: bool,
) -> Result<(), PedometerCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} {}", PRODUCER_NAME, PEDOMETER_VERSION),
    });

    match config {
        Some(path) => checks.push(check_file(path, "config", |content| {
            let config = AggregatorConfig::from_json(content)?;
            Ok(format!(
                "window {} s, policy {}, order {}, max {} sub-intervals",
                config.window_secs,
                config.failure_policy.as_str(),
                config.sample_order.as_str(),
                config.max_sub_intervals
            ))
        })),
        None => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "using defaults (window {} s)",
                AggregatorConfig::default().window_secs
            ),
        }),
    }

    if let Some(path) = log {
        let ndjson = path.extension().is_some_and(|ext| ext == "ndjson");
        checks.push(check_file(path, "step_log", |content| {
            let log = if ndjson {
                StepLog::from_ndjson(content)?
            } else {
                StepLog::from_json(content)?
            };
            Ok(format!(
                "{} events, {} steps, {} outages",
                log.steps().len(),
                log.total_steps(),
                log.outages().len()
            ))
        }));
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass --request to `call`)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (ready for `call` and `--log -`)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PEDOMETER_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Pedometer Doctor Report");
        println!("=======================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PedometerCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn check_file(
    path: &Path,
    name: &str,
    parse: impl FnOnce(&str) -> Result<String, PedometerError>,
) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist", path.display()),
        };
    }

    let (status, message) = match fs::read_to_string(path) {
        Ok(content) => match parse(&content) {
            Ok(summary) => (CheckStatus::Ok, summary),
            Err(e) => (CheckStatus::Error, format!("Invalid {}: {}", name, e)),
        },
        Err(e) => (CheckStatus::Error, format!("Cannot read {}: {}", path.display(), e)),
    };

    DoctorCheck {
        name: name.to_string(),
        status,
        message,
    }
}

fn read_input(path: &Path) -> Result<String, PedometerCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn load_log(args: &LogArgs) -> Result<StepLog, PedometerCliError> {
    let input = read_input(&args.log)?;
    let log = match args.input_format {
        InputFormat::Json => StepLog::from_json(&input)?,
        InputFormat::Ndjson => StepLog::from_ndjson(&input)?,
    };
    Ok(log)
}

fn load_config(args: &ConfigArgs) -> Result<AggregatorConfig, PedometerCliError> {
    let mut config = match &args.config {
        Some(path) => AggregatorConfig::from_json(&fs::read_to_string(path)?)?,
        None => AggregatorConfig::default(),
    };

    if let Some(window_secs) = args.window_secs {
        config.window_secs = window_secs;
    }
    if let Some(policy) = &args.failure_policy {
        config.failure_policy = match policy {
            PolicyArg::DiscardAll => FailurePolicy::DiscardAll,
            PolicyArg::SkipFailed => FailurePolicy::SkipFailed,
        };
    }
    if let Some(order) = &args.order {
        config.sample_order = match order {
            OrderArg::Completion => SampleOrder::Completion,
            OrderArg::Interval => SampleOrder::Interval,
        };
    }
    if let Some(max) = args.max_sub_intervals {
        config.max_sub_intervals = max;
    }

    config.validate()?;
    Ok(config)
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, PedometerCliError> {
    let trimmed = value.trim();
    if let Ok(millis) = trimmed.parse::<f64>() {
        return Ok(instant_from_millis(millis)?);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PedometerCliError::InvalidTime(format!("{}: {}", value, e)))
}

fn parse_range(args: &RangeArgs) -> Result<TimeRange, PedometerCliError> {
    Ok(TimeRange::new(
        parse_instant(&args.start)?,
        parse_instant(&args.end)?,
    )?)
}

// Error types

#[derive(Debug)]
enum PedometerCliError {
    Io(io::Error),
    Pedometer(PedometerError),
    Json(serde_json::Error),
    InvalidTime(String),
    DoctorFailed,
}

impl From<io::Error> for PedometerCliError {
    fn from(e: io::Error) -> Self {
        PedometerCliError::Io(e)
    }
}

impl From<PedometerError> for PedometerCliError {
    fn from(e: PedometerError) -> Self {
        PedometerCliError::Pedometer(e)
    }
}

impl From<serde_json::Error> for PedometerCliError {
    fn from(e: serde_json::Error) -> Self {
        PedometerCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PedometerCliError> for CliError {
    fn from(e: PedometerCliError) -> Self {
        match e {
            PedometerCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PedometerCliError::Pedometer(e) => {
                let (code, hint) = match &e {
                    PedometerError::QueryFailed(_) | PedometerError::SubIntervalFailed { .. } => (
                        "QUERY_FAILED",
                        "Check the step log outages, or retry with --failure-policy skip-failed",
                    ),
                    PedometerError::InvalidConfig(_) => {
                        ("CONFIG_ERROR", "Run 'pedometer doctor --config <file>'")
                    }
                    PedometerError::TooManySubIntervals { .. } => (
                        "RANGE_TOO_LARGE",
                        "Narrow the range, widen --window-secs or raise --max-sub-intervals",
                    ),
                    _ => ("INPUT_ERROR", "Check the step log and range arguments"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            PedometerCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PedometerCliError::InvalidTime(msg) => CliError {
                code: "INVALID_TIME".to_string(),
                message: msg,
                hint: Some("Use RFC 3339 (2024-01-15T10:00:00Z) or epoch milliseconds".to_string()),
            },
            PedometerCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct StepsReport {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    steps: u64,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
