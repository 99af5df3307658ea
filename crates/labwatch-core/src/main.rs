//! LabWatch CLI
//!
//! Command-line interface for the LabWatch alert evaluator.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use labwatch::alerting::{
    AlertEvaluator, AlertMonitor, AlertQuery, AlertRepository, InMemoryAlertRepository,
    NotificationSender,
};
use labwatch::api::HttpServer;
use labwatch::config::{default_config_path, LoggingConfig};
use labwatch::models::{Alert, AlertDecision, AlertStatus, Evaluation, SensorReading};
use labwatch::Config;

/// LabWatch - Alerting for laboratory environment sensors
#[derive(Parser)]
#[command(name = "labwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "LABWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host to bind to (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// HTTP API port (overrides server.port)
        #[arg(long, env = "LABWATCH_HTTP_PORT")]
        port: Option<u16>,
    },

    /// Evaluate a single reading without persisting anything
    Evaluate {
        /// JSON reading file, or `-` for stdin
        #[arg(long)]
        reading: String,

        /// JSON array of alerts currently open for the sensor
        #[arg(long)]
        open_alerts: Option<PathBuf>,
    },

    /// Feed newline-delimited readings through an in-memory monitor
    Replay {
        /// NDJSON readings file, or `-` for stdin
        #[arg(long)]
        input: String,
    },

    /// Show the effective threshold table
    Thresholds,

    /// Load and validate the configuration
    CheckConfig,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        generate_completions(shell);
        return ExitCode::SUCCESS;
    }

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let _guard = init_logging(&config.logging, cli.verbose);

    // Execute command
    let result = match cli.command {
        Commands::Serve { host, port } => run_serve(config, host, port).await,
        Commands::Evaluate {
            reading,
            open_alerts,
        } => run_evaluate(&config, &reading, open_alerts.as_deref(), cli.format),
        Commands::Replay { input } => run_replay(&config, &input, cli.format).await,
        Commands::Thresholds => run_thresholds(&config, cli.format),
        Commands::CheckConfig => run_check_config(&config, cli.config.as_deref(), cli.format),
        Commands::Completions { .. } => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr, and additionally to daily files when a directory is set.
/// The returned guard flushes the file writer on drop.
fn init_logging(config: &LoggingConfig, verbose: bool) -> Option<WorkerGuard> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
    };

    let json = config.format.eq_ignore_ascii_case("json");
    let stderr_json = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let stderr_pretty = (!json).then(|| fmt::layer().with_writer(std::io::stderr));

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "labwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().json().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_json)
        .with(stderr_pretty)
        .with(file_layer)
        .init();

    guard
}

fn build_monitor(config: &Config) -> anyhow::Result<AlertMonitor> {
    let evaluator = Arc::new(AlertEvaluator::new(&config.thresholds)?);
    let repository: Arc<dyn AlertRepository> = Arc::new(InMemoryAlertRepository::new());

    let notifier = NotificationSender::new(
        config.notifications.channels.clone(),
        config.notifications.timeout,
    )?;

    Ok(AlertMonitor::new(evaluator, repository)
        .with_notifier(notifier)
        .with_config(config.alerting.clone()))
}

async fn run_serve(config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let metrics = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let monitor = Arc::new(build_monitor(&config)?);

    info!(
        addr = %addr,
        channels = config.notifications.channels.len(),
        "Starting LabWatch"
    );

    HttpServer::new(monitor, Some(metrics))
        .serve(&addr, shutdown_signal())
        .await?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn run_evaluate(
    config: &Config,
    reading: &str,
    open_alerts: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let evaluator = AlertEvaluator::new(&config.thresholds)?;

    let reading: SensorReading = serde_json::from_str(&read_input(reading)?)
        .context("reading is not a valid sensor reading")?;

    let open_alerts: Vec<Alert> = match open_alerts {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw).context("open alerts must be a JSON array of alerts")?
        }
        None => Vec::new(),
    };

    let evaluation = evaluator.evaluate(&reading, &open_alerts);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&evaluation)?),
        OutputFormat::Text => print_evaluation(&evaluation),
    }

    Ok(())
}

async fn run_replay(config: &Config, input: &str, format: OutputFormat) -> anyhow::Result<()> {
    let monitor = build_monitor(config)?;

    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let file = std::fs::File::open(input).with_context(|| format!("failed to open {input}"))?;
        Box::new(BufReader::new(file))
    };

    let mut count = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let reading: SensorReading = serde_json::from_str(&line)
            .with_context(|| format!("line {} is not a valid sensor reading", index + 1))?;
        let evaluation = monitor.process(&reading).await?;
        count += 1;

        match format {
            OutputFormat::Json => {
                let line = serde_json::json!({
                    "reading": reading.with_status(evaluation.status),
                    "evaluation": evaluation,
                });
                println!("{line}");
            }
            OutputFormat::Text => print_evaluation(&evaluation),
        }
    }

    let open = monitor
        .repository()
        .list(&AlertQuery {
            status: Some(AlertStatus::Open),
            ..AlertQuery::default()
        })
        .await?;

    info!(readings = count, open_alerts = open.len(), "Replay finished");

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&open)?),
        OutputFormat::Text => {
            println!();
            println!("Open alerts: {}", open.len());
            for alert in &open {
                println!(
                    "  {} [{}] {} {}",
                    alert.id, alert.severity, alert.sensor_id, alert.message
                );
            }
        }
    }

    Ok(())
}

fn run_thresholds(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let evaluator = AlertEvaluator::new(&config.thresholds)?;
    let table = evaluator.table();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(table)?),
        OutputFormat::Text => {
            println!("{:<15} {:<16} {:<9} RULE", "SENSOR", "CHECK", "SEVERITY");
            for (sensor_type, checks) in table.iter() {
                for check in checks {
                    for level in check.levels() {
                        println!(
                            "{:<15} {:<16} {:<9} {} {}",
                            sensor_type,
                            check.kind,
                            level.severity,
                            level.operator.symbol(),
                            level.threshold
                        );
                    }
                }
            }
            println!();
            println!(
                "People counts below {:.2} confidence are rejected",
                table.min_people_confidence
            );
        }
    }

    Ok(())
}

fn run_check_config(
    config: &Config,
    path: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    config.validate()?;

    let source = path
        .map(Path::to_path_buf)
        .or_else(|| default_config_path().filter(|p| p.exists()));

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => {
            match source {
                Some(path) => println!("Configuration OK ({})", path.display()),
                None => println!("Configuration OK (defaults and environment)"),
            }
            println!("  server:        {}:{}", config.server.host, config.server.port);
            println!("  channels:      {}", config.notifications.channels.len());
            println!("  log level:     {}", config.logging.level);
        }
    }

    Ok(())
}

fn read_input(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("failed to read {source}"))
    }
}

fn print_evaluation(evaluation: &Evaluation) {
    println!("{} {:?}", evaluation.sensor_id, evaluation.status);

    for decision in &evaluation.decisions {
        match decision {
            AlertDecision::NoAction { kind } => println!("  {kind:<16} no action"),
            AlertDecision::Raise(alert) => {
                println!("  {:<16} raise {}: {}", alert.kind, alert.severity, alert.message);
            }
            AlertDecision::Escalate {
                alert_id,
                kind,
                previous_severity,
                severity,
                ..
            } => println!("  {kind:<16} escalate {alert_id} {previous_severity} -> {severity}"),
            AlertDecision::Resolve { alert_id, kind, .. } => {
                println!("  {kind:<16} resolve {alert_id}");
            }
        }
    }

    for error in &evaluation.errors {
        println!("  error: {error}");
    }
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "labwatch", &mut std::io::stdout());
}
