//! autotask - cron-driven task scheduling and execution engine
//!
//! Main entry point for the autotask CLI.

mod bootstrap;
mod handlers;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use autotask_config::{Config, ConfigLoader, ConfigValidator, LogFormat, LoggingConfig};
use autotask_protocols::ExecutionEvent;
use autotask_scheduler::parse_cron;

/// autotask CLI.
#[derive(Parser)]
#[command(name = "autotask")]
#[command(about = "Cron-driven task scheduling and execution engine")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/autotask.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler in the foreground until Ctrl-C (default)
    Run,

    /// List task definitions and their schedules
    List,

    /// Execute one task now and print the outcome
    Exec {
        /// Task type to execute
        task_type: String,

        /// Parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },

    /// Validate the configuration file
    Validate,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    // Console layer
    layers.push(match logging.format {
        LogFormat::Text => fmt::layer().with_target(true).with_ansi(true).boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    });

    // File layer, daily rotation
    if let Some(dir) = &logging.directory {
        let log_dir = PathBuf::from(ConfigLoader::expand_path(&dir.to_string_lossy()));
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("autotask")
            .filename_suffix("log")
            .max_log_files(logging.max_log_files)
            .build(&log_dir)?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Keep the writer alive for the whole process
        static GUARD: OnceLock<WorkerGuard> = OnceLock::new();
        let _ = GUARD.set(guard);

        layers.push(match logging.format {
            LogFormat::Text => fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .boxed(),
            LogFormat::Json => fmt::layer().json().with_writer(non_blocking).boxed(),
        });
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    ConfigLoader::load_or_default(path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    init_tracing(&config.logging)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config).await,
        Commands::List => list(&config),
        Commands::Exec { task_type, params } => exec(&config, &task_type, &params).await,
        Commands::Validate => validate(&config),
    }
}

/// Check the configuration, logging warnings. Fails on the first error.
fn check_config(config: &Config) -> Result<()> {
    let result = ConfigValidator::validate(config)?;
    for warning in &result.warnings {
        warn!(path = %warning.path, "{}", warning.message);
    }
    for err in &result.errors {
        error!(path = %err.path, "{}", err.message);
    }
    result.into_result()?;
    Ok(())
}

async fn run(config: &Config) -> Result<()> {
    check_config(config)?;

    let scheduler = bootstrap::build_scheduler(config)?;
    let events = scheduler.subscribe();
    let event_logger = tokio::spawn(log_events(events));

    scheduler
        .initialize()
        .context("failed to initialize scheduler")?;

    info!(
        tasks = scheduler.task_definitions().len(),
        schedules = scheduler.schedules().len(),
        "autotask running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("Shutting down");
    scheduler.shutdown().await;
    event_logger.abort();

    let metrics = scheduler.metrics();
    info!(
        started = metrics.executions_started,
        succeeded = metrics.executions_succeeded,
        failed = metrics.executions_failed,
        "Scheduler stopped"
    );
    Ok(())
}

async fn log_events(mut events: tokio::sync::broadcast::Receiver<ExecutionEvent>) {
    loop {
        match events.recv().await {
            Ok(ExecutionEvent::Started { execution_id, task_type, .. }) => {
                info!(target: "autotask::events", %task_type, %execution_id, "started");
            }
            Ok(ExecutionEvent::Succeeded { execution_id, task_type, duration_ms, .. }) => {
                info!(target: "autotask::events", %task_type, %execution_id, duration_ms, "succeeded");
            }
            Ok(ExecutionEvent::Failed { execution_id, task_type, duration_ms, error }) => {
                warn!(target: "autotask::events", %task_type, %execution_id, duration_ms, %error, "failed");
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event logger lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn list(config: &Config) -> Result<()> {
    let registry = bootstrap::build_registry(config)?;

    if registry.is_empty() {
        println!("No tasks configured.");
        return Ok(());
    }

    println!("{:<24} {:<20} {:>10}  DESCRIPTION", "TASK TYPE", "SCHEDULE", "TIMEOUT");
    for def in registry.definitions() {
        println!(
            "{:<24} {:<20} {:>8}ms  {}",
            def.task_type,
            def.cron_schedule.as_deref().unwrap_or("-"),
            def.timeout_ms,
            def.description
        );
    }
    Ok(())
}

async fn exec(config: &Config, task_type: &str, params: &str) -> Result<()> {
    let parameters: Value =
        serde_json::from_str(params).context("--params must be valid JSON")?;

    let scheduler = bootstrap::build_scheduler(config)?;
    match scheduler.execute_task(task_type, parameters).await {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn validate(config: &Config) -> Result<()> {
    check_config(config)?;

    for task in config.scheduled_tasks() {
        if let Some(expression) = &task.cron_schedule {
            parse_cron(expression)?;
        }
    }
    let registry = bootstrap::build_registry(config)?;

    println!("Configuration is valid ({} tasks).", registry.len());
    Ok(())
}
