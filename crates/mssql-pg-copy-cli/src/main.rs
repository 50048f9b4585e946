//! mssql-pg-copy CLI - table-by-table MSSQL to PostgreSQL migration.

use clap::{Parser, Subcommand};
use mssql_pg_copy::api::{self, ApiState};
use mssql_pg_copy::config::parse_table_list;
use mssql_pg_copy::{
    render_summary, Config, DatabaseConnector, InMemoryJobStore, MigrateError, MigrationJob,
    MssqlPool, Orchestrator, PgPool, SourcePool, TargetPool,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mssql-pg-copy")]
#[command(about = "Copy MSSQL tables into PostgreSQL, batch by batch")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (default: environment variables and .env)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a migration to completion
    Run {
        /// Comma-separated tables to migrate (default: all base tables)
        #[arg(long)]
        tables: Option<String>,

        /// Rows per batch transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Skip rows that already exist in the target instead of counting them as errors
        #[arg(long)]
        skip_existing: bool,
    },

    /// Serve the HTTP job-control API
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:3001")]
        bind: String,
    },

    /// List the source tables that would be migrated
    Tables,

    /// Check connectivity to both databases
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)?;
    let cancel_token = setup_signal_handler();

    match cli.command {
        Commands::Serve { ref bind } => {
            let orchestrator = Arc::new(Orchestrator::new(Arc::new(InMemoryJobStore::new())));
            let state = ApiState::new(orchestrator, Arc::new(DatabaseConnector));
            api::serve(bind, state, cancel_token).await?;
        }

        Commands::Run {
            ref tables,
            batch_size,
            skip_existing,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(tables) = tables {
                config.migration.tables = parse_table_list(tables);
            }
            if let Some(size) = batch_size {
                config.migration.batch_size = size;
            }
            if skip_existing {
                config.migration.skip_existing = true;
            }
            config.validate()?;

            let job = run_migration(config, &cancel_token).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else {
                print!("{}", render_summary(&job));
            }

            if let Some(err) = job.outcome_error() {
                return Err(err);
            }
        }

        Commands::Tables => {
            let config = load_config(&cli.config)?;
            let source = MssqlPool::connect(config.source).await?;
            let tables = source.list_tables().await;
            source.close().await;
            let tables = tables?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                for table in &tables {
                    println!("{}", table);
                }
            }
        }

        Commands::HealthCheck => {
            let config = load_config(&cli.config)?;
            let source = check_source(config.source).await;
            let target = check_target(config.target).await;
            let healthy = source.is_ok() && target.is_ok();

            if cli.output_json {
                let report = serde_json::json!({
                    "healthy": healthy,
                    "source": health_json(&source),
                    "target": health_json(&target),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Health Check Results:");
                print_health("Source (MSSQL)", &source);
                print_health("Target (PostgreSQL)", &target);
                println!(
                    "\n  Overall: {}",
                    if healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !healthy {
                return Err(MigrateError::Connectivity("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

/// Connect both sides, run the job, and always release both connections.
async fn run_migration(
    config: Config,
    cancel: &CancellationToken,
) -> Result<MigrationJob, MigrateError> {
    let source = MssqlPool::connect(config.source.clone()).await?;
    let target = match PgPool::connect(config.target.clone()).await {
        Ok(target) => target,
        Err(e) => {
            source.close().await;
            return Err(e);
        }
    };

    let job = MigrationJob::new(config.source, config.target)
        .with_tables(config.migration.tables)
        .with_batch_size(config.migration.batch_size)
        .with_skip_existing(config.migration.skip_existing);
    info!("Starting migration {}", job.id);

    let orchestrator = Orchestrator::new(Arc::new(InMemoryJobStore::new()));
    let result = orchestrator.run(job, &source, &target, cancel).await;

    source.close().await;
    target.close().await;
    result
}

fn load_config(path: &Option<PathBuf>) -> Result<Config, MigrateError> {
    match path {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        None => Config::from_env(),
    }
}

async fn check_source(config: mssql_pg_copy::SourceConfig) -> Result<String, MigrateError> {
    let source = MssqlPool::connect(config).await?;
    let version = source.server_version().await;
    source.close().await;
    version
}

async fn check_target(config: mssql_pg_copy::TargetConfig) -> Result<String, MigrateError> {
    let target = PgPool::connect(config).await?;
    let version = target.server_version().await;
    target.close().await;
    version
}

fn health_json(result: &Result<String, MigrateError>) -> serde_json::Value {
    match result {
        Ok(version) => serde_json::json!({"connected": true, "version": version}),
        Err(e) => serde_json::json!({"connected": false, "error": e.to_string()}),
    }
}

fn print_health(label: &str, result: &Result<String, MigrateError>) {
    match result {
        Ok(version) => {
            println!("  {}: OK", label);
            println!("    {}", version.lines().next().unwrap_or_default());
        }
        Err(e) => {
            println!("  {}: FAILED", label);
            println!("    Error: {}", e);
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), MigrateError> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        other => {
            return Err(MigrateError::Config(format!(
                "Invalid verbosity '{}'. Valid values: debug, info, warn, error",
                other
            )))
        }
    };

    // RUST_LOG wins over --verbosity
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => {
            return Err(MigrateError::Config(format!(
                "Invalid log format '{}'. Valid values: text, json",
                other
            )))
        }
    }

    Ok(())
}

/// Cancel the returned token on SIGINT or SIGTERM.
///
/// The running batch still commits; the job stops at the next batch boundary.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    let token_int = cancel_token.clone();
    tokio::spawn(async move {
        if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
            sigint.recv().await;
            eprintln!("\nReceived SIGINT. Stopping after the current batch...");
            token_int.cancel();
        }
    });

    let token_term = cancel_token.clone();
    tokio::spawn(async move {
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            sigterm.recv().await;
            eprintln!("\nReceived SIGTERM. Stopping after the current batch...");
            token_term.cancel();
        }
    });

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current batch...");
            token.cancel();
        }
    });

    cancel_token
}
