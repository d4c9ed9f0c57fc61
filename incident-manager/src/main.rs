//! LLM-Incident-Manager service binary.
//!
//! Wires the components of the incident pipeline:
//! - Storage: in-memory alert/incident store and rate-limit counters
//! - Engine: correlator, rate limiter, ingestion pipeline
//! - API: REST ingestion and query surface

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use llm_incident_api::prelude::*;
use llm_incident_core::config::Config;
use llm_incident_engine::prelude::*;
use llm_incident_storage::prelude::*;

/// Incident-manager CLI arguments
#[derive(Debug, Parser)]
#[clap(
    name = "incident-manager",
    version,
    about = "Alert correlation and incident lifecycle service"
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[clap(long, env = "INCIDENT_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[clap(long, env = "INCIDENT_LOG_JSON", global = true)]
    log_json: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the service (default if no subcommand given)
    Serve,
    /// Print the resolved configuration and exit
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    info!("Starting LLM-Incident-Manager v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;

    match cli.command {
        Some(Commands::Config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Commands::Serve) | None => run_serve_command(config).await,
    }
}

/// Initialize the tracing subscriber
fn init_logging(cli: &Cli) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    if cli.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

/// Build the pipeline and serve the API until shutdown
async fn run_serve_command(config: Config) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let counters = Arc::new(MemoryCounterStore::with_defaults());

    let correlator = Correlator::new(
        CorrelatorConfig {
            window_secs: config.correlation_window_secs,
            ..Default::default()
        },
        Arc::clone(&store) as Arc<dyn IncidentStore>,
    )
    .context("correlator configuration rejected")?;

    let limiter = TriggerRateLimiter::new(
        RateLimiterConfig {
            window_secs: config.analysis_window_secs,
        },
        counters,
    )
    .context("rate limiter configuration rejected")?;

    let pipeline = IngestPipeline::new(
        PipelineConfig {
            storage_timeout_ms: config.storage_timeout_ms,
            retry_max_attempts: config.retry_max_attempts,
            retry_backoff_ms: config.retry_backoff_ms,
        },
        Arc::clone(&store) as Arc<dyn AlertStore>,
        Arc::clone(&store) as Arc<dyn IncidentStore>,
        correlator,
        limiter,
        Arc::new(LogPublisher),
        Arc::new(NoopAnalysisTrigger),
        Arc::new(NoopSummaryGenerator),
    );

    let state = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
        incidents: store,
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let router = create_router(ApiConfig::default(), state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolve on ctrl-c
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
