//! linguaflow-ai - Anki Import microservice
//!
//! **Module Identity:**
//! - Name: linguaflow-ai (Anki Import)
//! - Default port: 8100
//!
//! Accepts `.apkg` uploads and returns the decks' notes as plain flashcard
//! records with inlined media.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use linguaflow_ai::backend::SqliteBackend;
use linguaflow_ai::services::{AnkiImporter, NoteFailurePolicy};
use linguaflow_ai::AppState;
use linguaflow_common::config::{
    default_config_path, load_toml_config, CliOverrides, ServiceConfig, TomlConfig,
};

const MODULE_NAME: &str = "linguaflow-ai";

/// Command-line arguments for linguaflow-ai
#[derive(Parser, Debug)]
#[command(name = "linguaflow-ai")]
#[command(about = "Anki deck import microservice for LinguaFlow")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "LINGUAFLOW_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "LINGUAFLOW_HOST")]
    host: Option<String>,

    /// Directory for per-import working directories
    #[arg(short, long)]
    work_root: Option<PathBuf>,

    /// Bootstrap TOML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(|| default_config_path(MODULE_NAME));
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TomlConfig::default(),
    };

    let config = ServiceConfig::resolve(
        MODULE_NAME,
        CliOverrides {
            work_root: args.work_root,
            host: args.host,
            port: args.port,
            log_level: args.log_level,
        },
        toml_config,
    );

    init_tracing(&config)?;

    info!("Starting linguaflow-ai (Anki Import) microservice");
    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("LINGUAFLOW_COMMIT"),
        built_at = env!("LINGUAFLOW_BUILT_AT"),
        profile = if cfg!(debug_assertions) { "debug" } else { "release" },
        "Build identification"
    );
    // load_toml_config ran before the subscriber was installed
    match &config_path {
        Some(path) if path.exists() => info!("Config file: {}", path.display()),
        Some(path) => warn!("Config file not found at {}, using compiled defaults", path.display()),
        None => warn!("No config directory on this platform, using compiled defaults"),
    }
    info!("Work root: {}", config.work_root.display());

    tokio::fs::create_dir_all(&config.work_root)
        .await
        .with_context(|| format!("Failed to create work root {}", config.work_root.display()))?;

    let policy = NoteFailurePolicy::from_skip_flag(config.skip_failed_notes);
    info!(policy = ?policy, "Note failure policy");

    let importer = AnkiImporter::initialize(
        Arc::new(SqliteBackend::new()),
        config.work_root.clone(),
        policy,
    )
    .await;

    let state = AppState::new(
        Arc::new(importer),
        config.max_upload_bytes,
        config.allowed_origins.clone(),
    );
    let app = linguaflow_ai::build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Console logging, or file logging when `logging.file` is set
fn init_tracing(config: &ServiceConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "linguaflow_ai={level},linguaflow_common={level},tower_http={level}",
            level = config.log_level.to_lowercase()
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
