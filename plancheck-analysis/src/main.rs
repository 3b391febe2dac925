//! plancheck-analysis - document analysis service
//!
//! Startup order: resolve root folder and config, open the database, build
//! the dispatcher, sweep records left over from a previous run, then serve
//! HTTP until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use plancheck_analysis::config::ServiceConfig;
use plancheck_analysis::db::{self, AnalysisStore, SqliteDocumentDirectory};
use plancheck_analysis::services::{Dispatcher, HttpProvider};
use plancheck_analysis::{build_router, AppState};
use plancheck_common::config::{ensure_directory_exists, find_config_file, resolve_root_folder, ROOT_FOLDER_ENV};
use plancheck_common::events::EventBus;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "plancheck-analysis";

#[derive(Parser, Debug)]
#[command(name = "plancheck-analysis")]
#[command(about = "Document analysis pipeline for plancheck")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "PLANCHECK_ANALYSIS_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder for the database and local state
    #[arg(short, long, env = ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    /// Address to listen on, overrides the config file
    #[arg(short, long, env = "PLANCHECK_ANALYSIS_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plancheck_analysis=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        "Starting {} v{} [{}] built {} ({})",
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config_path = args.config.clone().or_else(|| find_config_file(SERVICE_NAME));
    let mut config = ServiceConfig::load(config_path.as_deref())
        .context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    // clap already folded the env var into args.root_folder
    let root_folder = resolve_root_folder(
        args.root_folder.as_deref().or(config.root_folder.as_deref()),
        ROOT_FOLDER_ENV,
        config_path.as_deref(),
    );
    ensure_directory_exists(&root_folder).context("Failed to create root folder")?;
    info!("Root folder: {}", root_folder.display());

    let db_path = config.database_path(&root_folder);
    let pool = db::init_database_pool(&db_path, &config.database)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let provider = HttpProvider::new(&config.provider, config.dispatcher.provider_timeout())
        .context("Failed to configure analysis provider")?;

    let shutdown = CancellationToken::new();
    let events = EventBus::new(config.dispatcher.event_capacity);
    let dispatcher = Dispatcher::new(
        AnalysisStore::new(pool.clone(), config.database.max_lock_wait_ms),
        Arc::new(SqliteDocumentDirectory::new(pool.clone())),
        Arc::new(provider),
        config.catalog(),
        &config.dispatcher,
        events,
        shutdown.clone(),
    );

    if config.dispatcher.recover_on_startup {
        dispatcher
            .recover()
            .await
            .context("Failed to recover analyses from previous run")?;
    } else {
        warn!("Startup recovery disabled, leftover pending/processing records are not touched");
    }
    dispatcher.start_stale_sweep();

    info!(
        workers = config.dispatcher.max_concurrent_analyses,
        timeout_secs = config.dispatcher.provider_timeout_secs,
        analysis_types = config.analysis_types.len(),
        "Dispatcher ready"
    );

    let app = build_router(AppState::new(dispatcher.clone()));

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("Failed to listen for Ctrl-C: {}", e);
                    }
                    info!("Shutdown signal received");
                }
                _ = server_shutdown.cancelled() => {}
            }
            server_shutdown.cancel();
        })
        .await
        .context("HTTP server error")?;

    dispatcher.shutdown().await;
    pool.close().await;
    info!("{} stopped", SERVICE_NAME);

    Ok(())
}
