//! Graph maintenance service - Main entry point
//!
//! Runs the maintenance jobs on their schedules and serves the admin API, or
//! runs jobs once and exits with `--run-once`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use graph_common::config::{resolve_data_folder, GraphConfig, StoreBackend, DATA_FOLDER_ENV};
use graph_common::events::EventBus;
use graph_jobs::cache::EntityCache;
use graph_jobs::{build_router, build_scheduler, build_services, AppState};
use graph_store::{ConnectionProvider, MemoryStore, SqliteStore, StoreMetrics};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for graph-jobs
#[derive(Parser, Debug)]
#[command(name = "graph-jobs")]
#[command(about = "Maintenance jobs and admin API for the graph store")]
#[command(version)]
struct Args {
    /// Data folder holding the store
    #[arg(short, long, env = DATA_FOLDER_ENV)]
    data_folder: Option<PathBuf>,

    /// Config file (default: <config dir>/graph-core/config.toml)
    #[arg(short, long, env = "GRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "GRAPH_PORT")]
    port: Option<u16>,

    /// Run one job (or `all`) and exit instead of serving
    #[arg(long, value_name = "JOB")]
    run_once: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "graph_jobs=debug,graph_store=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = GraphConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory store, nothing will be persisted");
            serve(MemoryStore::new(), config, args).await
        }
        StoreBackend::Sqlite => {
            let data_folder = resolve_data_folder(args.data_folder.as_deref(), DATA_FOLDER_ENV, &config);
            std::fs::create_dir_all(&data_folder)
                .with_context(|| format!("Failed to create data folder {}", data_folder.display()))?;
            let db_path = config.database_path(&data_folder);
            info!("Database: {}", db_path.display());

            let store = SqliteStore::open(&db_path, &config.store)
                .await
                .context("Failed to open store")?;
            serve(store, config, args).await
        }
    }
}

async fn serve<P: ConnectionProvider>(provider: P, config: GraphConfig, args: Args) -> Result<()> {
    let events = EventBus::new(config.events.capacity);
    let metrics = Arc::new(StoreMetrics::new());
    let services = build_services(provider, &config, events.clone(), Arc::clone(&metrics));
    let scheduler = Arc::new(build_scheduler(services, &config.transformers));

    if let Some(job) = args.run_once {
        return run_once(&scheduler, &job).await;
    }

    let cache = Arc::new(EntityCache::new());
    let invalidation = cache.spawn_invalidation(&events, scheduler.cancellation_token());
    scheduler.start().await;

    let app = build_router(AppState::new(Arc::clone(&scheduler), metrics));
    let port = args.port.unwrap_or(config.server.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    scheduler.shutdown().await;
    if let Err(e) = invalidation.await {
        warn!(error = %e, "Cache invalidation task ended abnormally");
    }
    info!("Server shutdown complete");
    Ok(())
}

async fn run_once(scheduler: &graph_jobs::scheduler::JobScheduler, job: &str) -> Result<()> {
    if job == "all" {
        let mut failed = 0;
        for (name, result) in scheduler.run_all().await {
            match result {
                Ok(outcome) => info!(job = name, processed = outcome.processed, "Job finished"),
                Err(e) => {
                    error!(job = name, error = %e, "Job failed");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            bail!("{} job(s) failed", failed);
        }
        return Ok(());
    }

    let outcome = scheduler
        .run_now(job)
        .await
        .with_context(|| format!("Job {} failed", job))?;
    info!(job, processed = outcome.processed, transactions = outcome.transactions, "Job finished");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
