//! locus - geolocation inference service.
//!
//! Clients submit ground-truth observations (a GNSS fix plus the
//! radio environment seen at that instant) and query for a location
//! estimate from a radio environment alone. The service learns
//! per-emitter location models from the submitted corpus.

mod api;
mod auth;
mod config;
mod error;
mod locate;
mod logging;
mod server;
mod tasks;

use std::process::exit;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tracing::{error, info};

use locus_db::LocusDb;
use locus_worker::{AggregationWorker, ExtractConfig, WorkerConfig};

use crate::config::Config;
use crate::server::AppState;

/// Command line interface parser.
#[derive(Debug, Parser)]
#[command(name = "locus", about = "Geolocation inference service")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API with background aggregation workers
    Serve,
    /// Run aggregation workers only
    Worker,
    /// Run one partition maintenance sweep and exit
    Partitions {
        /// Drop dependent objects along with expired partitions
        #[arg(long)]
        cascade: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            exit(1);
        }
    };

    let db = match LocusDb::connect(&config.database_url, config.max_db_connections).await {
        Ok(db) => db,
        Err(e) => {
            error!("Storage unreachable: {e}");
            exit(2);
        }
    };
    if let Err(e) = db.ensure_schema().await {
        error!("Storage unusable: {e}");
        exit(2);
    }

    match cli.command {
        Command::Serve => serve(db, config).await?,
        Command::Worker => {
            let handles = spawn_workers(&db, &config);
            for handle in handles {
                handle.await?;
            }
        }
        Command::Partitions { cascade } => {
            db.maintain_partitions(config.partition_horizon_days, config.retain_days, cascade)
                .await?;
            info!("Partition maintenance complete");
        }
    }

    Ok(())
}

async fn serve(db: LocusDb, config: Config) -> anyhow::Result<()> {
    // Make sure today's and the horizon's partitions exist before the
    // first append can arrive.
    db.maintain_partitions(config.partition_horizon_days, config.retain_days, false)
        .await?;

    let maintenance = tasks::partition_maintenance_task(
        db.clone(),
        config.partition_horizon_days,
        config.retain_days,
    );
    let workers = spawn_workers(&db, &config);

    let bind_addr = config.bind_addr;
    let state = AppState {
        db,
        config: Arc::new(config),
    };
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("locus server started at {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in workers {
        handle.abort();
    }
    maintenance.abort();
    info!("locus server stopped");
    Ok(())
}

fn spawn_workers(db: &LocusDb, config: &Config) -> Vec<JoinHandle<()>> {
    let worker_config = WorkerConfig {
        batch_size: config.worker_batch,
        extract: ExtractConfig {
            gnss_max_accuracy_m: config.gnss_max_accuracy_m,
            laa_filter: config.laa_filter,
        },
        ..WorkerConfig::default()
    };

    (0..config.worker_concurrency)
        .map(|i| {
            let worker = AggregationWorker::new(db.clone(), worker_config.clone());
            info!(worker = i, "Starting aggregation worker");
            tokio::spawn(worker.run())
        })
        .collect()
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => info!("SIGTERM received"),
            _ = sigint.recv() => info!("SIGINT received"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("ctrl-c received");
    }
}
