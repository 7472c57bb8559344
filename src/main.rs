//! Dashboard API server.
//!
//! Serves the in-memory backends, optionally seeded from a snapshot file.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use jobqueue_dashboard::{
    build_router, snapshot::Snapshot, AppState, DashboardConfig, MemoryDocumentStore,
    MemoryJobSubmitter, MemoryQueueBackend,
};

#[derive(Parser, Debug)]
#[command(name = "jobqueue-dashboard")]
#[command(about = "Status and control API for a job queue")]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "DASHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    ip: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// JSON snapshot to seed the backends with
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Log filter, e.g. `info` or `jobqueue_dashboard=debug`
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = DashboardConfig::load(cli.config.as_deref())?;
    if let Some(ip) = cli.ip {
        config.dashboard_ip = ip;
    }
    if let Some(port) = cli.port {
        config.dashboard_port = port;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_level))
        .init();

    let store = Arc::new(MemoryDocumentStore::new());
    let queues = Arc::new(MemoryQueueBackend::new());

    if let Some(path) = &cli.snapshot {
        Snapshot::load(path)
            .await?
            .seed(store.as_ref(), queues.as_ref())
            .await?;
        info!(path = %path.display(), "loaded snapshot");
    }

    let bind_addr = config.bind_addr();
    let state = AppState {
        submitter: Arc::new(MemoryJobSubmitter::new(store.clone(), queues.clone())),
        store,
        queues,
        config: Arc::new(config),
    };
    let app = build_router(state)?;

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("dashboard listening on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
