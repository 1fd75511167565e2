//! greslet daemon
//!
//! Main daemon process: serves the REST surface and drives the scheduling
//! loop over the shared snapshot store, submission spool and ssh launcher.

use anyhow::Context;
use clap::Parser;
use greslet_api::create_router;
use greslet_core::DaemonConfig;
use greslet_exec::SshLauncher;
use greslet_queue::{FileSubmissionStore, QueueAdapter, SubmissionStore};
use greslet_scheduler::{LifecycleMonitor, SchedulingLoop, UsageLedger};
use greslet_state::SnapshotStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// greslet daemon - GPU and storage scheduler for shared compute fleets
#[derive(Parser, Debug)]
#[command(name = "gresletd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind the API server (overrides config)
    #[arg(long)]
    address: Option<String>,

    /// Port for the API server (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Seconds between scheduling cycles (overrides config)
    #[arg(long)]
    cycle_interval: Option<u64>,

    /// Submission spool directory (overrides config)
    #[arg(long)]
    spool_dir: Option<PathBuf>,

    /// Log level (overrides config)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DaemonConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DaemonConfig::default(),
    };
    if let Some(address) = args.address {
        config.api.bind_address = address;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(secs) = args.cycle_interval {
        config.scheduler.cycle_interval_secs = secs;
    }
    if let Some(dir) = args.spool_dir {
        config.queue.spool_dir = dir;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // Initialize logging
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting greslet daemon v{}", env!("CARGO_PKG_VERSION"));

    // Shared components
    let store = Arc::new(SnapshotStore::new(config.scheduler.staleness_threshold()));
    let submissions: Arc<dyn SubmissionStore> = Arc::new(
        FileSubmissionStore::open(config.queue.spool_dir.clone())
            .await
            .context("opening submission spool")?,
    );
    let queue = Arc::new(QueueAdapter::new(submissions.clone()));
    let ledger = Arc::new(UsageLedger::new(chrono_window(
        config.scheduler.usage_window_secs,
    )));
    let launcher = Arc::new(SshLauncher::new(config.exec.clone()));
    let lifecycle = Arc::new(LifecycleMonitor::new(
        store.clone(),
        launcher.clone(),
        ledger.clone(),
    ));

    let scheduler = Arc::new(SchedulingLoop::new(
        config.scheduler.clone(),
        store.clone(),
        queue,
        ledger,
        lifecycle.clone(),
        launcher,
    ));

    // Scheduling loop with graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run(shutdown_rx).await }
    });

    // API server
    let router = create_router(store, submissions, lifecycle);
    let addr: SocketAddr = format!("{}:{}", config.api.bind_address, config.api.port)
        .parse()
        .context("invalid bind address")?;

    info!("API server listening on {}", addr);
    info!(
        "Scheduling every {}s, staleness cutoff {}s",
        config.scheduler.cycle_interval_secs, config.scheduler.staleness_threshold_secs
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding API server")?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested, finishing in-flight cycle");
        })
        .await
        .context("API server error")?;

    // let the in-flight cycle drain before exiting
    let _ = shutdown_tx.send(true);
    loop_handle.await?;

    info!("greslet daemon stopped");
    Ok(())
}

fn chrono_window(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs as i64)
}
