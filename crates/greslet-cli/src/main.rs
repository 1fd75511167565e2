//! greslet CLI
//!
//! Command-line interface for submitting jobs to and inspecting the
//! greslet daemon.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// greslet - GPU and storage scheduler for shared compute fleets
#[derive(Parser, Debug)]
#[command(name = "greslet")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Daemon API address
    #[arg(long, default_value = "http://localhost:9090", global = true)]
    api: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a job
    Submit {
        /// Path to the script to run, on the shared filesystem
        script: String,

        /// Submitting user
        #[arg(long)]
        user: String,

        /// Number of GPUs to request
        #[arg(long, default_value_t = 1)]
        gres: u32,

        /// Storage kind to request (shared, local)
        #[arg(long, default_value = "shared")]
        storage_kind: String,

        /// Storage space to request in GB
        #[arg(long, default_value_t = 0.0)]
        storage_gb: f64,

        /// Time limit in hours
        #[arg(long, default_value_t = 24)]
        time_limit: u64,
    },

    /// List pending jobs
    Queue,

    /// Show fleet state
    Nodes,

    /// List active allocations
    Allocations,

    /// Show system status
    Top,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let client = commands::ApiClient::new(&cli.api);

    match cli.command {
        Commands::Submit {
            script,
            user,
            gres,
            storage_kind,
            storage_gb,
            time_limit,
        } => {
            commands::submit(&client, script, user, gres, storage_kind, storage_gb, time_limit)
                .await?;
        }
        Commands::Queue => {
            commands::queue(&client).await?;
        }
        Commands::Nodes => {
            commands::nodes(&client).await?;
        }
        Commands::Allocations => {
            commands::allocations(&client).await?;
        }
        Commands::Top => {
            commands::top(&client).await?;
        }
    }

    Ok(())
}
