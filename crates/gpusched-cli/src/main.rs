//! gpusched CLI
//!
//! Command-line interface for interacting with the gpusched daemon.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::QueueState;

/// gpusched - submit and inspect jobs on a gpusched daemon
#[derive(Parser, Debug)]
#[command(name = "gpusched")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Daemon API address
    #[arg(
        long,
        env = "GPUSCHED_API",
        default_value = "http://localhost:8844",
        global = true
    )]
    api: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue a command
    Submit {
        /// Job label
        #[arg(long)]
        name: String,

        /// File receiving the job's combined stdout and stderr
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Program and arguments, after `--`
        #[arg(required = true, last = true)]
        command: Vec<String>,
    },

    /// List jobs, one queue or all of them
    Queue {
        #[arg(value_enum)]
        state: Option<QueueState>,
    },

    /// Show one job
    Job {
        /// Job id
        id: u64,
    },

    /// List configured device slots
    Devices {
        /// Only slots not leased to a running job
        #[arg(long)]
        free: bool,
    },

    /// Show daemon status
    Status,

    /// Change daemon settings
    Set {
        /// Seconds the daemon sleeps when idle
        #[arg(long, allow_negative_numbers = true)]
        wake_interval: Option<i64>,

        /// Maximum number of pending jobs
        #[arg(long, allow_negative_numbers = true)]
        pending_capacity: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let client = commands::ApiClient::new(&cli.api);

    match cli.command {
        Commands::Submit {
            name,
            output,
            command,
        } => {
            commands::submit(&client, name, output, command).await?;
        }
        Commands::Queue { state } => {
            commands::queue(&client, state).await?;
        }
        Commands::Job { id } => {
            commands::job(&client, id).await?;
        }
        Commands::Devices { free } => {
            commands::devices(&client, free).await?;
        }
        Commands::Status => {
            commands::status(&client).await?;
        }
        Commands::Set {
            wake_interval,
            pending_capacity,
        } => {
            commands::set(&client, wake_interval, pending_capacity).await?;
        }
    }

    Ok(())
}
