//! gpusched daemon
//!
//! Runs the scheduler and serves its REST API until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use gpusched_api::create_router;
use gpusched_core::{DaemonConfig, Device, LogFormat, LoggingConfig};
use gpusched_scheduler::Scheduler;
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// gpusched daemon - runs queued jobs on a fixed set of devices
#[derive(Parser, Debug)]
#[command(name = "gpuschedd")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "GPUSCHED_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind the API server
    #[arg(long)]
    address: Option<String>,

    /// Port for the REST API server
    #[arg(long)]
    port: Option<u16>,

    /// Device identifier, repeat once per slot ("" for a CPU-only slot)
    #[arg(long = "device")]
    devices: Vec<String>,

    /// Seconds the daemon sleeps when there is nothing to dispatch
    #[arg(long)]
    wake_interval: Option<u64>,

    /// Maximum number of pending jobs
    #[arg(long)]
    pending_capacity: Option<usize>,

    /// Log level or env-filter directive
    #[arg(long, env = "GPUSCHED_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json: bool,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    /// Load the config file, if any, and let flags override it
    fn into_config(self) -> Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => DaemonConfig::default(),
        };

        if let Some(address) = self.address {
            config.api.address = address;
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
        if !self.devices.is_empty() {
            config.scheduler.devices = self.devices.into_iter().map(Device::new).collect();
        }
        if let Some(secs) = self.wake_interval {
            config.scheduler.wake_interval_secs = secs;
        }
        if let Some(capacity) = self.pending_capacity {
            config.scheduler.pending_capacity = capacity;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if self.json {
            config.logging.format = LogFormat::Json;
        }
        if let Some(file) = self.log_file {
            config.logging.file = Some(file);
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid log level {:?}", config.level))?;

    let writer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .try_init()?,
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(config.file.is_none())
                    .with_writer(writer),
            )
            .try_init()?,
    }
    Ok(())
}

/// A broken scheduler invariant panics inside the daemon task; take the
/// whole process down with it.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        error!(panic = %panic_info, "Fatal error, exiting");
        std::process::exit(1);
    }));
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;
    init_logging(&config.logging)?;
    install_panic_hook();

    info!("Starting gpusched daemon v{}", env!("CARGO_PKG_VERSION"));

    let scheduler = Arc::new(Scheduler::new(config.scheduler.clone())?);
    scheduler.start().await?;

    let router = create_router(scheduler.clone(), &config.api);

    let addr: SocketAddr = format!("{}:{}", config.api.address, config.api.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.api.address, config.api.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(%addr, devices = ?config.scheduler.devices, "API server listening");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    scheduler.stop().await;
    served.context("API server error")?;

    info!("gpusched daemon stopped");
    Ok(())
}
