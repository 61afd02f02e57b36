//! reactord - Reactor console daemon
//!
//! Drives the physical console: loads the device description, opens the
//! bus transport, runs the lamp test and the update loop, and keeps the
//! game state in sync with the backend.
//!
//! # Usage
//!
//! Against the real hardware and backend:
//! ```bash
//! reactord --config /etc/reactorconsole/reactord.toml
//! ```
//!
//! Bench setup with mock transport and a file-driven mock backend:
//! ```bash
//! reactord --mock --mock-init '{"status": "broken", "expected": {"3_3": 0.5}, "lights": {"3_3": true}}'
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use reactor_bus::{create_transport, DeviceFile, TransportConfig};
use reactor_console::{
    ConsoleConfig, ConsoleRuntime, Hardware, HttpBackend, MockBackend, RunnerOptions, TaskRunner,
};
use reactor_core::{GameBackend, GameState};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "reactord")]
#[command(version, about = "Reactor console daemon")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "REACTORD_CONFIG")]
    config: Option<PathBuf>,

    /// Task box id in the backend
    #[arg(long)]
    id: Option<String>,

    /// Device description file
    #[arg(long)]
    devices: Option<PathBuf>,

    /// Serial device path; switches the transport to serial
    #[arg(long)]
    serial: Option<String>,

    /// Backend base URL
    #[arg(long)]
    backend_url: Option<String>,

    /// Use the file-based mock backend
    #[arg(long)]
    mock: bool,

    /// Initial JSON state document for the mock backend
    #[arg(long)]
    mock_init: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "reactord=debug,reactor_console=debug,reactor_bus=debug"
    } else {
        "reactord=info,reactor_console=info,reactor_bus=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting reactord");

    // config file first, command line overrides on top
    let mut config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            ConsoleConfig::load(path)?
        }
        None => ConsoleConfig::default(),
    };
    if let Some(id) = args.id {
        config.id = id;
    }
    if let Some(devices) = args.devices {
        config.devices = devices;
    }
    if let Some(path) = args.serial {
        config.transport = TransportConfig::Serial(reactor_bus::transport::SerialConfig {
            path,
            baud_rate: 115200,
        });
    }
    if let Some(url) = args.backend_url {
        config.backend.url = Some(url);
    }
    if args.mock {
        config.backend.mock = true;
    }
    if let Some(init) = &args.mock_init {
        config.backend.mock_init =
            Some(serde_json::from_str(init).context("invalid --mock-init JSON")?);
    }

    // device description and panel alias map
    let device_file = DeviceFile::load(&config.devices)
        .with_context(|| format!("loading device file {}", config.devices.display()))?;
    let panel = device_file
        .panel(&config.panel)
        .with_context(|| format!("panel '{}' in device file", config.panel))?;
    info!(panel = %config.panel, aliases = panel.aliases().count(), "device file loaded");

    // bus transport and runtime
    let transport = create_transport(&config.transport).await?;
    let hardware = Arc::new(Hardware::new(Arc::new(panel), transport)?);
    let runtime = Arc::new(ConsoleRuntime::new(hardware));

    // backend client
    let backend: Arc<dyn GameBackend> = if config.backend.mock {
        let initial = match &config.backend.mock_init {
            Some(value) => Some(
                serde_json::from_value::<GameState>(value.clone())
                    .context("invalid mock_init state document")?,
            ),
            None => None,
        };
        Arc::new(MockBackend::new(&config.id, initial))
    } else {
        let url = config
            .backend
            .url
            .as_deref()
            .context("backend.url is required unless the mock backend is enabled")?;
        Arc::new(HttpBackend::new(url, &config.id)?)
    };

    let runner = TaskRunner::new(
        backend,
        RunnerOptions {
            poll_interval: Duration::from_secs_f64(config.backend.poll_interval_secs),
            write_interval: Duration::from_secs_f64(config.backend.write_interval_secs),
            ..RunnerOptions::default()
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner_task = tokio::spawn(runner.run(runtime.backend_callback(), shutdown_rx));
    let mut runtime_task = {
        let runtime = runtime.clone();
        tokio::spawn(async move { runtime.run().await })
    };

    // run until a signal arrives or the runtime dies on its own
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = sighup.recv() => info!("SIGHUP received"),
        result = &mut runtime_task => {
            warn!("runtime exited on its own");
            let _ = shutdown_tx.send(true);
            result.context("runtime task panicked")??;
            return Ok(());
        }
    }

    // orderly shutdown: stop the loops, let the runtime darken the panel
    runtime.quit();
    let _ = shutdown_tx.send(true);
    runtime_task.await.context("runtime task panicked")??;
    runner_task.await.context("runner task panicked")?;

    info!("reactord stopped");
    Ok(())
}
