//! OpenHAT daemon
//!
//! Reads the node configuration, builds the port runtime and runs the
//! scheduler until Ctrl-C or the optional time limit. File switches are
//! served by one worker thread. Refresh notifications are logged in place of
//! a controller connection.

mod config;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use openhat_core::LogVerbosity;
use openhat_port::{PortConfigurator, TomlFileStore, RefreshSink, Runtime};
use openhat_scheduler::{Scheduler, SchedulerConfig};
use openhat_window::{NODE_WINDOW, WindowState, WindowStatus, configure_window};
use openhat_worker::{ActionQueue, FileDevice, NODE_FILE_SWITCH, Worker, configure_file_switch};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::DaemonConfig;

#[derive(Parser, Debug)]
#[command(name = "openhatd", version, about = "OpenHAT automation daemon")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "openhat.toml")]
    config: PathBuf,

    /// Log verbosity; overrides the LogVerbosity setting
    #[arg(short, long, value_parser = parse_verbosity)]
    verbosity: Option<LogVerbosity>,

    /// Stop after this many milliseconds
    #[arg(long, value_name = "MS")]
    run_for: Option<u64>,

    /// Print the state of every port as JSON on exit
    #[arg(long)]
    dump: bool,
}

fn parse_verbosity(value: &str) -> Result<LogVerbosity, String> {
    value.parse().map_err(|err: openhat_core::Error| err.to_string())
}

/// Stands in for the controller transport.
struct LoggingRefreshSink;

impl RefreshSink for LoggingRefreshSink {
    fn refresh(&self, port_ids: &[String]) {
        info!("Ports changed: {}", port_ids.join(", "));
    }

    fn refresh_all(&self) {
        info!("All ports need a refresh");
    }
}

fn init_logging(verbosity: LogVerbosity) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = DaemonConfig::load(&cli.config)?;
    let general = &config.general;

    let verbosity = match cli.verbosity {
        Some(verbosity) => verbosity,
        None => general.get_string("LogVerbosity", "Normal", false)?.parse()?,
    };
    init_logging(verbosity);
    info!("openhatd {} starting", env!("CARGO_PKG_VERSION"));

    let rt = Arc::new(Runtime::new());
    let handler_rt = Arc::clone(&rt);
    ctrlc::set_handler(move || {
        info!("Interrupted, shutting down");
        handler_rt.request_shutdown();
    })
    .context("Unable to install the Ctrl-C handler")?;

    let persistent = general.get_string("PersistentConfig", "", false)?;
    if !persistent.is_empty() {
        rt.set_store(Box::new(TomlFileStore::open(&persistent)?));
    }

    let configurator = PortConfigurator::new(&rt, general.get_bool("AllowHidden", false, false)?);
    let mut windows = BTreeMap::new();
    let mut device = FileDevice::new();
    let queue = ActionQueue::new();
    for node in &config.nodes {
        let node_type = node.node_type()?;
        if node_type == NODE_WINDOW {
            windows.insert(node.id.clone(), configure_window(&configurator, &node.id, &node.config)?);
        } else if node_type == NODE_FILE_SWITCH {
            configure_file_switch(&configurator, &mut device, &queue, &node.id, &node.config)?;
        } else if !configurator.configure_node(&node.id, &node_type, &node.config)? {
            bail!("{}: Unknown node type: {}", node.id, node_type);
        }
    }
    let scheduler_config = SchedulerConfig::from_config(general)?;

    general.warn_unused();
    for node in &config.nodes {
        node.config.warn_unused();
    }

    rt.prepare()?;
    rt.set_refresh_sink(Arc::new(LoggingRefreshSink));
    info!("{} ports ready", rt.ports().len());

    let worker = if device.is_empty() {
        None
    } else {
        let worker = Worker::new(NODE_FILE_SWITCH, device, queue, Arc::clone(&rt))
            .spawn()
            .context("Unable to start the file switch worker")?;
        Some(worker)
    };

    let mut scheduler = Scheduler::new(Arc::clone(&rt), &scheduler_config);
    scheduler.refresh_all();
    scheduler.run_until(cli.run_for.map(|ms| Instant::now() + Duration::from_millis(ms)));
    info!("Stopped after {} frames", scheduler.frame());
    rt.shutdown_flush();
    if let Some(worker) = worker
        && worker.join().is_err()
    {
        warn!("The file switch worker panicked");
    }

    if cli.dump {
        let windows: BTreeMap<&String, WindowStatus> = windows
            .iter()
            .map(|(id, window)| {
                let status = window
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .status();
                (id, status)
            })
            .collect();
        let dump = serde_json::json!({
            "ports": rt.snapshots(),
            "windows": windows,
        });
        println!("{}", serde_json::to_string_pretty(&dump)?);
    } else {
        for (id, window) in &windows {
            let window = window.lock().unwrap_or_else(PoisonError::into_inner);
            if window.current_state() == WindowState::Error {
                warn!("{id}: Window stopped in error state");
            }
        }
    }
    Ok(())
}
