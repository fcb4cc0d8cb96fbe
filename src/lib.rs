pub mod commands;
pub mod core;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::LauncherConfig;
use crate::core::error::{LauncherError, LauncherResult};

/// Install the global subscriber: console on stderr plus a plain-text file
/// under `logs/launcher_YYYY-MM-DD.log`. `RUST_LOG` overrides the default
/// filter. Returns the log file path.
pub fn init_logging(config: &LauncherConfig) -> LauncherResult<PathBuf> {
    let logs_dir = config.logs_dir();
    std::fs::create_dir_all(&logs_dir).map_err(LauncherError::io(&logs_dir))?;
    let log_path = logs_dir.join(format!("launcher_{}.log", Local::now().format("%Y-%m-%d")));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(LauncherError::io(&log_path))?;

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .map_err(|e| LauncherError::Other(format!("Logging already initialised: {e}")))?;

    tracing::info!("HyTaLauncher {} starting", env!("CARGO_PKG_VERSION"));
    Ok(log_path)
}

/// Console-only subscriber, for when the log file cannot be opened. Does
/// nothing if a subscriber is already installed.
pub fn init_console_logging(config: &LauncherConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .try_init();
}

fn env_filter(config: &LauncherConfig) -> EnvFilter {
    let default_filter = if config.verbose_logging {
        "info,hyta_launcher_lib=debug"
    } else {
        "info"
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}
