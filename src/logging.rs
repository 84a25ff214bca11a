use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Where log events go. Built once at startup and handed to [`init`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Console level when `RUST_LOG` is unset.
    pub console_default: &'static str,
    /// Append-only debug log; `None` keeps logging on the console only.
    pub file: Option<PathBuf>,
}

impl LogConfig {
    pub fn new(verbose: bool, file: Option<PathBuf>) -> Self {
        Self {
            console_default: if verbose { "info" } else { "warn" },
            file,
        }
    }
}

pub fn init(cfg: &LogConfig) -> Result<()> {
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| cfg.console_default.into()),
        );

    let file = match &cfg.file {
        Some(path) => {
            let handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(handle))
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("Logging was already initialised")?;
    Ok(())
}
