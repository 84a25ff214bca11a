use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

/// Site and transport settings. Run parameters live on the CLI instead.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Debug log file; empty disables the file sink.
    pub log_file: String,
}

impl Settings {
    /// Built-in defaults overridden by `MALSCRAPE_*` environment variables.
    pub fn load() -> Result<Self> {
        Self::from_config(Config::builder().add_source(Environment::with_prefix("MALSCRAPE")))
    }

    fn from_config(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let settings: Settings = builder
            .set_default("base_url", "https://myanimelist.net")?
            .set_default("timeout_secs", 10)?
            .set_default("user_agent", concat!("mal_scraper/", env!("CARGO_PKG_VERSION")))?
            .set_default("log_file", "debug.log")?
            .build()
            .context("Failed to load settings")?
            .try_deserialize()
            .context("Invalid settings")?;
        Ok(settings.normalized())
    }

    fn normalized(mut self) -> Self {
        self.base_url = self.base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        let trimmed = self.log_file.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    }
}
