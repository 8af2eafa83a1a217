use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::builder::{ConfigBuilder, DefaultState};
use serde::Deserialize;

use crate::source::Readiness;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Rendered through spider.cloud (needs SPIDER_API_KEY).
    Spider,
    /// Plain HTTP GET.
    Http,
}

/// Settings read from `DINING_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub menu_table: String,
    pub nutrition_table: String,
    pub base_url: String,
    pub days: u32,
    pub backend: Backend,
    pub ready_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Settings {
    /// Defaults overridden by `DINING_*` environment variables.
    pub fn load() -> Result<Settings> {
        Settings::from_builder(
            Settings::defaults()?.add_source(config::Environment::with_prefix("DINING")),
        )
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(config::Config::builder()
            .set_default("db_path", "data/dining.sqlite")?
            .set_default("menu_table", "menu_items")?
            .set_default("nutrition_table", "nutrition_facts")?
            .set_default("base_url", "https://dining.purdue.edu")?
            .set_default("days", 7)?
            .set_default("backend", "spider")?
            .set_default("ready_timeout_secs", 10)?
            .set_default("poll_interval_ms", 500)?
            .set_default("request_timeout_secs", 30)?)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Settings> {
        builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")
    }

    pub fn readiness(&self) -> Readiness {
        Readiness {
            timeout: Duration::from_secs(self.ready_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}
