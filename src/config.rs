//! Top-level configuration: one section per component, loaded from JSON and
//! overlaid with `QARMA_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::adaptive::AdaptiveThresholds;
use crate::logging::LoggingConfig;
use crate::messaging::BusConfig;
use crate::observer::ObserverConfig;
use crate::register::{DispatchMode, RegisterConfig};
use crate::scheduler::SchedulerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QarmaConfig {
    pub logging: LoggingConfig,
    pub register: RegisterConfig,
    pub observer: ObserverConfig,
    pub scheduler: SchedulerConfig,
    pub bus: BusConfig,
    pub adaptive: AdaptiveThresholds,
}

impl QarmaConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Load `.env`, then the optional file, then apply the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay `QARMA_*` variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("QARMA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("QARMA_LOG_JSON") {
            self.logging.json_file = parse_bool(&json).context("QARMA_LOG_JSON")?;
        }
        if let Some(dir) = lookup("QARMA_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(dir);
        }
        if let Some(mode) = lookup("QARMA_DISPATCH") {
            self.register.dispatch = match mode.to_ascii_lowercase().as_str() {
                "inline" => DispatchMode::Inline,
                "parallel" => DispatchMode::Parallel,
                other => anyhow::bail!("QARMA_DISPATCH: unknown dispatch mode '{}'", other),
            };
        }
        if let Some(wave) = lookup("QARMA_WAVE_SIZE") {
            self.register.wave_size = wave.parse().context("QARMA_WAVE_SIZE")?;
        }
        if let Some(capacity) = lookup("QARMA_BUS_CAPACITY") {
            self.bus.capacity = capacity.parse().context("QARMA_BUS_CAPACITY")?;
            if self.bus.capacity == 0 {
                warn!("Bus capacity 0: every message will be dropped");
            }
        }
        if let Some(seed) = lookup("QARMA_SCHEDULER_SEED") {
            self.scheduler.seed = Some(seed.parse().context("QARMA_SCHEDULER_SEED")?);
        }
        debug!("Configuration after environment overlay: {:?}", self);
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{}'", other),
    }
}
