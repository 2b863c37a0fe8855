//! Structured logging setup

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{QarmaError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Also write JSON lines to a timestamped file in `log_dir`
    pub json_file: bool,
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_file: false,
            log_dir: PathBuf::from("logs"),
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
///
/// Returns the path of the JSON log file when one was opened.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .compact();

    let (file_layer, log_file) = if config.json_file {
        let path = log_file_path(&config.log_dir)?;
        let file = std::fs::File::create(&path)
            .map_err(|e| QarmaError::Internal(format!("Failed to create log file: {}", e)))?;
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file)
            .with_target(true)
            .with_thread_ids(true)
            .json();
        (Some(layer), Some(path))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(filter)
        .try_init()
        .map_err(|e| QarmaError::Internal(format!("Failed to initialize logging: {}", e)))?;

    info!("Logging initialized");
    info!("Log level: {}", config.level);
    if let Some(path) = &log_file {
        info!("Log file: {}", path.display());
    }
    Ok(log_file)
}

fn log_file_path(log_dir: &Path) -> Result<PathBuf> {
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)
            .map_err(|e| QarmaError::Internal(format!("Failed to create log directory: {}", e)))?;
    }
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    Ok(log_dir.join(format!("qarma_{}.log", timestamp)))
}
