//! Hub process configuration, read once at startup from a TOML file.

use std::path::PathBuf;

use serde::Deserialize;
use tokio::fs;

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Hub server settings. The token secret is sensitive; this struct
/// intentionally has no `Debug` derive so it cannot leak into logs.
#[derive(Deserialize, Clone)]
pub struct HubConfig {
    pub host: String,
    pub port: u16,
    /// SQLite file; an in-memory database is used when absent.
    pub db_path: Option<String>,
    /// Process-wide secret for session tokens.
    pub token_secret: String,
    /// Environment label; `local` enables the development identity
    /// provider.
    pub environment: String,
    pub sweep_interval_secs: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub log_dir: Option<String>,
}

impl HubConfig {
    pub fn sweep_interval_secs(&self) -> u64 {
        self.sweep_interval_secs.unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS)
    }

    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval_secs
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECS)
    }
}

#[derive(Deserialize)]
pub struct Config {
    pub hub: Option<HubConfig>,
}

impl Config {
    /// Read and parse the config file; aborts the process when the
    /// file is missing or malformed.
    pub async fn from_path(path: &PathBuf) -> Config {
        let raw = fs::read(path)
            .await
            .unwrap_or_else(|e| panic!("Cannot read config {:?}: {}", path, e));
        match toml::from_slice(&raw) {
            Ok(config) => config,
            Err(e) => panic!("Malformed config {:?}: {}", path, e),
        }
    }
}
