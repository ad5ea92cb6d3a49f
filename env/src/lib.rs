mod config;

pub use config::{Config, HubConfig, DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_SWEEP_INTERVAL_SECS};
