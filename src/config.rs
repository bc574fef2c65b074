//! Daemon configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Settings for the daemon. Every field has a default, so an empty or
/// missing config file is valid; CLI flags override individual fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the API server binds to.
    pub bind: String,
    /// SQLite database path.
    pub db_path: String,
    /// Poll tick period in seconds.
    pub tick_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            db_path: "data/jobwarden.db".to_string(),
            tick_seconds: 5,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}
