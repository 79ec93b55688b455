//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides. The
//! file uses the dashboard's own configuration layout, so every section of
//! [`homeboard_core::Config`] can be set from YAML.

use std::path::Path;

use anyhow::{Context, Result};
use homeboard_core::Config;
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Dashboard settings.
    ///
    /// Overrides: `HOMEBOARD_BIND_PORT`, `HOMEBOARD_HUB_URL`,
    /// `HOMEBOARD_HUB_TOKEN`, `HOMEBOARD_HUB_ENABLED`
    #[serde(flatten)]
    pub dashboard: Config,
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies overrides looked up by variable name.
    ///
    /// Values that fail to parse are ignored with a warning.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = &mut self.dashboard;

        if let Some(val) = lookup("HOMEBOARD_BIND_PORT") {
            match val.parse() {
                Ok(port) => config.preferred_port = port,
                Err(_) => log::warn!("Ignoring invalid HOMEBOARD_BIND_PORT '{}'", val),
            }
        }

        if let Some(val) = lookup("HOMEBOARD_HUB_URL") {
            config.hub.url = val;
        }

        if let Some(val) = lookup("HOMEBOARD_HUB_ENABLED") {
            match val.parse() {
                Ok(enabled) => config.hub.enabled = enabled,
                Err(_) => log::warn!("Ignoring invalid HOMEBOARD_HUB_ENABLED '{}'", val),
            }
        }

        // Note: HOMEBOARD_HUB_TOKEN is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to homeboard-core's Config type.
    pub fn into_core_config(self) -> Config {
        self.dashboard
    }
}
