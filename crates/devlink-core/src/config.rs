//! Configuration loading.
//!
//! Sources, in priority order:
//! 1. Environment variables (see [`env_vars`])
//! 2. TOML file: explicit path, `$DEVLINK_CONFIG`, or `./devlink.toml`
//! 3. Built-in defaults (see [`defaults`])

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// Default values.
pub mod defaults {
    /// Maximum number of records kept in the state change queue.
    pub const STATE_QUEUE_CAPACITY: usize = 100;
    /// Prefix prepended to command ids.
    pub const COMMAND_ID_PREFIX: &str = "";
    /// How long a terminal command stays visible before it is reaped.
    pub const COMMAND_RETENTION_SECS: u64 = 300;
    /// Interval of the background reaper.
    pub const REAP_INTERVAL_SECS: u64 = 30;
    /// Config file looked up in the working directory.
    pub const CONFIG_FILE: &str = "devlink.toml";
}

/// Environment variable names.
pub mod env_vars {
    pub const CONFIG: &str = "DEVLINK_CONFIG";
    pub const STATE_QUEUE_CAPACITY: &str = "DEVLINK_STATE_QUEUE_CAPACITY";
    pub const COMMAND_ID_PREFIX: &str = "DEVLINK_COMMAND_ID_PREFIX";
    pub const COMMAND_RETENTION_SECS: &str = "DEVLINK_COMMAND_RETENTION_SECS";
    pub const REAP_INTERVAL_SECS: &str = "DEVLINK_REAP_INTERVAL_SECS";
    pub const LOG_JSON: &str = "DEVLINK_LOG_JSON";
}

/// Runtime configuration of the device core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DevlinkConfig {
    /// Capacity of the state change queue
    pub state_queue_capacity: usize,
    /// Opaque namespace prefix for command ids
    pub command_id_prefix: String,
    /// Retention of terminal commands, in seconds
    pub command_retention_secs: u64,
    /// Background reaper interval, in seconds
    pub reap_interval_secs: u64,
    /// Standard (base) command definitions
    pub base_definitions: Option<PathBuf>,
    /// Category sources: JSON files or directories of JSON files
    pub command_sources: Vec<PathBuf>,
    /// State package definitions: JSON files or directories
    pub state_sources: Vec<PathBuf>,
    /// State default values: JSON files or directories
    pub state_defaults: Vec<PathBuf>,
}

impl Default for DevlinkConfig {
    fn default() -> Self {
        Self {
            state_queue_capacity: defaults::STATE_QUEUE_CAPACITY,
            command_id_prefix: defaults::COMMAND_ID_PREFIX.to_string(),
            command_retention_secs: defaults::COMMAND_RETENTION_SECS,
            reap_interval_secs: defaults::REAP_INTERVAL_SECS,
            base_definitions: None,
            command_sources: Vec::new(),
            state_sources: Vec::new(),
            state_defaults: Vec::new(),
        }
    }
}

impl DevlinkConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DevlinkConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config = Self::from_toml_str(&content)?;
        info!(category = "config", path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit path must exist; the fallbacks are optional.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let config = if let Some(path) = explicit {
            Self::load(path)?
        } else if let Ok(path) = std::env::var(env_vars::CONFIG) {
            Self::load(Path::new(&path))?
        } else if Path::new(defaults::CONFIG_FILE).exists() {
            Self::load(Path::new(defaults::CONFIG_FILE))?
        } else {
            info!(category = "config", "No config file, using defaults");
            Self::default()
        };

        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an environment lookup.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(env_vars::STATE_QUEUE_CAPACITY) {
            self.state_queue_capacity = parse_env(env_vars::STATE_QUEUE_CAPACITY, &v)?;
        }
        if let Some(v) = lookup(env_vars::COMMAND_ID_PREFIX) {
            self.command_id_prefix = v;
        }
        if let Some(v) = lookup(env_vars::COMMAND_RETENTION_SECS) {
            self.command_retention_secs = parse_env(env_vars::COMMAND_RETENTION_SECS, &v)?;
        }
        if let Some(v) = lookup(env_vars::REAP_INTERVAL_SECS) {
            self.reap_interval_secs = parse_env(env_vars::REAP_INTERVAL_SECS, &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.state_queue_capacity == 0 {
            return Err(Error::Config(
                "state_queue_capacity must be greater than zero".into(),
            ));
        }
        if self.reap_interval_secs == 0 {
            return Err(Error::Config(
                "reap_interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Retention of terminal commands.
    pub fn command_retention(&self) -> Duration {
        Duration::from_secs(self.command_retention_secs)
    }

    /// Background reaper interval.
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has invalid value '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DevlinkConfig::default();
        assert_eq!(config.state_queue_capacity, 100);
        assert!(config.command_id_prefix.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = DevlinkConfig::default()
            .with_env_overrides(|key| match key {
                env_vars::STATE_QUEUE_CAPACITY => Some("8".to_string()),
                env_vars::COMMAND_ID_PREFIX => Some("cmd_".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.state_queue_capacity, 8);
        assert_eq!(config.command_id_prefix, "cmd_");
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let result = DevlinkConfig::default().with_env_overrides(|key| {
            (key == env_vars::COMMAND_RETENTION_SECS).then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
