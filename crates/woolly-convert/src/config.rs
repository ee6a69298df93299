//! Device configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Configuration of the execution device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Pool workers that execute groups
    pub worker_threads: usize,

    /// Lanes the device schedules together
    pub warp_size: usize,

    /// Largest group the device accepts
    pub max_threads_per_group: usize,

    /// Prefix for pool and stream thread names
    pub thread_name_prefix: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            warp_size: 32,
            max_threads_per_group: 1024,
            thread_name_prefix: "woolly-convert".to_string(),
        }
    }
}

impl DeviceConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::InvalidConfig("worker_threads must be greater than 0".to_string()));
        }
        if self.warp_size == 0 {
            return Err(Error::InvalidConfig("warp_size must be greater than 0".to_string()));
        }
        if self.max_threads_per_group < self.warp_size {
            return Err(Error::InvalidConfig(
                "max_threads_per_group must be at least warp_size".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = DeviceConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.worker_threads > 0);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = DeviceConfig { worker_threads: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.toml");
        let config = DeviceConfig { worker_threads: 3, ..Default::default() };
        config.to_file(&path).unwrap();
        assert_eq!(DeviceConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.toml");
        std::fs::write(&path, "warp_size = 64\n").unwrap();
        let config = DeviceConfig::from_file(&path).unwrap();
        assert_eq!(config.warp_size, 64);
        assert_eq!(config.max_threads_per_group, 1024);
    }
}
