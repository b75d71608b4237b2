//! Configuration for moment stores and drivers.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::MomentError;
use crate::moment::DeletePolicy;
use virtmoment_common::LogFormat;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MomentConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Metadata store locations
    pub store: StoreConfig,
    /// Deletion defaults
    pub delete: DeleteConfig,
}

impl Default for MomentConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            store: StoreConfig::default(),
            delete: DeleteConfig::default(),
        }
    }
}

impl MomentConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: MomentConfig =
            serde_yaml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot check on its own.
    pub fn validate(&self) -> std::result::Result<(), MomentError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(MomentError::Config(format!(
                "log_level must be one of: {:?}",
                valid_levels
            )));
        }

        let dirs = [
            ("store.snapshot_dir", &self.store.snapshot_dir),
            ("store.checkpoint_dir", &self.store.checkpoint_dir),
        ];
        for (field, dir) in dirs {
            if dir.as_ref().is_some_and(|d| d.as_os_str().is_empty()) {
                return Err(MomentError::Config(format!("{} must not be empty", field)));
            }
        }
        if self.store.snapshot_dir.is_some() && self.store.snapshot_dir == self.store.checkpoint_dir {
            return Err(MomentError::Config(
                "store.snapshot_dir and store.checkpoint_dir must differ".to_string(),
            ));
        }

        Ok(())
    }

    /// Install the global tracing subscriber described by this config.
    pub fn init_logging(&self) -> Result<()> {
        virtmoment_common::init_with_format(self.log_format, &self.log_level)
    }
}

/// Where moment metadata is persisted. Unset means memory only.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root of per-domain snapshot metadata directories
    pub snapshot_dir: Option<PathBuf>,
    /// Root of per-domain checkpoint metadata directories
    pub checkpoint_dir: Option<PathBuf>,
}

/// Deletion defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeleteConfig {
    /// Policy used when the caller does not pick one
    pub default_policy: DeletePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MomentConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.delete.default_policy, DeletePolicy::Reparent);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = MomentConfig::from_yaml(
            r#"
log_level: debug
delete:
  default_policy: children
"#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.delete.default_policy, DeletePolicy::Children);
        assert!(config.store.snapshot_dir.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(MomentConfig::from_yaml("log_level: loud").is_err());
        assert!(MomentConfig::from_yaml(
            "store:\n  snapshot_dir: /tmp/m\n  checkpoint_dir: /tmp/m\n"
        )
        .is_err());
        assert!(MomentConfig::from_yaml("delete:\n  default_policy: everything\n").is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(MomentConfig::load("/nonexistent/virtmoment.yaml").is_err());
    }
}
