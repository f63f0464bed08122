//! Application configuration loaded at boot and shared with initializers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Application configuration for a preforking server.
///
/// Individual initializers pull what they need out of this through the
/// boot context; the registry itself only ever passes it along.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of worker processes to fork
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Database connection string, if the application uses one
    pub database_url: Option<String>,
    /// Message-queue connection string, if the application uses one
    pub queue_url: Option<String>,
    /// Extra values handed to initializers
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

fn default_workers() -> usize {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            database_url: None,
            queue_url: None,
            environment: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from a TOML file, falling back to defaults when it doesn't exist.
    pub fn from_file_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the configuration to a TOML file.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::ConfigError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.workers, 2);
        assert!(config.database_url.is_none());
        assert!(config.environment.is_empty());
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = TempDir::new("prefork-config").unwrap();
        let path = dir.path().join("prefork.toml");

        let mut config = Config::default();
        config.workers = 8;
        config.database_url = Some("postgres://localhost/app".to_string());
        config
            .environment
            .insert("APP_ENV".to_string(), "production".to_string());
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.workers, 8);
        assert_eq!(
            loaded.database_url.as_deref(),
            Some("postgres://localhost/app")
        );
        assert_eq!(loaded.environment.get("APP_ENV").unwrap(), "production");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new("prefork-config").unwrap();
        let path = dir.path().join("absent.toml");

        let config = Config::from_file_or_default(&path).unwrap();
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new("prefork-config").unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "database_url = \"postgres://db/app\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.database_url.as_deref(), Some("postgres://db/app"));
    }
}
