use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cfgstore_db::{DbStorageOptions, DEFAULT_MAX_CONNECTIONS};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Contents of `~/.cfgstore/config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub database: DatabaseConfig,
    pub storage: DbStorageOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl CliConfig {
    /// Load an explicit config file, or the default one if it exists.
    ///
    /// An explicitly named file must exist; a missing default file yields
    /// the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .context(format!("Failed to parse config file (invalid TOML): {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Get config file path: ~/.cfgstore/config.toml
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".cfgstore").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parses_full_config() {
        let config: CliConfig = toml::from_str(
            r#"
            [database]
            url = "sqlite://config.db"
            max_connections = 2

            [storage]
            table_name = "scoped_config"
            idle_read = "30s"
            idle_write = "1h30m"
            context_timeout_read = "0"
            context_timeout_write = "500ms"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.url.as_deref(), Some("sqlite://config.db"));
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.storage.table_name(), "scoped_config");
        assert_eq!(config.storage.idle_read, Duration::from_secs(30));
        assert_eq!(config.storage.idle_write, Duration::from_secs(5400));
        assert!(config.storage.context_timeout_read.is_zero());
        assert_eq!(config.storage.context_timeout_write, Duration::from_millis(500));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert!(config.database.url.is_none());
        assert_eq!(config.database.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.storage, DbStorageOptions::default());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CliConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
