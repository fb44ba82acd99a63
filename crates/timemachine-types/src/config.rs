//! Configuration loading for timemachine.
//!
//! Layered config: defaults -> config file -> explicit file -> env vars.
//! The default config file lives at ~/.config/timemachine/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TypesError;

/// Directory name of the index inside the data directory.
pub const INDEX_SUBDIR: &str = "timemachine_index";

/// Main settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the index directory
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Maximum number of documents returned by a query
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,

    /// Sync every append to disk before acknowledging it
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,

    /// Log level (trace, debug, info, warn, error). Read by the host
    /// through `level()` when it installs its subscriber.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_index_path() -> String {
    ProjectDirs::from("", "", "timemachine")
        .map(|p| p.data_local_dir().join(INDEX_SUBDIR))
        .unwrap_or_else(|| PathBuf::from(".").join(INDEX_SUBDIR))
        .to_string_lossy()
        .to_string()
}

fn default_result_limit() -> usize {
    100
}

fn default_sync_writes() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            result_limit: default_result_limit(),
            sync_writes: default_sync_writes(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/timemachine/config.toml)
    /// 3. Explicit config file (optional)
    /// 4. Environment variables (TIMEMACHINE_*)
    pub fn load(config_path: Option<&str>) -> Result<Self, TypesError> {
        let config_dir = ProjectDirs::from("", "", "timemachine")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("index_path", default_index_path())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("result_limit", default_result_limit() as i64)
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("sync_writes", default_sync_writes())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // TIMEMACHINE_INDEX_PATH, TIMEMACHINE_RESULT_LIMIT, ...
        builder = builder.add_source(
            Environment::with_prefix("TIMEMACHINE")
                .prefix_separator("_")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| TypesError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| TypesError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.result_limit == 0 {
            return Err(TypesError::Config("result_limit must be > 0".to_string()));
        }
        if self.index_path.trim().is_empty() {
            return Err(TypesError::Config("index_path must not be empty".to_string()));
        }
        self.level()?;
        Ok(())
    }

    /// Parsed `log_level`.
    pub fn level(&self) -> Result<tracing::Level, TypesError> {
        self.log_level
            .parse()
            .map_err(|_| TypesError::Config(format!("unknown log_level: {}", self.log_level)))
    }

    /// Expand ~ in index_path to the home directory
    pub fn expanded_index_path(&self) -> PathBuf {
        if let Some(rest) = self.index_path.strip_prefix("~/") {
            if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.index_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.result_limit, 100);
        assert!(settings.sync_writes);
        assert!(settings.index_path.ends_with(INDEX_SUBDIR));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("timemachine.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "index_path = \"/srv/chat/index\"").unwrap();
        writeln!(file, "result_limit = 25").unwrap();
        writeln!(file, "sync_writes = false").unwrap();
        drop(file);

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.index_path, "/srv/chat/index");
        assert_eq!(settings.result_limit, 25);
        assert!(!settings.sync_writes);
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let settings = Settings {
            result_limit: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let settings = Settings {
            log_level: "WARN".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.level().unwrap(), tracing::Level::WARN);
        assert_eq!(Settings::default().level().unwrap(), tracing::Level::INFO);

        let settings = Settings {
            log_level: "chatty".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_expanded_index_path() {
        let settings = Settings {
            index_path: "/var/lib/timemachine".to_string(),
            ..Settings::default()
        };
        assert_eq!(
            settings.expanded_index_path(),
            PathBuf::from("/var/lib/timemachine")
        );
    }
}
