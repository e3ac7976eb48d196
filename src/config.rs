//! `sqltpl.toml` configuration.
//!
//! ```toml
//! database_url = "postgres://localhost/app"
//! start_index = 1
//! max_depth = 32
//! format = "json"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::expand::{Options, DEFAULT_MAX_DEPTH};

pub const CONFIG_FILE: &str = "sqltpl.toml";

/// How the CLI prints results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Database connection URL
    pub database_url: Option<String>,

    /// First placeholder number
    pub start_index: u32,

    /// Deepest composition nesting
    pub max_depth: usize,

    /// Output format
    pub format: Format,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            start_index: 1,
            max_depth: DEFAULT_MAX_DEPTH,
            format: Format::Text,
        }
    }
}

impl Config {
    /// Load `./sqltpl.toml`, else `<config dir>/sqltpl/config.toml`, else
    /// defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::locate() {
            Some(path) => Self::from_path(&path),
            None => Ok(Self::default()),
        }
    }

    fn locate() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("sqltpl").join("config.toml"))
            .filter(|path| path.exists())
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let shown = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: shown.clone(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Toml {
            path: shown.clone(),
            source,
        })?;
        tracing::debug!(path = %shown, "loaded config");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Expansion options derived from this config.
    pub fn options(&self) -> Options {
        Options::new().index(self.start_index).max_depth(self.max_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.options(), Options::default());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            database_url = "postgres://localhost/app"
            start_index = 3
            max_depth = 4
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(config.format, Format::Json);
        let options = config.options();
        assert_eq!(options.index, 3);
        assert_eq!(options.max_depth, 4);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(Config::from_toml("databse_url = \"x\"").is_err());
    }

    #[test]
    fn test_load_from_path() {
        let path = std::env::temp_dir().join(format!("sqltpl-config-{}.toml", std::process::id()));
        fs::write(&path, "start_index = 2\nformat = \"json\"\n").unwrap();
        let config = Config::from_path(&path);
        let _ = fs::remove_file(&path);
        let config = config.unwrap();
        assert_eq!(config.start_index, 2);
        assert_eq!(config.format, Format::Json);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_path(Path::new("/nonexistent/sqltpl.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
