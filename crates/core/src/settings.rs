use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SETTINGS_FILE_NAME: &str = "settings.toml";
pub const LOG_FILE_NAME: &str = "quarry.log";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Rows requested per query and per load-more.
    pub query_page_size: usize,
    pub default_timeout_secs: u64,
    pub schema_pane_percent: u16,
    pub export_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            query_page_size: 1000,
            default_timeout_secs: 30,
            schema_pane_percent: 25,
            export_dir: None,
        }
    }
}

impl Settings {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = toml::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(settings.normalized())
    }

    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, SettingsError> {
        Self::load_from_path(dir.as_ref().join(SETTINGS_FILE_NAME))
    }

    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_secs > 0).then(|| Duration::from_secs(self.default_timeout_secs))
    }

    #[must_use]
    pub fn export_dir(&self) -> PathBuf {
        self.export_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    fn normalized(mut self) -> Self {
        self.query_page_size = self.query_page_size.max(1);
        self.schema_pane_percent = self.schema_pane_percent.clamp(10, 60);
        self
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read settings file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Directory holding the store, settings and log file.
#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    if let Some(custom) = env::var_os("QUARRY_CONFIG_DIR") {
        return Some(PathBuf::from(custom));
    }

    let base_dir = if cfg!(target_os = "windows") {
        PathBuf::from(env::var_os("APPDATA")?)
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        PathBuf::from(env::var_os("HOME")?).join(".config")
    };

    Some(base_dir.join("quarry"))
}

pub fn require_config_dir() -> Result<PathBuf, SettingsError> {
    config_dir().ok_or(SettingsError::ConfigDirUnavailable)
}
