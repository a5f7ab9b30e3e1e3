//! Configuration
//!
//! Two layers:
//! - [`AppConfig`]: process settings from `BHAV_*` environment variables
//! - [`Settings`]: the user-editable JSON document (paths and schedule),
//!   persisted by [`SettingsStore`]
//!
//! The scheduler never reads either directly; it is handed a
//! [`ScheduleConfig`] on every (re)load.

use bhav_common::types::TimeOfDay;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default settings file name, relative to the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// Default daily run time
pub const DEFAULT_SCHEDULER_TIME: &str = "18:45";

/// Exchange end-of-day files usually appear after this local time
pub const EARLIEST_RELIABLE_TIME: (u32, u32) = (18, 30);

const DEFAULT_SETTINGS_POLL_SECS: u64 = 60;

/// Errors raised while loading, validating or saving configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Invalid(#[from] bhav_common::BhavError),

    #[error("Invalid environment variable {name}: {value}")]
    Env { name: &'static str, value: String },
}

/// Persisted settings document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_download_path")]
    pub download_path: String,
    #[serde(default = "default_processed_path")]
    pub processed_path: String,
    /// "HH:MM", 24-hour
    #[serde(default = "default_scheduler_time")]
    pub scheduler_time: String,
    #[serde(default)]
    pub scheduler_enabled: bool,
    /// Backfill/test mode: always fetch this date instead of today
    #[serde(default)]
    pub scheduler_manual_date: Option<NaiveDate>,
}

fn default_download_path() -> String {
    "downloads".to_string()
}

fn default_processed_path() -> String {
    "processed".to_string()
}

fn default_scheduler_time() -> String {
    DEFAULT_SCHEDULER_TIME.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
            processed_path: default_processed_path(),
            scheduler_time: default_scheduler_time(),
            scheduler_enabled: false,
            scheduler_manual_date: None,
        }
    }
}

impl Settings {
    /// The part of the settings the scheduler cares about
    pub fn schedule(&self) -> Result<ScheduleConfig, ConfigError> {
        Ok(ScheduleConfig {
            enabled: self.scheduler_enabled,
            time_of_day: self.scheduler_time.parse()?,
            manual_override_date: self.scheduler_manual_date,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.schedule().map(|_| ())
    }

    /// Warning shown when an enabled schedule runs before data is usually out
    pub fn early_schedule_warning(&self) -> Option<String> {
        let schedule = self.schedule().ok()?;
        let (hour, minute) = EARLIEST_RELIABLE_TIME;
        let earliest = TimeOfDay::new(hour, minute).ok()?;
        (schedule.enabled && schedule.time_of_day < earliest).then(|| {
            format!(
                "Warning: exchange data is typically available after {} local exchange time",
                earliest
            )
        })
    }

    pub fn download_dir(&self) -> PathBuf {
        PathBuf::from(&self.download_path)
    }

    pub fn processed_dir(&self) -> PathBuf {
        PathBuf::from(&self.processed_path)
    }
}

/// What the scheduler needs to (re)build its triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub time_of_day: TimeOfDay,
    pub manual_override_date: Option<NaiveDate>,
}

/// Reads and writes the settings document
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, or the defaults when the file does not exist
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                })
            },
        };

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Validate and persist `settings`
    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        settings.validate()?;

        let write_err = |source| ConfigError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| ConfigError::Invalid(bhav_common::BhavError::Serialization(e)))?;
        std::fs::write(&self.path, json).map_err(write_err)
    }
}

/// Process configuration from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Location of the settings document
    pub settings_file: PathBuf,
    /// How often the daemon re-reads the settings document
    pub settings_poll: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settings_file: PathBuf::from(DEFAULT_SETTINGS_FILE),
            settings_poll: Duration::from_secs(DEFAULT_SETTINGS_POLL_SECS),
        }
    }
}

impl AppConfig {
    /// Load from environment variables
    ///
    /// - `BHAV_SETTINGS_FILE`: settings document path (default `settings.json`)
    /// - `BHAV_SETTINGS_POLL_SECS`: daemon settings poll interval (default 60)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("BHAV_SETTINGS_FILE") {
            config.settings_file = PathBuf::from(path);
        }

        if let Ok(value) = std::env::var("BHAV_SETTINGS_POLL_SECS") {
            let secs: u64 = value
                .parse()
                .ok()
                .filter(|s| *s > 0)
                .ok_or(ConfigError::Env {
                    name: "BHAV_SETTINGS_POLL_SECS",
                    value,
                })?;
            config.settings_poll = Duration::from_secs(secs);
        }

        Ok(config)
    }
}
