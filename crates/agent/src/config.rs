//! Agent-local settings loading and validation.
//!
//! These are operational knobs (queue depths, tick granularity, shutdown
//! deadline), not the VRRP configuration itself; that arrives as committed
//! snapshots on the update queue.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration error types
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid settings: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub channels: ChannelSettings,

    #[serde(default)]
    pub timers: TimerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Validate for Settings {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.channels.validate()?;
        self.timers.validate()?;
        Ok(())
    }
}

/// Queue depth settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChannelSettings {
    #[validate(range(min = 1, max = 100000))]
    pub receive: usize,

    #[validate(range(min = 1, max = 100000))]
    pub update: usize,

    #[validate(range(min = 1, max = 100000))]
    pub egress: usize,
}

/// Timer settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TimerSettings {
    /// Ticker granularity; one centisecond by default.
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_tick")]
    pub tick: Duration,

    /// How long a clean shutdown may take before workers are aborted.
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_shutdown_deadline")]
    pub shutdown_deadline: Duration,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            receive: 1000,
            update: 1000,
            egress: 1000,
        }
    }
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
            shutdown_deadline: Duration::from_secs(5),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            channels: ChannelSettings::default(),
            timers: TimerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

fn validate_tick(tick: &Duration) -> Result<(), ValidationError> {
    let millis = tick.as_millis();
    if !(1..=1000).contains(&millis) {
        return Err(ValidationError::new("tick_out_of_range"));
    }
    Ok(())
}

fn validate_shutdown_deadline(deadline: &Duration) -> Result<(), ValidationError> {
    let millis = deadline.as_millis();
    if !(100..=60_000).contains(&millis) {
        return Err(ValidationError::new("shutdown_deadline_out_of_range"));
    }
    Ok(())
}

impl Settings {
    /// Load settings from the default search paths, falling back to the
    /// defaults when no file exists.
    pub fn load() -> Result<Self, SettingsError> {
        match Self::find_settings_file() {
            Some(path) => {
                tracing::info!("Loading settings from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let settings: Settings = serde_yaml::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Find a settings file in standard locations
    fn find_settings_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/vrrpd/vrrpd.yaml")];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config/vrrpd/vrrpd.yaml"));
        }

        paths.push(PathBuf::from("./vrrpd.yaml"));

        paths.into_iter().find(|p| p.exists() && p.is_file())
    }
}
