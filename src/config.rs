//! Configuration System using Figment
//!
//! Settings are layered, lowest to highest precedence:
//! 1. Built-in defaults (the reference rig: SX200-class camera, 64-LED dome)
//! 2. A TOML file (`config/rticap.toml` unless another path is given)
//! 3. Environment variables prefixed with `RTICAP_`, using `__` between
//!    nesting levels
//!
//! ```text
//! RTICAP_DOME__PORT=/dev/ttyUSB1
//! RTICAP_CAMERA__FLASH_PROPERTY=16
//! RTICAP_SEQUENCE__TOTAL_ROUNDS=32
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rticap::config::Settings;
//!
//! let settings = Settings::load_from("config/rticap.toml")?;
//! println!("Dome on {}", settings.dome.port);
//! # Ok::<(), rticap::error::CaptureError>(())
//! ```

use crate::error::{CaptureError, CaptureResult};
use crate::error_recovery::RetryPolicy;
use crate::hardware::dome::LED_COUNT;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the settings file.
pub const DEFAULT_CONFIG_PATH: &str = "config/rticap.toml";

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// LED dome serial line
    pub dome: DomeSettings,
    /// Camera scripting parameters
    pub camera: CameraSettings,
    /// Capture sequence defaults
    pub sequence: SequenceSettings,
    /// Log output
    pub logging: LoggingSettings,
}

/// LED dome serial settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomeSettings {
    /// Serial port (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Wait after opening the line before the first frame, in milliseconds.
    /// Frames sent earlier are dropped by the controller.
    pub settle_ms: u64,
}

impl Default for DomeSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            settle_ms: 1500,
        }
    }
}

impl DomeSettings {
    /// Post-open settle interval
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Camera settings for the scripting extension.
///
/// Property numbers and values are model specific; the defaults match the
/// reference camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Property id addressing the flash mode
    pub flash_property: u16,
    /// Flash property value meaning "off"
    pub flash_off_value: i32,
    /// Flash property value meaning "auto"
    pub flash_auto_value: i32,
    /// Interval between script status polls, in milliseconds
    pub status_poll_ms: u64,
    /// Wait after a half-press before focus may be locked, in milliseconds
    pub autofocus_settle_ms: u64,
    /// Retry policy for late script responses
    pub response_retry: RetryPolicy,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            flash_property: 143,
            flash_off_value: 2,
            flash_auto_value: 1,
            status_poll_ms: 250,
            autofocus_settle_ms: 2000,
            response_retry: RetryPolicy::default(),
        }
    }
}

impl CameraSettings {
    /// Script status poll interval
    pub fn status_poll(&self) -> Duration {
        Duration::from_millis(self.status_poll_ms)
    }

    /// Post-autofocus settle interval
    pub fn autofocus_settle(&self) -> Duration {
        Duration::from_millis(self.autofocus_settle_ms)
    }
}

/// Capture sequence defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceSettings {
    /// Directory under which `captureN` folders are created
    pub save_dir: PathBuf,
    /// Number of captures per sequence
    pub total_rounds: usize,
    /// Download all images after the light rotation instead of per frame
    pub defer_download: bool,
    /// Focus once with all lights on, then lock focus for the sequence
    pub autofocus: bool,
    /// Reference light-position file rewritten for every sequence
    pub light_position_base: Option<PathBuf>,
}

impl Default for SequenceSettings {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("captures"),
            total_rounds: LED_COUNT,
            defer_download: true,
            autofocus: true,
            light_position_base: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Logging level (trace, debug, info, warn, error); `RUST_LOG` wins
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the default path and the environment.
    pub fn load() -> CaptureResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load settings from a specific TOML file and the environment.
    ///
    /// A missing file is not an error; the defaults are used instead.
    pub fn load_from<P: AsRef<Path>>(path: P) -> CaptureResult<Self> {
        let settings: Self = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RTICAP_").split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings after loading
    ///
    /// Checks:
    /// - Log level is valid
    /// - Serial port is named and baud rate is non-zero
    /// - Round count fits the dome (1..=64)
    /// - Retry policy allows at least one attempt
    pub fn validate(&self) -> CaptureResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(CaptureError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        if self.dome.port.is_empty() {
            return Err(CaptureError::Configuration(
                "dome.port cannot be empty".to_string(),
            ));
        }
        if self.dome.baud_rate == 0 {
            return Err(CaptureError::Configuration(
                "dome.baud_rate must be > 0".to_string(),
            ));
        }

        if self.sequence.total_rounds == 0 || self.sequence.total_rounds > LED_COUNT {
            return Err(CaptureError::Configuration(format!(
                "sequence.total_rounds must be 1-{}, got {}",
                LED_COUNT, self.sequence.total_rounds
            )));
        }

        if self.camera.response_retry.max_attempts == 0 {
            return Err(CaptureError::Configuration(
                "camera.response_retry.max_attempts must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the effective settings as TOML.
    pub fn to_toml(&self) -> CaptureResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CaptureError::Configuration(format!("Cannot render settings: {}", e)))
    }
}
