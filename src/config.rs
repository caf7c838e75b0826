//! Capture configuration.
//!
//! Loaded with figment from, in increasing priority: built-in defaults,
//! `capture.toml`, and `CAPTURE_`-prefixed environment variables
//! (`CAPTURE_DEVICE__EXPOSURE=800`, `CAPTURE_OUTPUT_DIR=/tmp/frames`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{GAIN_LEVELS, GainLevel, Setting, VideoMode};

pub const DEFAULT_CONFIG_FILE: &str = "capture.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins if set
    pub log_level: String,
    /// Directory snapshots are written into (created on demand)
    pub output_dir: PathBuf,
    /// How long `stop` waits for the acquisition thread, per attempt
    pub shutdown_timeout_ms: u64,
    /// Sleep after a poll that found no frame
    pub idle_backoff_us: u64,
    /// Parameters programmed into the device before capture starts
    pub device: DeviceDefaults,
}

/// Values written to the camera on `Connected -> Capturing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceDefaults {
    pub video_mode: VideoMode,
    pub exposure: i32,
    pub gain: i32,
    pub threshold: i32,
    pub intensity: i32,
    pub shutter_delay: i32,
    pub auto_exposure: bool,
    pub auto_gain: bool,
    pub ir_filter: bool,
}

impl Default for DeviceDefaults {
    fn default() -> Self {
        Self {
            video_mode: VideoMode::Mjpeg,
            exposure: 1000,
            gain: 0,
            threshold: 40,
            intensity: 15,
            shutter_delay: 0,
            auto_exposure: false,
            auto_gain: false,
            ir_filter: false,
        }
    }
}

impl DeviceDefaults {
    /// Settings in the order they are written to the device.
    pub fn settings(&self) -> Result<Vec<Setting>> {
        Ok(vec![
            Setting::VideoMode(self.video_mode),
            Setting::Exposure(self.exposure),
            Setting::Gain(GainLevel::new(self.gain)?),
            Setting::Threshold(self.threshold),
            Setting::Intensity(self.intensity),
            Setting::ShutterDelay(self.shutter_delay),
            Setting::AutoExposure(self.auto_exposure),
            Setting::AutoGain(self.auto_gain),
            Setting::IrFilter(self.ir_filter),
        ])
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            output_dir: PathBuf::from("captures"),
            shutdown_timeout_ms: 2000,
            idle_backoff_us: 500,
            device: DeviceDefaults::default(),
        }
    }
}

impl CaptureConfig {
    /// Load from `capture.toml` in the working directory plus the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Self::default()))
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed("CAPTURE_").split("__")),
        )
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Self::default())).merge(Toml::string(toml)),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(Error::InvalidLogLevel(self.log_level.clone()));
        }
        if !(0..GAIN_LEVELS).contains(&self.device.gain) {
            return Err(Error::InvalidParameter {
                name: "default gain level",
                value: self.device.gain.into(),
            });
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(Error::InvalidParameter {
                name: "shutdown timeout (ms)",
                value: 0,
            });
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_micros(self.idle_backoff_us)
    }
}
