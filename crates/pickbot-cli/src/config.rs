//! Service configuration – `pickbot.toml` plus `PICKBOT_*` overrides.
//!
//! ```toml
//! log_path = "/var/log/pickbot/pickbot.log"
//!
//! [controller]
//! port = 8000
//! tick_interval_ms = 200
//! control_base_url = "http://localhost:5000"
//!
//! [actuation]
//! port = 5000
//! pid_p_default = 0.8
//!
//! [hardware]
//! mode = "spi"
//! spi_bus = 0
//! spi_device = 0
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use pickbot_hal::HardwareConfig;
use pickbot_runtime::ControllerConfig;
use pickbot_types::{PidGains, RobotError};
use serde::{Deserialize, Serialize};

/// The `[actuation]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuationConfig {
    #[serde(default = "default_actuation_port")]
    pub port: u16,
    #[serde(default)]
    pub pid_p_default: f64,
    #[serde(default)]
    pub pid_i_default: f64,
    #[serde(default)]
    pub pid_d_default: f64,
}

fn default_actuation_port() -> u16 {
    5000
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            port: default_actuation_port(),
            pid_p_default: 0.0,
            pid_i_default: 0.0,
            pid_d_default: 0.0,
        }
    }
}

impl ActuationConfig {
    /// Startup gains; non-finite defaults become `0.0`.
    pub fn initial_gains(&self) -> PidGains {
        let finite = |v: f64| if v.is_finite() { v } else { 0.0 };
        PidGains {
            p: finite(self.pid_p_default),
            i: finite(self.pid_i_default),
            d: finite(self.pid_d_default),
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub actuation: ActuationConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    /// JSON log file, in addition to console output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

/// Load `path` and apply environment overrides.  A missing file yields the
/// defaults.
///
/// # Errors
///
/// Returns [`RobotError::Config`] when the file exists but cannot be read or
/// parsed.
pub fn load(path: &Path) -> Result<Config, RobotError> {
    let mut cfg = load_from(path)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load `path` without environment overrides.
pub(crate) fn load_from(path: &Path) -> Result<Config, RobotError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| RobotError::Config(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&raw)
        .map_err(|e| RobotError::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Apply `PICKBOT_*` environment variable overrides to `cfg`.
///
/// Unparsable values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `PICKBOT_CONTROLLER_PORT` | `controller.port` |
/// | `PICKBOT_TICK_INTERVAL_MS` | `controller.tick_interval_ms` |
/// | `PICKBOT_TARGET_ALIGN_THRESHOLD` | `controller.target_align_threshold` |
/// | `PICKBOT_PLACE_ALIGN_THRESHOLD` | `controller.place_align_threshold` |
/// | `PICKBOT_FAILED_PICKUP_LIMIT` | `controller.failed_pickup_limit` |
/// | `PICKBOT_METRICS_PATH` | `controller.metrics_path` |
/// | `PICKBOT_CONTROL_BASE_URL` | `controller.control_base_url` |
/// | `PICKBOT_ACTUATION_PORT` | `actuation.port` |
/// | `PICKBOT_HARDWARE_MODE` | `hardware.mode` |
/// | `PICKBOT_LOG_PATH` | `log_path` |
pub fn apply_env_overrides(cfg: &mut Config) {
    let ctl = &mut cfg.controller;
    override_parsed("PICKBOT_CONTROLLER_PORT", &mut ctl.port);
    override_parsed("PICKBOT_TICK_INTERVAL_MS", &mut ctl.tick_interval_ms);
    override_parsed("PICKBOT_TARGET_ALIGN_THRESHOLD", &mut ctl.target_align_threshold);
    override_parsed("PICKBOT_PLACE_ALIGN_THRESHOLD", &mut ctl.place_align_threshold);
    override_parsed("PICKBOT_FAILED_PICKUP_LIMIT", &mut ctl.failed_pickup_limit);
    if let Ok(v) = std::env::var("PICKBOT_METRICS_PATH") {
        ctl.metrics_path = v;
    }
    if let Ok(v) = std::env::var("PICKBOT_CONTROL_BASE_URL") {
        ctl.control_base_url = v;
    }
    override_parsed("PICKBOT_ACTUATION_PORT", &mut cfg.actuation.port);
    if let Ok(v) = std::env::var("PICKBOT_HARDWARE_MODE") {
        cfg.hardware.mode = v;
    }
    if let Ok(v) = std::env::var("PICKBOT_LOG_PATH") {
        cfg.log_path = (!v.trim().is_empty()).then(|| PathBuf::from(v));
    }
}

fn override_parsed<T: std::str::FromStr>(var: &str, field: &mut T) {
    if let Ok(v) = std::env::var(var)
        && let Ok(parsed) = v.trim().parse::<T>()
    {
        *field = parsed;
    }
}
