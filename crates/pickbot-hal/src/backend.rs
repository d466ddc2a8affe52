//! [`HalBackend`] – one-shot selection of the store implementations.
//!
//! The backend is chosen once at startup from [`HardwareConfig`] and then
//! injected into the request handlers as trait objects; no call site ever
//! branches on the mode again.
//!
//! | Requested mode | Bus opens | Result |
//! |---|---|---|
//! | `mock` / `sim` / `simulation` | – | memory stores |
//! | anything else | yes | bus-mirrored stores |
//! | anything else | no | memory stores, fallback recorded |

use std::sync::Arc;

use pickbot_types::{HardwareMode, PidGains, RobotError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bus::{self, FrameSink, SharedBus, SpiAddress, SpiBus};
use crate::control_store::{BusControlStore, ControlStore, MemoryControlStore};
use crate::pid_store::{BusPidStore, MemoryPidStore, PidStore};

/// Hardware section of the service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// `"mock"`, `"sim"`, `"simulation"`, or a bus mode such as `"spi"`.
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub spi_bus: u8,
    #[serde(default)]
    pub spi_device: u8,
    #[serde(default = "default_spi_speed_hz")]
    pub spi_speed_hz: u32,
}

fn default_mode() -> String {
    "mock".to_string()
}
fn default_spi_speed_hz() -> u32 {
    500_000
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            spi_bus: 0,
            spi_device: 0,
            spi_speed_hz: default_spi_speed_hz(),
        }
    }
}

impl HardwareConfig {
    /// The mode the operator asked for, before any fallback.
    pub fn requested_mode(&self) -> HardwareMode {
        match self.mode.trim().to_lowercase().as_str() {
            "mock" | "sim" | "simulation" => HardwareMode::Mock,
            _ => HardwareMode::Bus,
        }
    }

    pub fn spi_address(&self) -> SpiAddress {
        SpiAddress {
            bus: self.spi_bus,
            device: self.spi_device,
            speed_hz: self.spi_speed_hz,
        }
    }
}

/// The live PID and control stores plus the mode they run in.
#[derive(Clone)]
pub struct HalBackend {
    pub pid: Arc<dyn PidStore>,
    pub control: Arc<dyn ControlStore>,
    pub mode: HardwareMode,
    /// Why a bus mode was requested but memory stores were installed.
    pub fallback_reason: Option<String>,
}

impl HalBackend {
    /// Memory-only stores.
    pub fn mock(initial: PidGains) -> Self {
        Self {
            pid: Arc::new(MemoryPidStore::new(initial)),
            control: Arc::new(MemoryControlStore::new()),
            mode: HardwareMode::Mock,
            fallback_reason: None,
        }
    }

    /// Bus-mirrored stores sharing `bus`.
    pub fn with_bus(bus: SharedBus, initial: PidGains) -> Self {
        Self {
            pid: Arc::new(BusPidStore::new(Arc::clone(&bus), initial)),
            control: Arc::new(BusControlStore::new(bus)),
            mode: HardwareMode::Bus,
            fallback_reason: None,
        }
    }

    /// Build the backend described by `config`, opening the SPI device when a
    /// bus mode is requested.  Never fails: an unavailable bus degrades to
    /// memory stores.
    pub fn from_config(config: &HardwareConfig, initial: PidGains) -> Self {
        Self::select(config, initial, |cfg| {
            SpiBus::open(cfg.spi_address()).map(|spi| Box::new(spi) as Box<dyn FrameSink>)
        })
    }

    /// Like [`from_config`][Self::from_config] with a caller-supplied bus opener.
    pub fn select<F>(config: &HardwareConfig, initial: PidGains, open_bus: F) -> Self
    where
        F: FnOnce(&HardwareConfig) -> Result<Box<dyn FrameSink>, RobotError>,
    {
        if config.requested_mode() == HardwareMode::Mock {
            info!(event = "hardware_selected", mode = "mock", "using in-memory actuation stores");
            return Self::mock(initial);
        }

        match open_bus(config) {
            Ok(sink) => {
                info!(event = "hardware_selected", mode = "spi", device = sink.id(), "actuation bus opened");
                Self::with_bus(bus::shared(sink), initial)
            }
            Err(e) => {
                warn!(event = "hardware_init_failed", error = %e, "falling back to in-memory actuation stores");
                Self {
                    fallback_reason: Some(e.to_string()),
                    ..Self::mock(initial)
                }
            }
        }
    }

    /// `true` when writes reach the physical bus.
    pub fn bus_active(&self) -> bool {
        self.mode == HardwareMode::Bus
    }
}
