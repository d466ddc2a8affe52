//! [`PidStore`] – the tunable gain store.
//!
//! The authoritative gains always live in memory.  [`BusPidStore`]
//! additionally mirrors each write onto the bus as a `pid:<axis>:<value>`
//! frame; a failed mirror surfaces as a hard error to the caller.
//!
//! Values are stored exactly as given.  Range and finiteness checks belong to
//! [`validate`][crate::validate].

use std::sync::Mutex;

use pickbot_types::{PidAxis, PidGains, RobotError};
use tracing::debug;

use crate::bus::{SharedBus, write_frame};
use crate::frame::pid_frame;

/// Get/set access to the three PID gains.
pub trait PidStore: Send + Sync {
    /// Current value of `axis`.
    fn get(&self, axis: PidAxis) -> f64;

    /// Store `value` for `axis` and return the stored value.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::HardwareFault`] when a bus-backed store fails to
    /// mirror the write.  The in-memory value is updated regardless.
    fn set(&self, axis: PidAxis, value: f64) -> Result<f64, RobotError>;

    /// Snapshot of all three gains.
    fn gains(&self) -> PidGains;
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory-only store
// ─────────────────────────────────────────────────────────────────────────────

/// Simulation store: gains are held in memory only.
#[derive(Debug, Default)]
pub struct MemoryPidStore {
    gains: Mutex<PidGains>,
}

impl MemoryPidStore {
    pub fn new(initial: PidGains) -> Self {
        Self {
            gains: Mutex::new(initial),
        }
    }
}

impl PidStore for MemoryPidStore {
    fn get(&self, axis: PidAxis) -> f64 {
        crate::lock(&self.gains).get(axis)
    }

    fn set(&self, axis: PidAxis, value: f64) -> Result<f64, RobotError> {
        crate::lock(&self.gains).set(axis, value);
        Ok(value)
    }

    fn gains(&self) -> PidGains {
        *crate::lock(&self.gains)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bus-mirrored store
// ─────────────────────────────────────────────────────────────────────────────

/// Hardware store: every `set` is mirrored onto the shared bus.
pub struct BusPidStore {
    gains: Mutex<PidGains>,
    bus: SharedBus,
}

impl BusPidStore {
    pub fn new(bus: SharedBus, initial: PidGains) -> Self {
        Self {
            gains: Mutex::new(initial),
            bus,
        }
    }
}

impl PidStore for BusPidStore {
    fn get(&self, axis: PidAxis) -> f64 {
        crate::lock(&self.gains).get(axis)
    }

    fn set(&self, axis: PidAxis, value: f64) -> Result<f64, RobotError> {
        // Hold the gain lock across the write so frame order matches memory order.
        let mut gains = crate::lock(&self.gains);
        gains.set(axis, value);
        write_frame(&self.bus, &pid_frame(axis, value))?;
        debug!(axis = %axis, value, "pid gain mirrored to bus");
        Ok(value)
    }

    fn gains(&self) -> PidGains {
        *crate::lock(&self.gains)
    }
}
