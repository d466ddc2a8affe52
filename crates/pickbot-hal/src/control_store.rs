//! [`ControlStore`] – the last-issued motion command.
//!
//! [`BusControlStore`] additionally writes each command to the bus as a
//! `control:<x>:<y>:<speed>` frame.  Neither variant clamps: whatever reaches
//! `send` is recorded verbatim.

use std::sync::Mutex;

use pickbot_types::{ControlCommand, RobotError};
use tracing::debug;

use crate::bus::{SharedBus, write_frame};
use crate::frame::control_frame;

/// Records motion commands.
pub trait ControlStore: Send + Sync {
    /// Record `(x, y, speed)` as the new last command and return it.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::HardwareFault`] when a bus-backed store fails to
    /// write the frame.
    fn send(&self, x: f64, y: f64, speed: f64) -> Result<ControlCommand, RobotError>;

    /// The most recently recorded command (all zeros before the first send).
    fn last(&self) -> ControlCommand;
}

/// Simulation store: the command is recorded in memory only.
#[derive(Debug, Default)]
pub struct MemoryControlStore {
    last: Mutex<ControlCommand>,
}

impl MemoryControlStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ControlStore for MemoryControlStore {
    fn send(&self, x: f64, y: f64, speed: f64) -> Result<ControlCommand, RobotError> {
        let command = ControlCommand { x, y, speed };
        *crate::lock(&self.last) = command;
        Ok(command)
    }

    fn last(&self) -> ControlCommand {
        *crate::lock(&self.last)
    }
}

/// Hardware store: every command is also written to the shared bus.
pub struct BusControlStore {
    last: Mutex<ControlCommand>,
    bus: SharedBus,
}

impl BusControlStore {
    pub fn new(bus: SharedBus) -> Self {
        Self {
            last: Mutex::new(ControlCommand::default()),
            bus,
        }
    }
}

impl ControlStore for BusControlStore {
    fn send(&self, x: f64, y: f64, speed: f64) -> Result<ControlCommand, RobotError> {
        let command = ControlCommand { x, y, speed };
        let mut last = crate::lock(&self.last);
        *last = command;
        write_frame(&self.bus, &control_frame(&command))?;
        debug!(x, y, speed, "control command written to bus");
        Ok(command)
    }

    fn last(&self) -> ControlCommand {
        *crate::lock(&self.last)
    }
}
