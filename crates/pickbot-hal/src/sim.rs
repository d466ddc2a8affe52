//! In-process buses for testing without physical hardware.
//!
//! [`RecordingBus`] stores every frame it receives so tests can assert on the
//! exact wire text; [`FailingBus`] rejects every write so the hard-error path
//! of the bus-backed stores can be exercised.
//!
//! # Example
//!
//! ```rust
//! use pickbot_hal::sim::RecordingBus;
//! use pickbot_hal::{HalBackend, bus};
//! use pickbot_types::{PidAxis, PidGains};
//!
//! let recorder = RecordingBus::new();
//! let hal = HalBackend::with_bus(bus::shared(Box::new(recorder.clone())), PidGains::default());
//!
//! hal.pid.set(PidAxis::P, 0.5).expect("sim bus accepts every frame");
//! assert_eq!(recorder.frames(), vec!["pid:p:0.5\n".to_string()]);
//! ```

use std::sync::{Arc, Mutex};

use pickbot_types::RobotError;

use crate::bus::FrameSink;

// ────────────────────────────────────────────────────────────────────────────
// Recording bus
// ────────────────────────────────────────────────────────────────────────────

/// A simulated bus that records each frame.  Always succeeds.
///
/// Clones share the same frame log.
#[derive(Clone, Default)]
pub struct RecordingBus {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames received so far, decoded as UTF-8.
    pub fn frames(&self) -> Vec<String> {
        crate::lock(&self.frames)
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect()
    }
}

impl FrameSink for RecordingBus {
    fn id(&self) -> &str {
        "sim-recording"
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), RobotError> {
        crate::lock(&self.frames).push(frame.to_vec());
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Failing bus
// ────────────────────────────────────────────────────────────────────────────

/// A simulated bus whose every write fails with a hardware fault.
#[derive(Clone, Copy, Default)]
pub struct FailingBus;

impl FrameSink for FailingBus {
    fn id(&self) -> &str {
        "sim-failing"
    }

    fn send(&mut self, _frame: &[u8]) -> Result<(), RobotError> {
        Err(RobotError::HardwareFault {
            component: self.id().to_string(),
            details: "simulated bus write failure".to_string(),
        })
    }
}
