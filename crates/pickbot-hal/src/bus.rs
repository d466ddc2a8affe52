//! Byte-frame transport to the actuation firmware.
//!
//! Stores mirror their writes through a [`FrameSink`].  The production sink
//! is [`SpiBus`], which writes each frame as one SPI transfer on
//! `/dev/spidev<bus>.<device>`.  Both bus-backed stores share a single sink
//! through [`SharedBus`] so frames from concurrent requests never interleave.

use std::sync::{Arc, Mutex};

use pickbot_types::RobotError;

/// A device that accepts complete wire frames.
pub trait FrameSink: Send {
    /// Stable identifier used in logs and error reports, e.g. `"spidev0.0"`.
    fn id(&self) -> &str;

    /// Write one complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::HardwareFault`] when the device rejects the write.
    fn send(&mut self, frame: &[u8]) -> Result<(), RobotError>;
}

/// A frame sink shared by every bus-backed store.
pub type SharedBus = Arc<Mutex<Box<dyn FrameSink>>>;

/// Wrap a sink for sharing between stores.
pub fn shared(sink: Box<dyn FrameSink>) -> SharedBus {
    Arc::new(Mutex::new(sink))
}

/// Write `frame` on the shared bus, serialising with other writers.
pub(crate) fn write_frame(bus: &SharedBus, frame: &[u8]) -> Result<(), RobotError> {
    crate::lock(&**bus).send(frame)
}

/// Addressing parameters of an SPI device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiAddress {
    pub bus: u8,
    pub device: u8,
    pub speed_hz: u32,
}

impl SpiAddress {
    /// Path of the spidev character device for this address.
    pub fn device_path(&self) -> String {
        format!("/dev/spidev{}.{}", self.bus, self.device)
    }
}

/// SPI master writing frames to a spidev device node.
pub struct SpiBus {
    id: String,
    #[cfg(target_os = "linux")]
    device: spidev::Spidev,
}

impl SpiBus {
    /// Open and configure the device at `address` (mode 0, 8-bit words).
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::HardwareInit`] if the node is missing, cannot be
    /// configured, or the platform has no spidev support.
    #[cfg(target_os = "linux")]
    pub fn open(address: SpiAddress) -> Result<Self, RobotError> {
        use spidev::{SpiModeFlags, Spidev, SpidevOptions};

        let path = address.device_path();
        let mut device = Spidev::open(&path)
            .map_err(|e| RobotError::HardwareInit(format!("cannot open {path}: {e}")))?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(address.speed_hz)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        device
            .configure(&options)
            .map_err(|e| RobotError::HardwareInit(format!("cannot configure {path}: {e}")))?;

        Ok(Self {
            id: format!("spidev{}.{}", address.bus, address.device),
            device,
        })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn open(address: SpiAddress) -> Result<Self, RobotError> {
        Err(RobotError::HardwareInit(format!(
            "{} unavailable: spidev is only supported on Linux",
            address.device_path()
        )))
    }
}

impl FrameSink for SpiBus {
    fn id(&self) -> &str {
        &self.id
    }

    #[cfg(target_os = "linux")]
    fn send(&mut self, frame: &[u8]) -> Result<(), RobotError> {
        use std::io::Write;

        self.device
            .write_all(frame)
            .map_err(|e| RobotError::HardwareFault {
                component: self.id.clone(),
                details: e.to_string(),
            })
    }

    #[cfg(not(target_os = "linux"))]
    fn send(&mut self, _frame: &[u8]) -> Result<(), RobotError> {
        Err(RobotError::HardwareFault {
            component: self.id.clone(),
            details: "spidev is only supported on Linux".to_string(),
        })
    }
}
