//! `pickbot-hal` – actuation hardware-abstraction layer.
//!
//! The HAL holds the authoritative PID gains and the last motion command in
//! memory.  Depending on the [`HardwareMode`][pickbot_types::HardwareMode]
//! chosen at startup, writes are additionally mirrored onto the SPI bus as
//! ASCII frames.
//!
//! # Modules
//!
//! - [`frame`] – wire encoding of `pid:` and `control:` frames.
//! - [`bus`] – the [`FrameSink`][bus::FrameSink] trait and the Linux SPI
//!   driver.
//! - [`pid_store`] / [`control_store`] – the two store capabilities, each with
//!   a memory-only and a bus-mirrored variant.
//! - [`backend`] – one-shot backend selection with fallback to memory when
//!   the bus cannot be opened.
//! - [`validate`] – range and finiteness checks that gate every value before
//!   it reaches a store.  The stores themselves never clamp.
//! - [`sim`] – recording and failing buses for headless tests.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod backend;
pub mod bus;
pub mod control_store;
pub mod frame;
pub mod pid_store;
pub mod sim;
pub mod validate;

pub use backend::{HalBackend, HardwareConfig};
pub use bus::{FrameSink, SharedBus};
pub use control_store::{BusControlStore, ControlStore, MemoryControlStore};
pub use pid_store::{BusPidStore, MemoryPidStore, PidStore};
pub use validate::{PidValueError, ValidationError};

// A panic while holding a store lock leaves plain values behind; keep serving them.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
