//! ASCII wire frames written to the actuation bus.
//!
//! | Frame | Layout |
//! |---|---|
//! | PID gain update | `pid:<axis>:<value>\n` |
//! | Motion command  | `control:<x>:<y>:<speed>\n` |
//!
//! Floats always carry a decimal point (`1.0`, not `1`) so the firmware
//! parser sees the same text for integral and fractional values.

use pickbot_types::{ControlCommand, PidAxis};

/// Encode a PID gain update.
pub fn pid_frame(axis: PidAxis, value: f64) -> Vec<u8> {
    format!("pid:{}:{}\n", axis.as_str(), format_value(value)).into_bytes()
}

/// Encode a motion command.
pub fn control_frame(command: &ControlCommand) -> Vec<u8> {
    format!(
        "control:{}:{}:{}\n",
        format_value(command.x),
        format_value(command.y),
        format_value(command.speed)
    )
    .into_bytes()
}

fn format_value(value: f64) -> String {
    // Debug formatting keeps the trailing `.0` on integral values.
    format!("{value:?}")
}
