//! [`ActuationMetrics`] – counters and gauges served at `GET /metrics`.
//!
//! Rendered in the Prometheus text format, one `# HELP` / `# TYPE` header
//! per family.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::{Mutex, PoisonError};

use pickbot_types::{ControlCommand, HardwareMode, PidAxis, PidGains};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug)]
struct Families {
    pid_gain: PidGains,
    pid_set_total: BTreeMap<&'static str, u64>,
    pid_get_total: BTreeMap<&'static str, u64>,
    pid_errors_total: BTreeMap<(&'static str, &'static str), u64>,
    mode: HardwareMode,
    control_command_total: u64,
    control_command_errors_total: BTreeMap<&'static str, u64>,
    control: ControlCommand,
    system_state: String,
}

#[derive(Debug)]
pub struct ActuationMetrics {
    families: Mutex<Families>,
}

impl ActuationMetrics {
    /// Registry seeded with the startup gains, the live mode, a zero command,
    /// and the `unknown` system state.
    pub fn new(mode: HardwareMode, gains: PidGains) -> Self {
        Self {
            families: Mutex::new(Families {
                pid_gain: gains,
                pid_set_total: BTreeMap::new(),
                pid_get_total: BTreeMap::new(),
                pid_errors_total: BTreeMap::new(),
                mode,
                control_command_total: 0,
                control_command_errors_total: BTreeMap::new(),
                control: ControlCommand::default(),
                system_state: "unknown".to_string(),
            }),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut Families) -> T) -> T {
        f(&mut self.families.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn record_pid_get(&self, axis: PidAxis, value: f64) {
        self.with(|m| {
            *m.pid_get_total.entry(axis.as_str()).or_default() += 1;
            m.pid_gain.set(axis, value);
        });
    }

    pub fn record_pid_set(&self, axis: PidAxis, value: f64) {
        self.with(|m| {
            *m.pid_set_total.entry(axis.as_str()).or_default() += 1;
            m.pid_gain.set(axis, value);
        });
    }

    /// `kind` is `payload`, `parse`, or `hardware`.
    pub fn record_pid_error(&self, axis: PidAxis, kind: &'static str) {
        self.with(|m| *m.pid_errors_total.entry((axis.as_str(), kind)).or_default() += 1);
    }

    pub fn set_pid_gain(&self, axis: PidAxis, value: f64) {
        self.with(|m| m.pid_gain.set(axis, value));
    }

    pub fn record_control(&self, command: &ControlCommand) {
        self.with(|m| {
            m.control_command_total += 1;
            m.control = *command;
        });
    }

    /// `kind` is `validation` or `hardware`.
    pub fn record_control_error(&self, kind: &'static str) {
        self.with(|m| *m.control_command_errors_total.entry(kind).or_default() += 1);
    }

    /// Move the `system_state` gauge to `state`; the previous label is dropped.
    pub fn set_system_state(&self, state: &str) {
        self.with(|m| m.system_state = state.to_string());
    }

    /// The full exposition text.
    pub fn render(&self) -> String {
        self.with(|m| {
            let mut out = String::new();

            header(&mut out, "pid_gain", "Current PID gain value", "gauge");
            for axis in PidAxis::ALL {
                sample(&mut out, "pid_gain", &[("axis", axis.as_str())], m.pid_gain.get(axis));
            }

            header(&mut out, "pid_set_total", "PID set requests", "counter");
            for (axis, n) in &m.pid_set_total {
                sample(&mut out, "pid_set_total", &[("axis", *axis)], *n);
            }

            header(&mut out, "pid_get_total", "PID get requests", "counter");
            for (axis, n) in &m.pid_get_total {
                sample(&mut out, "pid_get_total", &[("axis", *axis)], *n);
            }

            header(&mut out, "pid_errors_total", "PID errors", "counter");
            for ((axis, kind), n) in &m.pid_errors_total {
                sample(&mut out, "pid_errors_total", &[("axis", *axis), ("type", *kind)], *n);
            }

            header(&mut out, "pid_bridge_mode", "Bridge mode status", "gauge");
            for mode in [HardwareMode::Mock, HardwareMode::Bus] {
                let on = u8::from(mode == m.mode);
                sample(&mut out, "pid_bridge_mode", &[("mode", mode.as_str())], on);
            }

            header(&mut out, "control_command_total", "Control commands sent", "counter");
            sample(&mut out, "control_command_total", &[], m.control_command_total);

            header(&mut out, "control_command_errors_total", "Control command errors", "counter");
            for (kind, n) in &m.control_command_errors_total {
                sample(&mut out, "control_command_errors_total", &[("type", *kind)], *n);
            }

            header(&mut out, "control_vector", "Control vector", "gauge");
            sample(&mut out, "control_vector", &[("axis", "x")], m.control.x);
            sample(&mut out, "control_vector", &[("axis", "y")], m.control.y);

            header(&mut out, "control_speed", "Control speed", "gauge");
            sample(&mut out, "control_speed", &[], m.control.speed);

            header(&mut out, "system_state", "State machine state", "gauge");
            sample(&mut out, "system_state", &[("state", m.system_state.as_str())], 1);

            out
        })
    }
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

fn sample(out: &mut String, name: &str, labels: &[(&str, &str)], value: impl std::fmt::Display) {
    out.push_str(name);
    if !labels.is_empty() {
        out.push('{');
        for (i, (key, val)) in labels.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{key}=\"{}\"", escape_label(val));
        }
        out.push('}');
    }
    let _ = writeln!(out, " {value}");
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
