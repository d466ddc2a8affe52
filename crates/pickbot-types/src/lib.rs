//! `pickbot-types` – shared vocabulary for the pick-and-place control core.
//!
//! Every other crate in the workspace speaks in terms of these types: the
//! controller's [`State`] and [`Inputs`], the actuation layer's [`PidAxis`]
//! and [`ControlCommand`], and the workspace-wide [`RobotError`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Controller vocabulary
// ─────────────────────────────────────────────────────────────────────────────

/// Phase of the pick-and-place task.
///
/// Serialised as lowercase snake case (`"find_target"`), which is also the
/// label pushed to the actuation service and written to the metrics file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    #[default]
    Searching,
    FindTarget,
    AlignForRetrieve,
    Retrieving,
    Retrieved,
    Transporting,
    AlignForPlace,
    Placing,
    PlaceSuccess,
    ReturnHome,
    ErrorRetrieve,
    ErrorPlace,
    /// Terminal state: no outgoing transitions.
    End,
}

impl State {
    /// Every state, in task order.
    pub const ALL: [State; 13] = [
        State::Searching,
        State::FindTarget,
        State::AlignForRetrieve,
        State::Retrieving,
        State::Retrieved,
        State::Transporting,
        State::AlignForPlace,
        State::Placing,
        State::PlaceSuccess,
        State::ReturnHome,
        State::ErrorRetrieve,
        State::ErrorPlace,
        State::End,
    ];

    /// Wire label of this state.
    pub fn as_str(self) -> &'static str {
        match self {
            State::Searching => "searching",
            State::FindTarget => "find_target",
            State::AlignForRetrieve => "align_for_retrieve",
            State::Retrieving => "retrieving",
            State::Retrieved => "retrieved",
            State::Transporting => "transporting",
            State::AlignForPlace => "align_for_place",
            State::Placing => "placing",
            State::PlaceSuccess => "place_success",
            State::ReturnHome => "return_home",
            State::ErrorRetrieve => "error_retrieve",
            State::ErrorPlace => "error_place",
            State::End => "end",
        }
    }

    /// `true` only for [`State::End`].
    pub fn is_terminal(self) -> bool {
        self == State::End
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The controller's typed view of the latest observation payload.
///
/// Always recomputed from scratch on every update; never merged with the
/// previous value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inputs {
    pub lego_detected: bool,
    pub target_detected: bool,
    pub safe_zone_detected: bool,
    pub danger_zone_detected: bool,
    pub aligned_for_retrieve: bool,
    pub aligned_for_place: bool,
    pub retrieving: bool,
    pub placing: bool,
    pub pick_up_success: bool,
    pub place_success: bool,
    pub failed_pickup: bool,
    pub at_home: bool,
}

/// Counters carried across the controller's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateContext {
    /// Consecutive ticks with `failed_pickup` set since the last success.
    pub failed_pickups: u32,
    /// Number of transitions taken since process start.
    pub transition_count: u64,
    /// Wall-clock time of the most recent transition.
    pub last_transition_at: Option<DateTime<Utc>>,
}

/// A transition taken by one tick of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionResult {
    pub source: State,
    pub target: State,
    /// Short diagnostic tag such as `"LD"` or `"FPU>limit"`.
    pub label: &'static str,
}

// ─────────────────────────────────────────────────────────────────────────────
// Actuation vocabulary
// ─────────────────────────────────────────────────────────────────────────────

/// One of the three tunable PID gains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PidAxis {
    P,
    I,
    D,
}

impl PidAxis {
    pub const ALL: [PidAxis; 3] = [PidAxis::P, PidAxis::I, PidAxis::D];

    /// Single-letter key used in bus frames and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            PidAxis::P => "p",
            PidAxis::I => "i",
            PidAxis::D => "d",
        }
    }

    /// Resolve the HTTP route segment (`"proportional"`, `"integral"`,
    /// `"derivative"`) to an axis.
    pub fn from_route(segment: &str) -> Option<Self> {
        match segment {
            "proportional" => Some(PidAxis::P),
            "integral" => Some(PidAxis::I),
            "derivative" => Some(PidAxis::D),
            _ => None,
        }
    }
}

impl fmt::Display for PidAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The full gain set. Values are opaque: stored and mirrored, never applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

impl PidGains {
    pub fn get(&self, axis: PidAxis) -> f64 {
        match axis {
            PidAxis::P => self.p,
            PidAxis::I => self.i,
            PidAxis::D => self.d,
        }
    }

    pub fn set(&mut self, axis: PidAxis, value: f64) {
        match axis {
            PidAxis::P => self.p = value,
            PidAxis::I => self.i = value,
            PidAxis::D => self.d = value,
        }
    }
}

/// A motion command: planar direction plus a speed scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub x: f64,
    pub y: f64,
    pub speed: f64,
}

/// Which actuation backend is live. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareMode {
    /// Values are held in memory only.
    #[serde(rename = "mock")]
    Mock,
    /// Writes are additionally mirrored onto the SPI bus.
    #[serde(rename = "spi")]
    Bus,
}

impl HardwareMode {
    pub fn as_str(self) -> &'static str {
        match self {
            HardwareMode::Mock => "mock",
            HardwareMode::Bus => "spi",
        }
    }
}

impl fmt::Display for HardwareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type.
#[derive(Error, Debug)]
pub enum RobotError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Hardware initialisation failed: {0}")]
    HardwareInit(String),

    #[error("Network Error: {0}")]
    Network(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_labels_match_serde_names() {
        for state in State::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }

    #[test]
    fn only_end_is_terminal() {
        let terminal: Vec<State> = State::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![State::End]);
        assert_eq!(State::default(), State::Searching);
    }

    #[test]
    fn pid_axis_route_mapping() {
        assert_eq!(PidAxis::from_route("proportional"), Some(PidAxis::P));
        assert_eq!(PidAxis::from_route("integral"), Some(PidAxis::I));
        assert_eq!(PidAxis::from_route("derivative"), Some(PidAxis::D));
        assert_eq!(PidAxis::from_route("p"), None);
    }

    #[test]
    fn pid_gains_get_set_by_axis() {
        let mut gains = PidGains::default();
        gains.set(PidAxis::I, 0.25);
        assert_eq!(gains.get(PidAxis::I), 0.25);
        assert_eq!(gains.get(PidAxis::P), 0.0);
    }

    #[test]
    fn hardware_mode_wire_labels() {
        assert_eq!(serde_json::to_string(&HardwareMode::Bus).unwrap(), "\"spi\"");
        assert_eq!(HardwareMode::Mock.to_string(), "mock");
    }

    #[test]
    fn robot_error_display() {
        let err = RobotError::HardwareFault {
            component: "spi0.0".to_string(),
            details: "broken pipe".to_string(),
        };
        assert!(err.to_string().contains("spi0.0"));
    }
}
