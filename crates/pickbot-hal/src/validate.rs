//! Command validation – the only gate between request payloads and the stores.
//!
//! PID values must parse to a finite number.  Motion commands must have
//! finite `x, y ∈ [-1, 1]` and `speed ∈ [0, 1]`; every failing field is
//! reported and any failure rejects the whole command.

use std::collections::BTreeMap;

use pickbot_types::ControlCommand;
use serde_json::Value;
use thiserror::Error;

/// Why a PID set request was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PidValueError {
    /// The request carried no usable value.
    #[error("{0}")]
    Payload(&'static str),
    /// The value was present but not a finite number.
    #[error("Value must be a finite number.")]
    Parse,
}

impl PidValueError {
    /// Metric label for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PidValueError::Payload(_) => "payload",
            PidValueError::Parse => "parse",
        }
    }
}

/// A rejected motion command with one reason per failing field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub errors: BTreeMap<String, String>,
}

/// Parse a finite number from a JSON number or numeric string.
///
/// `NaN`, `inf`, booleans, and anything non-numeric yield `None`.
pub fn parse_finite(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

/// Extract the gain from a JSON `{ "value": ... }` body.
pub fn pid_value_from_json(payload: &Value) -> Result<f64, PidValueError> {
    match payload.get("value") {
        None | Some(Value::Null) => Err(PidValueError::Payload("Missing 'value' in JSON payload.")),
        Some(value) => parse_finite(value).ok_or(PidValueError::Parse),
    }
}

/// Extract the gain from an `application/json` request body.
///
/// A body that is not valid JSON counts as `{}`, except for a number too
/// large for `f64` (`1e999`), which is infinite and rejected as such.
pub fn pid_value_from_json_body(body: &[u8]) -> Result<f64, PidValueError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(payload) => pid_value_from_json(&payload),
        Err(e) if e.to_string().starts_with("number out of range") => Err(PidValueError::Parse),
        Err(_) => pid_value_from_json(&Value::Object(Default::default())),
    }
}

/// Extract the gain from a raw text body such as `"0.75"`.
pub fn pid_value_from_text(body: &str) -> Result<f64, PidValueError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(PidValueError::Payload("Empty request body."));
    }
    parse_finite(&Value::String(trimmed.to_string())).ok_or(PidValueError::Parse)
}

/// Validate a `{x, y, speed}` payload.
pub fn control_command(payload: &Value) -> Result<ControlCommand, ValidationError> {
    let mut errors = BTreeMap::new();

    let x = axis_field(payload, "x", "X", -1.0, 1.0, &mut errors);
    let y = axis_field(payload, "y", "Y", -1.0, 1.0, &mut errors);
    let speed = axis_field(payload, "speed", "Speed", 0.0, 1.0, &mut errors);

    match (x, y, speed) {
        (Some(x), Some(y), Some(speed)) if errors.is_empty() => Ok(ControlCommand { x, y, speed }),
        _ => Err(ValidationError {
            message: "Invalid control payload.".to_string(),
            errors,
        }),
    }
}

/// Rejection used when the control body is not JSON at all.
pub fn non_json_control_payload() -> ValidationError {
    ValidationError {
        message: "Invalid control payload.".to_string(),
        errors: BTreeMap::from([("payload".to_string(), "Expected JSON payload.".to_string())]),
    }
}

fn axis_field(
    payload: &Value,
    key: &str,
    name: &str,
    min: f64,
    max: f64,
    errors: &mut BTreeMap<String, String>,
) -> Option<f64> {
    let Some(value) = payload.get(key).and_then(parse_finite) else {
        errors.insert(key.to_string(), format!("{name} must be a finite number."));
        return None;
    };
    if !(min..=max).contains(&value) {
        errors.insert(key.to_string(), format!("{name} must be between {min} and {max}."));
        return None;
    }
    Some(value)
}
