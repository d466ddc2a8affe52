//! [`VectorObservation`] – canonical form of one vision observation.
//!
//! Upstream producers do not agree on a schema, so normalisation is lenient:
//!
//! - `detected` is read from the `detected` key; when that key is missing
//!   (or `null`) the top-level keys are scanned in payload order for the
//!   first one whose name contains `"detected"` (case-insensitive).  No match
//!   means `false`.
//! - `x` / `y` are read from `vector.x` / `vector.y`, then top-level `x` /
//!   `y`, then default to `0.0`.  Numeric strings are accepted; anything
//!   non-numeric or non-finite becomes `0.0`.
//!
//! Normalising the JSON form of an observation yields the same observation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A detection flag plus a planar offset vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorObservation {
    pub detected: bool,
    pub x: f64,
    pub y: f64,
}

impl VectorObservation {
    /// Euclidean length of the offset vector.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Normalise an arbitrary payload fragment.  Non-objects (and `None`)
    /// normalise to the default observation.
    pub fn from_value(value: Option<&Value>) -> Self {
        let empty = Map::new();
        let data = value.and_then(Value::as_object).unwrap_or(&empty);

        let detected = match data.get("detected") {
            Some(v) if !v.is_null() => truthy(v),
            _ => data
                .iter()
                .find(|(key, _)| key.to_lowercase().contains("detected"))
                .map(|(_, v)| truthy(v))
                .unwrap_or(false),
        };

        let vector = data.get("vector").and_then(Value::as_object);
        let coord = |key: &str| {
            vector
                .and_then(|v| v.get(key))
                .or_else(|| data.get(key))
                .map(coerce_f64)
                .unwrap_or(0.0)
        };

        Self {
            detected,
            x: coord("x"),
            y: coord("y"),
        }
    }

    /// JSON form (`{"detected", "x", "y"}`).
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "detected": self.detected, "x": self.x, "y": self.y })
    }
}

/// JSON truthiness: `null`, `false`, zero, and empty strings, arrays and
/// objects are false; everything else is true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn coerce_f64(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn nested_vector_is_preferred() {
        let obs = VectorObservation::from_value(Some(&json!({
            "detected": true,
            "vector": {"x": 0.3, "y": -0.4},
            "x": 9.0,
        })));
        assert!(obs.detected);
        assert_eq!((obs.x, obs.y), (0.3, -0.4));
        assert!((obs.magnitude() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn flat_fields_are_used_when_vector_is_absent() {
        let obs = VectorObservation::from_value(Some(&json!({"detected": 1, "x": "0.1", "y": 2})));
        assert!(obs.detected);
        assert_eq!((obs.x, obs.y), (0.1, 2.0));
    }

    #[test]
    fn missing_detected_scans_keys_case_insensitively() {
        let obs = VectorObservation::from_value(Some(&json!({"zoneDetected": true})));
        assert!(obs.detected);

        let obs = VectorObservation::from_value(Some(&json!({"LEGO_DETECTED": 0})));
        assert!(!obs.detected);
    }

    #[test]
    fn key_scan_takes_first_match_in_payload_order() {
        let payload: Value =
            serde_json::from_str(r#"{"z_detected": true, "a_detected": false}"#).unwrap();
        assert!(VectorObservation::from_value(Some(&payload)).detected);
    }

    #[test]
    fn explicit_detected_wins_over_scan() {
        let obs = VectorObservation::from_value(Some(&json!({"detected": false, "was_detected": true})));
        assert!(!obs.detected);
    }

    #[test]
    fn garbage_coerces_to_defaults() {
        let obs = VectorObservation::from_value(Some(&json!({
            "vector": {"x": "NaN", "y": [1, 2]},
        })));
        assert_eq!(obs, VectorObservation::default());

        assert_eq!(VectorObservation::from_value(None), VectorObservation::default());
        assert_eq!(VectorObservation::from_value(Some(&json!("nope"))), VectorObservation::default());
    }

    #[test]
    fn truthiness_table() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!([])));
        assert!(truthy(&json!(0.5)));
        assert!(truthy(&json!("yes")));
        assert!(truthy(&json!({"a": 1})));
    }

    proptest! {
        #[test]
        fn normalizing_own_output_is_idempotent(
            detected in any::<bool>(),
            x in -1.0e6f64..1.0e6,
            y in -1.0e6f64..1.0e6,
        ) {
            let first = VectorObservation::from_value(Some(&json!({
                "detected": detected,
                "vector": {"x": x, "y": y},
            })));
            let second = VectorObservation::from_value(Some(&first.to_value()));
            prop_assert_eq!(first, second);
        }
    }
}
