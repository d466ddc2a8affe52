//! [`InputBuffer`] – latest-value cache between ingress and the control loop.
//!
//! Ingress calls [`InputBuffer::update`] with each observation payload; the
//! control loop reads a consistent [`InputSnapshot`] once per tick.  Every
//! update fully replaces the previous snapshot: the typed [`Inputs`] are
//! recomputed from the new payload alone, alignment predicates included.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use pickbot_types::Inputs;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::vector::{VectorObservation, truthy};

/// Magnitude limits under which a detected vector counts as aligned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentThresholds {
    pub target: f64,
    pub place: f64,
}

impl Default for AlignmentThresholds {
    fn default() -> Self {
        Self {
            target: 0.15,
            place: 0.2,
        }
    }
}

/// A consistent copy of the buffered state.
#[derive(Debug, Clone, Serialize)]
pub struct InputSnapshot {
    pub inputs: Inputs,
    pub payload: Value,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for InputSnapshot {
    fn default() -> Self {
        Self {
            inputs: Inputs::default(),
            payload: Value::Object(Map::new()),
            updated_at: None,
        }
    }
}

/// Mutex-guarded latest observation.
#[derive(Debug, Default)]
pub struct InputBuffer {
    thresholds: AlignmentThresholds,
    latest: Mutex<InputSnapshot>,
}

impl InputBuffer {
    pub fn new(thresholds: AlignmentThresholds) -> Self {
        Self {
            thresholds,
            latest: Mutex::new(InputSnapshot::default()),
        }
    }

    pub fn thresholds(&self) -> AlignmentThresholds {
        self.thresholds
    }

    /// Derive typed inputs from `payload` without touching the buffer.
    ///
    /// `lego_detected` and `target_detected` both mirror the `target`
    /// observation; `line` is normalised but does not feed any input.
    pub fn derive(&self, payload: &Value) -> Inputs {
        let safe_zone = VectorObservation::from_value(payload.get("safe_zone"));
        let danger_zone = VectorObservation::from_value(payload.get("danger_zone"));
        let target = VectorObservation::from_value(payload.get("target"));
        let _line = VectorObservation::from_value(payload.get("line"));

        let flag = |key: &str| payload.get(key).is_some_and(truthy);

        Inputs {
            lego_detected: target.detected,
            target_detected: target.detected,
            safe_zone_detected: safe_zone.detected,
            danger_zone_detected: danger_zone.detected,
            aligned_for_retrieve: target.detected && target.magnitude() <= self.thresholds.target,
            aligned_for_place: safe_zone.detected && safe_zone.magnitude() <= self.thresholds.place,
            retrieving: flag("retrieving"),
            placing: flag("placing"),
            pick_up_success: flag("pick_up_success"),
            place_success: flag("place_success"),
            failed_pickup: flag("failed_pickup"),
            at_home: flag("at_home"),
        }
    }

    /// Replace the buffered snapshot with one derived from `payload` and
    /// return the new inputs.  Non-object payloads are treated as empty.
    pub fn update(&self, payload: Value) -> Inputs {
        let payload = if payload.is_object() {
            payload
        } else {
            Value::Object(Map::new())
        };
        let inputs = self.derive(&payload);

        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        *latest = InputSnapshot {
            inputs,
            payload,
            updated_at: Some(Utc::now()),
        };
        inputs
    }

    /// A copy of the latest inputs, raw payload, and update time.
    pub fn snapshot(&self) -> InputSnapshot {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn buffer() -> InputBuffer {
        InputBuffer::new(AlignmentThresholds::default())
    }

    #[test]
    fn empty_buffer_snapshot() {
        let snap = buffer().snapshot();
        assert_eq!(snap.inputs, Inputs::default());
        assert_eq!(snap.payload, json!({}));
        assert!(snap.updated_at.is_none());
    }

    #[test]
    fn close_target_is_aligned_for_retrieve() {
        let inputs = buffer().update(json!({
            "target": {"detected": true, "vector": {"x": 0.05, "y": 0.05}},
        }));
        assert!(inputs.lego_detected);
        assert!(inputs.target_detected);
        assert!(inputs.aligned_for_retrieve);
    }

    #[test]
    fn far_target_is_not_aligned() {
        let inputs = buffer().update(json!({
            "target": {"detected": true, "vector": {"x": 0.2, "y": 0.0}},
        }));
        assert!(inputs.target_detected);
        assert!(!inputs.aligned_for_retrieve);
    }

    #[test]
    fn threshold_comparison_is_inclusive() {
        let buf = InputBuffer::new(AlignmentThresholds {
            target: 0.5,
            place: 0.5,
        });
        let inputs = buf.update(json!({
            "target": {"detected": true, "x": 0.5, "y": 0.0},
            "safe_zone": {"detected": true, "x": 0.0, "y": -0.5},
        }));
        assert!(inputs.aligned_for_retrieve);
        assert!(inputs.aligned_for_place);
    }

    #[test]
    fn undetected_vector_is_never_aligned() {
        let inputs = buffer().update(json!({
            "target": {"detected": false, "vector": {"x": 0.0, "y": 0.0}},
            "safe_zone": {"vector": {"x": 0.0, "y": 0.0}},
        }));
        assert!(!inputs.aligned_for_retrieve);
        assert!(!inputs.aligned_for_place);
    }

    #[test]
    fn flags_are_read_from_top_level() {
        let inputs = buffer().update(json!({
            "retrieving": true,
            "failed_pickup": 1,
            "at_home": "yes",
            "placing": false,
            "danger_zone": {"detected": true},
        }));
        assert!(inputs.retrieving);
        assert!(inputs.failed_pickup);
        assert!(inputs.at_home);
        assert!(!inputs.placing);
        assert!(inputs.danger_zone_detected);
    }

    #[test]
    fn update_replaces_rather_than_merges() {
        let buf = buffer();
        buf.update(json!({"retrieving": true, "target": {"detected": true}}));
        let second = buf.update(json!({"at_home": true}));
        assert!(!second.retrieving);
        assert!(!second.target_detected);
        assert!(second.at_home);

        let snap = buf.snapshot();
        assert_eq!(snap.inputs, second);
        assert_eq!(snap.payload, json!({"at_home": true}));
        assert!(snap.updated_at.is_some());
    }

    #[test]
    fn non_object_payload_is_treated_as_empty() {
        let buf = buffer();
        let inputs = buf.update(json!([1, 2, 3]));
        assert_eq!(inputs, Inputs::default());
        assert_eq!(buf.snapshot().payload, json!({}));
    }

    #[test]
    fn concurrent_readers_see_whole_snapshots() {
        use std::sync::Arc;
        use std::thread;

        let buf = Arc::new(buffer());
        let writer = {
            let buf = Arc::clone(&buf);
            thread::spawn(move || {
                for i in 0..200 {
                    let on = i % 2 == 0;
                    buf.update(json!({"retrieving": on, "placing": on}));
                }
            })
        };
        for _ in 0..200 {
            let snap = buf.snapshot();
            assert_eq!(snap.inputs.retrieving, snap.inputs.placing);
        }
        writer.join().unwrap();
    }
}
