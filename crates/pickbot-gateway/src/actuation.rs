//! [`ActuationRouter`] – the actuation API in front of the HAL stores.
//!
//! | Method | Path | Success | Failure |
//! |---|---|---|---|
//! | `GET` | `/pid/{proportional,integral,derivative}` | `{value}` | – |
//! | `POST` | `/pid/{proportional,integral,derivative}` | `{value}` | `400` / `502` `{message}` |
//! | `POST` | `/control` | `{command:{x,y,speed}}` | `400` `{message, errors}` / `502` `{message}` |
//! | `GET` | `/state` | `{state, updated_at}` | – |
//! | `POST` | `/state` | `{state, updated_at}` | `400` `{message}` |
//! | `GET` | `/health` | `{status, mode, spi_active}` | – |
//! | `GET` | `/metrics` | text exposition | – |
//!
//! Every command is validated before a store is touched.  A `502` means the
//! in-memory value was updated but mirroring it onto the bus failed.

use std::sync::{Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use pickbot_hal::{HalBackend, validate};
use pickbot_types::PidAxis;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::exposition::{self, ActuationMetrics};
use crate::http::{Request, Response};
use crate::server::Router;

/// Last controller state reported through `POST /state`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportedState {
    pub state: String,
    /// RFC 3339 UTC, second precision.
    pub updated_at: Option<String>,
}

impl Default for ReportedState {
    fn default() -> Self {
        Self {
            state: "unknown".to_string(),
            updated_at: None,
        }
    }
}

pub struct ActuationRouter {
    backend: HalBackend,
    reported: Mutex<ReportedState>,
    metrics: ActuationMetrics,
}

impl ActuationRouter {
    pub fn new(backend: HalBackend) -> Self {
        let metrics = ActuationMetrics::new(backend.mode, backend.pid.gains());
        Self {
            backend,
            reported: Mutex::new(ReportedState::default()),
            metrics,
        }
    }

    pub fn metrics(&self) -> &ActuationMetrics {
        &self.metrics
    }

    fn health(&self) -> Response {
        Response::json(
            200,
            &json!({
                "status": "ok",
                "mode": self.backend.mode.as_str(),
                "spi_active": self.backend.bus_active(),
            }),
        )
    }

    // ── PID ────────────────────────────────────────────────────────────────

    fn get_pid(&self, axis: PidAxis) -> Response {
        let value = self.backend.pid.get(axis);
        self.metrics.record_pid_get(axis, value);
        info!(event = "pid_get", axis = %axis, value);
        Response::json(200, &json!({ "value": value }))
    }

    fn set_pid(&self, axis: PidAxis, request: &Request) -> Response {
        let parsed = if request.is_json() {
            validate::pid_value_from_json_body(&request.body)
        } else {
            validate::pid_value_from_text(&request.text())
        };
        let value = match parsed {
            Ok(value) => value,
            Err(e) => {
                self.metrics.record_pid_error(axis, e.kind());
                return Response::message(400, &e.to_string());
            }
        };

        match self.backend.pid.set(axis, value) {
            Ok(updated) => {
                self.metrics.record_pid_set(axis, updated);
                info!(event = "pid_set", axis = %axis, value = updated);
                Response::json(200, &json!({ "value": updated }))
            }
            Err(e) => {
                self.metrics.record_pid_error(axis, "hardware");
                self.metrics.set_pid_gain(axis, self.backend.pid.get(axis));
                warn!(event = "pid_set", axis = %axis, value, error = %e, "bus write failed");
                Response::message(502, &e.to_string())
            }
        }
    }

    // ── Motion ─────────────────────────────────────────────────────────────

    fn send_control(&self, request: &Request) -> Response {
        let validated = if request.is_json() {
            validate::control_command(&request.json().unwrap_or_else(|| json!({})))
        } else {
            Err(validate::non_json_control_payload())
        };
        let command = match validated {
            Ok(command) => command,
            Err(e) => {
                self.metrics.record_control_error("validation");
                return Response::json(400, &json!({ "message": e.message, "errors": e.errors }));
            }
        };

        match self.backend.control.send(command.x, command.y, command.speed) {
            Ok(sent) => {
                self.metrics.record_control(&sent);
                info!(event = "control_command", x = sent.x, y = sent.y, speed = sent.speed);
                Response::json(200, &json!({ "command": sent }))
            }
            Err(e) => {
                self.metrics.record_control_error("hardware");
                warn!(event = "control_command", error = %e, "bus write failed");
                Response::message(502, &e.to_string())
            }
        }
    }

    // ── Reported state ─────────────────────────────────────────────────────

    fn reported(&self) -> ReportedState {
        self.reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, request: &Request) -> Response {
        if !request.is_json() {
            return Response::message(400, "Expected JSON payload.");
        }
        let payload = request.json().unwrap_or(Value::Null);
        let Some(state) = payload
            .get("state")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        else {
            return Response::message(400, "Missing 'state' in payload.");
        };

        let updated = ReportedState {
            state: state.to_string(),
            updated_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        };
        *self.reported.lock().unwrap_or_else(PoisonError::into_inner) = updated.clone();
        self.metrics.set_system_state(state);
        info!(event = "state_update", state, updated_at = updated.updated_at.as_deref());
        Response::json(200, &updated)
    }
}

impl Router for ActuationRouter {
    fn handle(&self, request: &Request) -> Response {
        let method = request.method.as_str();
        if let Some(segment) = request.path.strip_prefix("/pid/") {
            let Some(axis) = PidAxis::from_route(segment) else {
                return Response::not_found();
            };
            return match method {
                "GET" => self.get_pid(axis),
                "POST" => self.set_pid(axis, request),
                _ => Response::method_not_allowed(),
            };
        }

        match (method, request.path.as_str()) {
            ("GET", "/health") => self.health(),
            ("GET", "/metrics") => Response::text(200, exposition::CONTENT_TYPE, self.metrics.render()),
            ("POST", "/control") => self.send_control(request),
            ("GET", "/state") => Response::json(200, &self.reported()),
            ("POST", "/state") => self.set_state(request),
            (_, "/health" | "/metrics" | "/control" | "/state") => Response::method_not_allowed(),
            _ => Response::not_found(),
        }
    }
}
