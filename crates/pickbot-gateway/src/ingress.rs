//! [`IngressRouter`] – the controller API fed by the vision pipeline.
//!
//! | Method | Path | Response |
//! |---|---|---|
//! | `GET` | `/health` | `{status:"ok"}` |
//! | `GET` | `/inputs` | `{inputs, payload, updated_at}` |
//! | `POST` | `/inputs` | `{status:"ok", inputs}` |
//!
//! `POST /inputs` never fails: a body that is not a JSON object is treated as
//! an empty payload.

use std::sync::Arc;

use pickbot_runtime::InputBuffer;
use serde_json::{Map, Value, json};
use tracing::info;

use crate::http::{Request, Response};
use crate::server::Router;

pub struct IngressRouter {
    inputs: Arc<InputBuffer>,
}

impl IngressRouter {
    pub fn new(inputs: Arc<InputBuffer>) -> Self {
        Self { inputs }
    }

    fn get_inputs(&self) -> Response {
        Response::json(200, &self.inputs.snapshot())
    }

    fn post_inputs(&self, request: &Request) -> Response {
        let payload = request
            .json()
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(Map::new()));
        let inputs = self.inputs.update(payload);
        info!(
            event = "inputs_received",
            lego_detected = inputs.lego_detected,
            safe_zone_detected = inputs.safe_zone_detected,
            danger_zone_detected = inputs.danger_zone_detected,
            aligned_for_retrieve = inputs.aligned_for_retrieve,
            aligned_for_place = inputs.aligned_for_place,
        );
        Response::json(200, &json!({ "status": "ok", "inputs": inputs }))
    }
}

impl Router for IngressRouter {
    fn handle(&self, request: &Request) -> Response {
        match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/health") => Response::json(200, &json!({ "status": "ok" })),
            ("GET", "/inputs") => self.get_inputs(),
            ("POST", "/inputs") => self.post_inputs(request),
            (_, "/health" | "/inputs") => Response::method_not_allowed(),
            _ => Response::not_found(),
        }
    }
}
