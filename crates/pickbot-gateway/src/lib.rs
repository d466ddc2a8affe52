//! `pickbot-gateway` – the HTTP surfaces of the pick-and-place stack.
//!
//! Two routers share one small HTTP/1.1 server built directly on
//! `tokio::net`:
//!
//! 1. **Controller ingress** ([`IngressRouter`], default port `8000`) takes
//!    observation payloads from the vision pipeline and exposes the buffered
//!    inputs.
//!
//! 2. **Actuation** ([`ActuationRouter`], default port `5000`) validates and
//!    applies PID gains and motion commands through the HAL stores, records
//!    the state pushed by the controller, and serves text metrics.
//!
//! # Usage
//!
//! ```rust,no_run
//! use pickbot_gateway::{ActuationRouter, HttpServer};
//! use pickbot_hal::HalBackend;
//! use pickbot_types::PidGains;
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = ActuationRouter::new(HalBackend::mock(PidGains::default()));
//!     HttpServer::new("actuation", router)
//!         .with_port(5000)
//!         .run(std::future::pending())
//!         .await
//!         .expect("actuation API failed");
//! }
//! ```

pub mod actuation;
pub mod exposition;
pub mod http;
pub mod ingress;
pub mod server;

pub use actuation::{ActuationRouter, ReportedState};
pub use exposition::ActuationMetrics;
pub use http::{HttpError, Request, Response};
pub use ingress::IngressRouter;
pub use server::{HttpServer, Router, serve};
