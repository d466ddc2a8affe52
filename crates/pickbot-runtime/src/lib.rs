//! `pickbot-runtime` – the pick-and-place controller.
//!
//! # Modules
//!
//! - [`vector`] – [`VectorObservation`][vector::VectorObservation]: lenient
//!   normalisation of one vision observation into `{detected, x, y}`.
//! - [`input_buffer`] – [`InputBuffer`][input_buffer::InputBuffer]: the
//!   latest observation payload and its derived
//!   [`Inputs`][pickbot_types::Inputs], replaced atomically on every update.
//! - [`state_machine`] – [`StateMachine`][state_machine::StateMachine]: the
//!   13-state task controller with failed-pickup escalation.
//! - [`metrics_emitter`] – [`MetricsEmitter`][metrics_emitter::MetricsEmitter]:
//!   throttled gauge lines appended to a file for an external aggregator.
//! - [`push_client`] – [`ControlPushClient`][push_client::ControlPushClient]:
//!   best-effort state push to the actuation service.
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: the
//!   cancellable tick scheduler tying the pieces together.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with optional OTLP export and log file.

pub mod control_loop;
pub mod input_buffer;
pub mod metrics_emitter;
pub mod push_client;
pub mod state_machine;
pub mod telemetry;
pub mod vector;

pub use control_loop::{CancelFlag, ControlLoop, ControllerConfig, LoopOutcome, shutdown};
pub use input_buffer::{AlignmentThresholds, InputBuffer, InputSnapshot};
pub use metrics_emitter::MetricsEmitter;
pub use push_client::{ControlPushClient, PushError};
pub use state_machine::StateMachine;
pub use vector::VectorObservation;
