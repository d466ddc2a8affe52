//! [`ControlLoop`] – the cooperative scheduler that drives the controller.
//!
//! Each tick:
//!
//! 1. **Snapshot** the [`InputBuffer`].
//! 2. **Step** the [`StateMachine`].
//! 3. **Push** the new state through the [`ControlPushClient`] when a
//!    transition fired.
//! 4. **Emit** throttled metrics.
//! 5. **Sleep** for the tick interval.
//!
//! The loop exits when the machine reaches [`State::End`] or when the
//! [`CancelFlag`] is observed at a tick boundary.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pickbot_runtime::{CancelFlag, ControlLoop, ControllerConfig, InputBuffer};
//!
//! # async fn run() {
//! let config = ControllerConfig::default();
//! let inputs = Arc::new(InputBuffer::new(config.thresholds()));
//! let cancel = CancelFlag::new();
//! let handle = ControlLoop::from_config(&config, inputs).spawn(cancel.clone());
//! cancel.cancel();
//! let _outcome = handle.await;
//! # }
//! ```

use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use pickbot_types::{State, StateContext};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::input_buffer::{AlignmentThresholds, InputBuffer};
use crate::metrics_emitter::MetricsEmitter;
use crate::push_client::ControlPushClient;
use crate::state_machine::StateMachine;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// The `[controller]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Ingress listening port.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_target_align_threshold")]
    pub target_align_threshold: f64,
    #[serde(default = "default_place_align_threshold")]
    pub place_align_threshold: f64,
    #[serde(default = "default_failed_pickup_limit")]
    pub failed_pickup_limit: u32,
    /// Gauge file path; empty disables emission.
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    #[serde(default = "default_metrics_interval_ms")]
    pub metrics_interval_ms: u64,
    /// Actuation service base URL; empty disables state pushes.
    #[serde(default)]
    pub control_base_url: String,
    #[serde(default = "default_control_state_path")]
    pub control_state_path: String,
    #[serde(default = "default_push_timeout_ms")]
    pub push_timeout_ms: u64,
    /// How long shutdown waits for the loop to finish its current tick.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_port() -> u16 {
    8000
}
fn default_tick_interval_ms() -> u64 {
    200
}
fn default_target_align_threshold() -> f64 {
    0.15
}
fn default_place_align_threshold() -> f64 {
    0.2
}
fn default_failed_pickup_limit() -> u32 {
    crate::state_machine::DEFAULT_FAILED_PICKUP_LIMIT
}
fn default_metrics_path() -> String {
    "/var/run/metrics/metrics.prom".to_string()
}
fn default_metrics_interval_ms() -> u64 {
    1000
}
fn default_control_state_path() -> String {
    "/state".to_string()
}
fn default_push_timeout_ms() -> u64 {
    500
}
fn default_shutdown_grace_ms() -> u64 {
    2000
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            tick_interval_ms: default_tick_interval_ms(),
            target_align_threshold: default_target_align_threshold(),
            place_align_threshold: default_place_align_threshold(),
            failed_pickup_limit: default_failed_pickup_limit(),
            metrics_path: default_metrics_path(),
            metrics_interval_ms: default_metrics_interval_ms(),
            control_base_url: String::new(),
            control_state_path: default_control_state_path(),
            push_timeout_ms: default_push_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl ControllerConfig {
    pub fn thresholds(&self) -> AlignmentThresholds {
        AlignmentThresholds {
            target: self.target_align_threshold,
            place: self.place_align_threshold,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// `None` when the path is blank.
    pub fn metrics_path(&self) -> Option<PathBuf> {
        let trimmed = self.metrics_path.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    }

    /// Build the push client, or `None` when no base URL is configured or
    /// the client cannot be constructed.
    pub fn push_client(&self) -> Option<ControlPushClient> {
        let base = self.control_base_url.trim();
        if base.is_empty() {
            return None;
        }
        match ControlPushClient::new(
            base,
            &self.control_state_path,
            Duration::from_millis(self.push_timeout_ms),
        ) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "state push disabled: client construction failed");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

/// Shared stop signal checked once per tick.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

/// Final state of a finished loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub state: State,
    pub context: StateContext,
    /// `true` when the loop stopped on cancellation rather than reaching `end`.
    pub cancelled: bool,
}

pub struct ControlLoop {
    machine: StateMachine,
    inputs: Arc<InputBuffer>,
    metrics: MetricsEmitter,
    push: Option<ControlPushClient>,
    tick_interval: Duration,
}

impl ControlLoop {
    pub fn new(
        machine: StateMachine,
        inputs: Arc<InputBuffer>,
        metrics: MetricsEmitter,
        push: Option<ControlPushClient>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            machine,
            inputs,
            metrics,
            push,
            tick_interval,
        }
    }

    /// Wire a loop from the `[controller]` section.
    pub fn from_config(config: &ControllerConfig, inputs: Arc<InputBuffer>) -> Self {
        Self::new(
            StateMachine::new(config.failed_pickup_limit),
            inputs,
            MetricsEmitter::new(
                config.metrics_path(),
                Duration::from_millis(config.metrics_interval_ms),
            ),
            config.push_client(),
            config.tick_interval(),
        )
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Run one tick without sleeping.  Returns the new state when a
    /// transition fired.
    #[instrument(name = "control_tick", skip_all, fields(state = %self.machine.state()))]
    pub async fn tick(&mut self) -> Option<State> {
        let snapshot = self.inputs.snapshot();
        let transition = self.machine.step(&snapshot.inputs);

        if let Some(t) = transition {
            info!(
                event = "state_transition",
                from = %t.source,
                to = %t.target,
                label = t.label,
                failed_pickups = self.machine.context().failed_pickups,
            );
            if let Some(push) = &self.push {
                push.send_state(t.target).await;
            }
        }

        self.metrics.emit(self.machine.state(), self.machine.context());
        transition.map(|t| t.target)
    }

    /// Drive ticks until `end` or cancellation.
    pub async fn run(mut self, cancel: CancelFlag) -> LoopOutcome {
        info!(event = "state_machine_started", state = %self.machine.state());

        let mut cancelled = false;
        while !self.machine.state().is_terminal() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.tick().await;
            if self.machine.state().is_terminal() {
                break;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            tokio::time::sleep(self.tick_interval).await;
        }

        let context = self.machine.context().clone();
        info!(
            event = "state_machine_completed",
            state = %self.machine.state(),
            transitions = context.transition_count,
            cancelled,
        );
        LoopOutcome {
            state: self.machine.state(),
            context,
            cancelled,
        }
    }

    /// Run on a Tokio task.
    pub fn spawn(self, cancel: CancelFlag) -> JoinHandle<LoopOutcome> {
        tokio::spawn(self.run(cancel))
    }
}

/// Cancel the loop and wait up to `grace` for it to finish.
///
/// Returns the outcome, or `None` when the loop did not stop in time (the
/// task is then aborted) or panicked.
pub async fn shutdown(
    cancel: &CancelFlag,
    handle: JoinHandle<LoopOutcome>,
    grace: Duration,
) -> Option<LoopOutcome> {
    cancel.cancel();
    let abort = handle.abort_handle();
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(outcome)) => Some(outcome),
        Ok(Err(e)) => {
            warn!(error = %e, "control loop task failed");
            None
        }
        Err(_) => {
            warn!(grace_ms = grace.as_millis() as u64, "control loop did not stop in time");
            abort.abort();
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quick_loop(inputs: Arc<InputBuffer>, metrics: MetricsEmitter) -> ControlLoop {
        ControlLoop::new(
            StateMachine::default(),
            inputs,
            metrics,
            None,
            Duration::from_millis(5),
        )
    }

    #[test]
    fn config_defaults() {
        let cfg = ControllerConfig::default();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.tick_interval(), Duration::from_millis(200));
        assert_eq!(cfg.thresholds(), AlignmentThresholds::default());
        assert_eq!(cfg.failed_pickup_limit, 3);
        assert_eq!(
            cfg.metrics_path(),
            Some(PathBuf::from("/var/run/metrics/metrics.prom"))
        );
        assert!(cfg.push_client().is_none());
    }

    #[test]
    fn blank_metrics_path_disables_emission() {
        let cfg = ControllerConfig {
            metrics_path: "  ".to_string(),
            ..ControllerConfig::default()
        };
        assert!(cfg.metrics_path().is_none());
    }

    #[test]
    fn push_client_joins_configured_url() {
        let cfg = ControllerConfig {
            control_base_url: "http://actuation:5000/".to_string(),
            ..ControllerConfig::default()
        };
        assert_eq!(cfg.push_client().unwrap().url(), "http://actuation:5000/state");
    }

    #[tokio::test]
    async fn tick_steps_on_latest_snapshot() {
        let inputs = Arc::new(InputBuffer::default());
        let mut control = quick_loop(Arc::clone(&inputs), MetricsEmitter::disabled());

        assert_eq!(control.tick().await, None);
        inputs.update(json!({"target": {"detected": true}}));
        assert_eq!(control.tick().await, Some(State::FindTarget));
        assert_eq!(control.tick().await, Some(State::AlignForRetrieve));
        assert_eq!(control.machine().context().transition_count, 2);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let inputs = Arc::new(InputBuffer::default());
        let cancel = CancelFlag::new();
        let handle = quick_loop(inputs, MetricsEmitter::disabled()).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let outcome = shutdown(&cancel, handle, Duration::from_secs(2)).await.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.state, State::Searching);
    }

    #[tokio::test]
    async fn run_exits_at_end() {
        let inputs = Arc::new(InputBuffer::default());
        let mut control = quick_loop(Arc::clone(&inputs), MetricsEmitter::disabled());
        // Drive straight to `return_home`, then let the loop finish.
        for payload in [
            json!({"target": {"detected": true}}),
            json!({"target": {"detected": true}}),
            json!({"retrieving": true}),
            json!({"pick_up_success": true}),
            json!({}),
            json!({"safe_zone": {"detected": true}}),
            json!({"placing": true}),
            json!({"place_success": true}),
            json!({}),
        ] {
            inputs.update(payload);
            control.tick().await;
        }
        assert_eq!(control.machine().state(), State::ReturnHome);

        inputs.update(json!({"at_home": true}));
        let outcome = tokio::time::timeout(Duration::from_secs(2), control.run(CancelFlag::new()))
            .await
            .unwrap();
        assert_eq!(outcome.state, State::End);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.context.transition_count, 10);
    }

    #[tokio::test]
    async fn loop_writes_metrics_every_tick_when_unthrottled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.prom");
        let inputs = Arc::new(InputBuffer::default());
        let mut control = quick_loop(inputs, MetricsEmitter::new(Some(path.clone()), Duration::ZERO));

        control.tick().await;
        control.tick().await;
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("state_machine_state{state=\"searching\"} 1").count(), 2);
    }

    #[tokio::test]
    async fn unreachable_push_endpoint_does_not_stall_the_loop() {
        let inputs = Arc::new(InputBuffer::default());
        let push =
            ControlPushClient::new("http://127.0.0.1:9", "/state", Duration::from_millis(100)).unwrap();
        let mut control = ControlLoop::new(
            StateMachine::default(),
            Arc::clone(&inputs),
            MetricsEmitter::disabled(),
            Some(push),
            Duration::from_millis(5),
        );
        inputs.update(json!({"target": {"detected": true}}));
        let stepped = tokio::time::timeout(Duration::from_secs(2), control.tick())
            .await
            .unwrap();
        assert_eq!(stepped, Some(State::FindTarget));
    }

    #[tokio::test]
    async fn shutdown_aborts_a_loop_that_overruns_the_grace() {
        // Accepts connections through the backlog but never answers.
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", silent.local_addr().unwrap());
        let push = ControlPushClient::new(&base, "/state", Duration::from_secs(30)).unwrap();

        let inputs = Arc::new(InputBuffer::default());
        inputs.update(json!({"target": {"detected": true}}));
        let control = ControlLoop::new(
            StateMachine::default(),
            inputs,
            MetricsEmitter::disabled(),
            Some(push),
            Duration::from_millis(5),
        );
        let cancel = CancelFlag::new();
        let handle = control.spawn(cancel.clone());
        let abort = handle.abort_handle();

        // Let the first tick block on the push.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let grace = Duration::from_millis(100);
        let started = std::time::Instant::now();
        let outcome = shutdown(&cancel, handle, grace).await;
        let waited = started.elapsed();

        assert!(outcome.is_none());
        assert!(cancel.is_cancelled());
        assert!(waited >= grace, "returned after {waited:?}");
        assert!(waited < Duration::from_secs(2), "returned after {waited:?}");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(abort.is_finished());
    }

    #[tokio::test]
    async fn tick_runs_inside_control_tick_span() {
        use std::sync::Mutex;
        use tracing::span::{Attributes, Id};
        use tracing_subscriber::Layer;
        use tracing_subscriber::layer::{Context, SubscriberExt};

        struct SpanNames(Arc<Mutex<Vec<&'static str>>>);

        impl<S: tracing::Subscriber> Layer<S> for SpanNames {
            fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
                self.0.lock().unwrap().push(attrs.metadata().name());
            }
        }

        let names = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(SpanNames(Arc::clone(&names)));
        let _default = tracing::subscriber::set_default(subscriber);

        let mut control = quick_loop(Arc::new(InputBuffer::default()), MetricsEmitter::disabled());
        control.tick().await;
        control.tick().await;
        assert_eq!(*names.lock().unwrap(), vec!["control_tick", "control_tick"]);
    }
}
