//! [`MetricsEmitter`] – throttled gauge lines for the controller state.
//!
//! Each emission appends three lines to a well-known file, which an external
//! aggregator tails:
//!
//! ```text
//! state_machine_state{state="find_target"} 1
//! state_machine_failed_pickups 0
//! state_machine_transitions_total 1
//! ```
//!
//! Write failures are logged at `debug` and otherwise ignored.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use pickbot_types::{State, StateContext};
use tracing::debug;

/// Default minimum interval between two emissions.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct MetricsEmitter {
    path: Option<PathBuf>,
    min_interval: Duration,
    last_emit: Option<Instant>,
}

impl MetricsEmitter {
    /// `path = None` disables emission entirely.
    pub fn new(path: Option<PathBuf>, min_interval: Duration) -> Self {
        Self {
            path,
            min_interval,
            last_emit: None,
        }
    }

    /// A disabled emitter.
    pub fn disabled() -> Self {
        Self::new(None, DEFAULT_METRICS_INTERVAL)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append the current gauges unless the previous emission was less than
    /// `min_interval` ago.  Returns `true` when lines were written.
    pub fn emit(&mut self, state: State, context: &StateContext) -> bool {
        let Some(path) = self.path.as_deref() else {
            return false;
        };
        let now = Instant::now();
        if self
            .last_emit
            .is_some_and(|last| now.duration_since(last) < self.min_interval)
        {
            return false;
        }
        self.last_emit = Some(now);

        match append(path, &render(state, context)) {
            Ok(()) => true,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "metrics write failed");
                false
            }
        }
    }
}

/// The gauge lines for one emission, newline terminated.
pub fn render(state: State, context: &StateContext) -> String {
    format!(
        "state_machine_state{{state=\"{state}\"}} 1\n\
         state_machine_failed_pickups {}\n\
         state_machine_transitions_total {}\n",
        context.failed_pickups, context.transition_count
    )
}

fn append(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())
}
