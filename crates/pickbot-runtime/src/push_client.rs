//! [`ControlPushClient`] – best-effort state push to the actuation service.
//!
//! Every transition is POSTed as `{"state": "<label>"}`.  The request is
//! bounded by a short timeout and any failure is logged and dropped; the
//! next transition simply pushes again.

use std::time::Duration;

use pickbot_types::State;
use thiserror::Error;
use tracing::{debug, warn};

/// Default request timeout.
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Failure of a single push attempt.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ControlPushClient {
    url: String,
    client: reqwest::Client,
}

impl ControlPushClient {
    /// Build a client posting to `base_url` joined with `state_path`.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Http`] if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, state_path: &str, timeout: Duration) -> Result<Self, PushError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: join_url(base_url, state_path),
            client,
        })
    }

    /// The full endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push `state`, swallowing any failure.
    pub async fn send_state(&self, state: State) {
        match self.try_send_state(state).await {
            Ok(()) => debug!(url = %self.url, state = %state, "state pushed"),
            Err(e) => warn!(url = %self.url, state = %state, error = %e, "state push failed"),
        }
    }

    /// Push `state` and report the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Http`] on connection failure, timeout, or a
    /// non-success status.
    pub async fn try_send_state(&self, state: State) -> Result<(), PushError> {
        self.client
            .post(&self.url)
            .json(&serde_json::json!({ "state": state.as_str() }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
