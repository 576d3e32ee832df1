use std::time::Duration;

use tracing::*;

use crate::error::{Error, Result};

use super::{
    state::{ProbeState, Settlement},
    Probe,
};

/// Lifecycle wrapper around a [`Probe`]: `Idle -> Running -> settled`, with
/// the timeout race and the one-shot settlement.
pub struct ProbeTask {
    name: String,
    probe: Box<dyn Probe>,
    state: ProbeState,
    settlement: Settlement,
    timeout: Duration,
    destroyed: bool,
}

impl std::fmt::Debug for ProbeTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeTask")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("timeout", &self.timeout)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl ProbeTask {
    pub fn new(probe: Box<dyn Probe>) -> Self {
        Self {
            name: probe.name().to_string(),
            timeout: probe.timeout(),
            probe,
            state: ProbeState::Idle,
            settlement: Settlement::default(),
            destroyed: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn settlement(&self) -> &Settlement {
        &self.settlement
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Runs the probe against its timeout and returns the settled outcome.
    ///
    /// Calling `start` again returns the same outcome without running the
    /// probe a second time.
    pub async fn start(&mut self) -> Result<serde_json::Value> {
        if let Some(result) = self.settlement.result() {
            return result;
        }
        if self.destroyed {
            return Err(Error::Stopped);
        }
        if let Err(error) = self.state.transition(ProbeState::Running) {
            warn!("{error}");
            return Err(Error::check(error.to_string()));
        }

        let span = info_span!("probe", name = %self.name);
        let timeout_ms = self.timeout.as_millis() as u64;
        let outcome = tokio::time::timeout(self.timeout, self.probe.run())
            .instrument(span)
            .await;

        match outcome {
            Ok(Ok(results)) => {
                self.resolve(results);
            }
            Ok(Err(error)) => {
                self.reject(error);
            }
            Err(_elapsed) => {
                warn!("Test {:?} timed out after {timeout_ms} ms", self.name);
                self.reject(Error::TestTimeout { timeout_ms });
            }
        }

        self.settlement
            .result()
            .unwrap_or_else(|| Err(Error::check("probe did not settle")))
    }

    /// Accepted only once, and only while running.
    pub fn resolve(&mut self, results: serde_json::Value) -> bool {
        self.settle(ProbeState::Resolved, |settlement| settlement.resolve(results))
    }

    /// Accepted only once, and only while running. A [`Error::TestTimeout`]
    /// moves the probe to [`ProbeState::TimedOut`].
    pub fn reject(&mut self, error: Error) -> bool {
        let next = if error.is_timeout() {
            ProbeState::TimedOut
        } else {
            ProbeState::Rejected
        };
        self.settle(next, |settlement| settlement.reject(error))
    }

    fn settle(&mut self, next: ProbeState, apply: impl FnOnce(&mut Settlement) -> bool) -> bool {
        if !self.state.can_transition_to(next) {
            debug!(
                "Ignoring settlement of {:?} in state {:?}",
                self.name, self.state
            );
            return false;
        }
        if !apply(&mut self.settlement) {
            return false;
        }
        self.state = next;
        true
    }

    /// Releases the probe's resources. Safe from any state and idempotent;
    /// does not alter the settlement.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        debug!("Destroying test {:?} in state {:?}", self.name, self.state);
        self.probe.release();
    }
}

impl Drop for ProbeTask {
    fn drop(&mut self) {
        self.destroy();
    }
}
