//! A probe is a single diagnostic: it runs once, settles exactly once, and
//! releases whatever it acquired when destroyed.

pub mod state;
pub mod task;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use state::{IllegalTransition, Outcome, ProbeState, Settlement};
pub use task::ProbeTask;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(45_000);

#[async_trait]
pub trait Probe: Send {
    fn name(&self) -> &str;

    /// Wall-clock budget for [`Probe::run`].
    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Do the work. The future may be dropped at any await point when the
    /// probe times out or the suite is stopped.
    async fn run(&mut self) -> Result<serde_json::Value>;

    /// Release held resources (media tracks, peer links). Called exactly once
    /// by [`ProbeTask::destroy`], possibly without `run` ever being called or
    /// after `run` was cancelled.
    fn release(&mut self) {}
}
