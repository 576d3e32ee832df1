//! Sequential runner for a queue of probes.
//!
//! Probes run strictly one after another in insertion order. Every outcome is
//! recorded in the report; a failure either stops the drain
//! (`stop_on_failure`) or is tolerated. A [`TestSuite`] is itself a
//! [`Probe`], so suites can be nested.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::*;

use diag_api::v1::report::{Report, ReportEntry};

use crate::{
    error::{Error, Result},
    probe::{Probe, ProbeTask},
};

/// Slack added per child to a nested suite's timeout, so the children's own
/// timers always fire before the parent's.
pub const NESTED_TIMEOUT_MARGIN: Duration = Duration::from_millis(100);

/// Cancels a running [`TestSuite`] from the outside (e.g. on shutdown).
#[derive(Debug, Clone)]
pub struct StopHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }
}

#[derive(Debug)]
pub struct TestSuite {
    name: String,
    queue: VecDeque<ProbeTask>,
    active: Option<ProbeTask>,
    stop_on_failure: bool,
    report: Report,
    running: bool,
    finished: bool,
    stop_sender: Arc<watch::Sender<bool>>,
    stop_receiver: watch::Receiver<bool>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        let (stop_sender, stop_receiver) = watch::channel(false);
        Self {
            name: name.into(),
            queue: VecDeque::new(),
            active: None,
            stop_on_failure: false,
            report: Report::default(),
            running: false,
            finished: false,
            stop_sender: Arc::new(stop_sender),
            stop_receiver,
        }
    }

    pub fn stop_on_failure(mut self, stop_on_failure: bool) -> Self {
        self.stop_on_failure = stop_on_failure;
        self
    }

    pub fn add_test(&mut self, probe: impl Probe + 'static) {
        self.add_task(ProbeTask::new(Box::new(probe)));
    }

    pub fn add_task(&mut self, task: ProbeTask) {
        self.queue.push_back(task);
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            sender: self.stop_sender.clone(),
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Drains the queue.
    ///
    /// Resolves with the report when every probe passed, otherwise rejects
    /// with [`Error::SuiteFailure`] carrying the same report. A suite runs only
    /// once; later calls return the outcome of the first run.
    #[instrument(level = "debug", skip(self), fields(suite = %self.name))]
    pub async fn start(&mut self) -> Result<Report> {
        if self.finished {
            return self.outcome();
        }

        self.running = true;
        info!("Starting {} test(s)", self.queue.len());

        while let Some(task) = self.queue.pop_front() {
            let task = self.active.insert(task);
            let name = task.name().to_string();
            info!("Running test {name:?}");

            let mut stop_receiver = self.stop_receiver.clone();
            let outcome = tokio::select! {
                biased;
                _ = stop_requested(&mut stop_receiver) => None,
                outcome = task.start() => Some(outcome),
            };

            let Some(outcome) = outcome else {
                warn!("Stopped while running test {name:?}");
                self.report
                    .push(ReportEntry::failed(&name, Error::Stopped.to_string(), None));
                self.stop_all_tests();
                break;
            };

            let failed = match outcome {
                Ok(results) => {
                    info!("Test {name:?} passed");
                    self.report.push(ReportEntry::passed(&name, results));
                    false
                }
                Err(error) => {
                    warn!("Test {name:?} failed: {error}");
                    self.report
                        .push(ReportEntry::failed(&name, error.to_string(), error.details()));
                    true
                }
            };

            if let Some(mut task) = self.active.take() {
                task.destroy();
            }

            if failed && self.stop_on_failure {
                warn!(
                    "Stopping after failure of {name:?}, {} test(s) not run",
                    self.queue.len()
                );
                break;
            }
        }

        self.running = false;
        self.finished = true;
        info!(
            "Finished with {} of {} test(s) failed",
            self.report.failed_count(),
            self.report.len()
        );

        self.outcome()
    }

    fn outcome(&self) -> Result<Report> {
        let failed = self.report.failed_count();
        if failed == 0 {
            return Ok(self.report.clone());
        }
        Err(Error::SuiteFailure {
            failed,
            report: self.report.clone(),
        })
    }

    /// Destroys the active probe and every queued one without running them.
    pub fn stop_all_tests(&mut self) {
        self.stop_sender.send_replace(true);

        if let Some(mut active) = self.active.take() {
            active.destroy();
        }
        if !self.queue.is_empty() {
            debug!("Discarding {} queued test(s)", self.queue.len());
        }
        for mut task in self.queue.drain(..) {
            task.destroy();
        }
    }
}

async fn stop_requested(receiver: &mut watch::Receiver<bool>) {
    if receiver.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[async_trait]
impl Probe for TestSuite {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.queue
            .iter()
            .map(|task| task.timeout() + NESTED_TIMEOUT_MARGIN)
            .sum()
    }

    async fn run(&mut self) -> Result<serde_json::Value> {
        let report = self.start().await?;
        serde_json::to_value(&report).map_err(|error| Error::check(error.to_string()))
    }

    fn release(&mut self) {
        self.stop_all_tests();
    }
}
