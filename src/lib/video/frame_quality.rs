use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::*;

use diag_api::v1::stats::FrameStats;

use crate::capabilities::frame::{luma, FrameSource, PixelBuffer};

use super::ssim::ssim;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameQualityConfig {
    pub sample_interval_ms: u64,
    /// Average luma a frame must exceed to not be considered black.
    pub non_black_pixel_luma_threshold: f64,
    /// SSIM against the previous frame above which a frame counts as frozen.
    pub identical_frame_ssim_threshold: f64,
}

impl Default for FrameQualityConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 20,
            non_black_pixel_luma_threshold: 20.0,
            identical_frame_ssim_threshold: 0.985,
        }
    }
}

/// `true` unless the running luma average of the scanned pixels rises above
/// `threshold` at some point of the scan.
pub fn is_black_frame(frame: &PixelBuffer, threshold: f64) -> bool {
    let mut accumulated_luma = 0.0;
    for (scanned, pixel) in frame.pixels().enumerate() {
        accumulated_luma += luma(pixel);
        // Bright enough so far, no need to look at the rest.
        if accumulated_luma > threshold * (scanned + 1) as f64 {
            return false;
        }
    }
    true
}

/// Classifies a sequence of frames as black and/or frozen.
#[derive(Debug)]
pub struct FrameAnalyzer {
    config: FrameQualityConfig,
    previous_luma: Option<Vec<f64>>,
    stats: FrameStats,
}

impl FrameAnalyzer {
    pub fn new(config: FrameQualityConfig) -> Self {
        Self {
            config,
            previous_luma: None,
            stats: FrameStats::default(),
        }
    }

    pub fn analyze(&mut self, frame: &PixelBuffer) {
        if is_black_frame(frame, self.config.non_black_pixel_luma_threshold) {
            self.stats.num_black_frames += 1;
        }

        let current_luma = frame.luma();
        let similarity = self
            .previous_luma
            .as_deref()
            .map(|previous| ssim(previous, &current_luma))
            .unwrap_or(0.0);
        if similarity > self.config.identical_frame_ssim_threshold {
            self.stats.num_frozen_frames += 1;
        }

        self.previous_luma = Some(current_luma);
        self.stats.num_frames += 1;
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}

/// Samples a [`FrameSource`] on a fixed cadence and keeps [`FrameStats`].
///
/// Each tick is processed completely before the next one is scheduled. The
/// monitor can be started and stopped any number of times; its counters
/// survive a stop and only a new monitor starts from zero. Sampling never ends
/// by itself while the source is active.
pub struct FrameQualityMonitor {
    config: FrameQualityConfig,
    source: Arc<Mutex<Box<dyn FrameSource>>>,
    analyzer: Arc<Mutex<FrameAnalyzer>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for FrameQualityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQualityMonitor")
            .field("config", &self.config)
            .field("analyzer", &self.analyzer)
            .field("running", &self.is_running())
            .finish()
    }
}

impl FrameQualityMonitor {
    pub fn new(source: Box<dyn FrameSource>, config: FrameQualityConfig) -> Self {
        Self {
            config,
            source: Arc::new(Mutex::new(source)),
            analyzer: Arc::new(Mutex::new(FrameAnalyzer::new(config))),
            task: None,
        }
    }

    /// Starts, or resumes, sampling. Does nothing while already running.
    #[instrument(level = "debug", skip(self))]
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let interval = Duration::from_millis(self.config.sample_interval_ms);
        let source = self.source.clone();
        let analyzer = self.analyzer.clone();

        self.task = Some(tokio::spawn(async move {
            loop {
                let frame = {
                    let mut source = source.lock().unwrap();
                    if !source.is_active() {
                        break;
                    }
                    source.current_frame()
                };
                if let Some(frame) = frame {
                    analyzer.lock().unwrap().analyze(&frame);
                }
                tokio::time::sleep(interval).await;
            }
            debug!("Frame source ended");
        }));
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.analyzer.lock().unwrap().stats()
    }

    /// Pauses sampling and returns the counters so far. Idempotent.
    pub fn stop(&mut self) -> FrameStats {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.frame_stats()
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for FrameQualityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
