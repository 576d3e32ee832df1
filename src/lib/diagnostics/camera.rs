use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::json;
use tracing::*;

use diag_api::v1::stats::{CameraResult, FrameStats};

use crate::{
    capabilities::{Capabilities, MediaConstraints, MediaSource, MediaStream, TrackKind},
    error::{DeviceError, Error, Result},
    probe::Probe,
    video::{FrameQualityConfig, FrameQualityMonitor},
};

use super::{CameraCheckConfig, DiagnosticsConfig, ProbeKind};

/// Opens the camera at the configured resolution and watches its frames for
/// black or frozen video.
pub struct CameraProbe {
    config: CameraCheckConfig,
    frame_quality: FrameQualityConfig,
    timeout: Duration,
    media: Arc<dyn MediaSource>,
    stream: Option<Box<dyn MediaStream>>,
    monitor: Option<FrameQualityMonitor>,
}

impl CameraProbe {
    pub fn new(config: &DiagnosticsConfig, capabilities: &Capabilities) -> Self {
        Self {
            config: config.camera,
            frame_quality: config.frame_quality,
            timeout: config.timeout,
            media: capabilities.media.clone(),
            stream: None,
            monitor: None,
        }
    }
}

/// More than a third of the sampled frames.
fn mostly(count: u64, stats: &FrameStats) -> bool {
    count * 3 > stats.num_frames
}

#[async_trait]
impl Probe for CameraProbe {
    fn name(&self) -> &str {
        ProbeKind::Camera.display_name()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&mut self) -> Result<serde_json::Value> {
        let CameraCheckConfig {
            duration_ms,
            width,
            height,
        } = self.config;

        let stream = self
            .stream
            .insert(self.media.acquire(&MediaConstraints::video(width, height)).await?);

        let track = stream
            .track(TrackKind::Video)
            .ok_or_else(|| DeviceError::Unavailable("No video track".to_string()))?;
        if !track.live {
            return Err(Error::check("Video track ended"));
        }
        if !track.enabled || track.muted {
            return Err(Error::check("Camera is muted"));
        }
        if track.width != Some(width) || track.height != Some(height) {
            return Err(Error::check_with_details(
                "Incorrect captured resolution",
                json!({
                    "requested": [width, height],
                    "actual": [track.width, track.height],
                }),
            ));
        }

        let source = stream
            .frame_source()
            .ok_or_else(|| Error::check("Camera track has no frames to sample"))?;
        info!("Sampling frames of {:?} for {duration_ms} ms", track.label);

        let monitor = self
            .monitor
            .insert(FrameQualityMonitor::new(source, self.frame_quality));
        monitor.start();
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        let frame_stats = monitor.stop();

        let result = CameraResult {
            track_label: track.label,
            requested_width: width,
            requested_height: height,
            actual_width: track.width,
            actual_height: track.height,
            frame_stats,
        };

        if frame_stats.num_frames == 0 {
            return Err(Error::check_with_details("No frames were sampled", &result));
        }
        if mostly(frame_stats.num_black_frames, &frame_stats) {
            return Err(Error::check_with_details(
                "Camera delivered mostly black frames",
                &result,
            ));
        }
        if mostly(frame_stats.num_frozen_frames, &frame_stats) {
            return Err(Error::check_with_details(
                "Camera delivered mostly frozen frames",
                &result,
            ));
        }

        serde_json::to_value(&result).map_err(|error| Error::check(error.to_string()))
    }

    fn release(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}
