use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::*;

use diag_api::v1::stats::MicrophoneResult;

use crate::{
    capabilities::{Capabilities, MediaConstraints, MediaSource, MediaStream, TrackKind},
    error::{DeviceError, Error, Result},
    probe::Probe,
};

use super::{DiagnosticsConfig, MicrophoneCheckConfig, ProbeKind};

/// Floor reported for digital silence instead of negative infinity.
const MIN_DBFS: f64 = -100.0;

#[derive(Debug, Default, Clone, Copy)]
struct AudioLevels {
    samples: u64,
    sum_of_squares: f64,
    peak: f64,
}

impl AudioLevels {
    fn add(&mut self, chunk: &[f32]) {
        for sample in chunk {
            let sample = *sample as f64;
            self.sum_of_squares += sample * sample;
            self.peak = self.peak.max(sample.abs());
        }
        self.samples += chunk.len() as u64;
    }

    fn rms(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        (self.sum_of_squares / self.samples as f64).sqrt()
    }

    fn rms_dbfs(&self) -> f64 {
        let rms = self.rms();
        if rms <= 0.0 {
            return MIN_DBFS;
        }
        (20.0 * rms.log10()).max(MIN_DBFS)
    }
}

/// Records the microphone for a while and checks the input is neither silent
/// nor ended.
pub struct MicrophoneProbe {
    config: MicrophoneCheckConfig,
    timeout: Duration,
    media: Arc<dyn MediaSource>,
    stream: Option<Box<dyn MediaStream>>,
}

impl MicrophoneProbe {
    pub fn new(config: &DiagnosticsConfig, capabilities: &Capabilities) -> Self {
        Self {
            config: config.microphone,
            timeout: config.timeout,
            media: capabilities.media.clone(),
            stream: None,
        }
    }
}

#[async_trait]
impl Probe for MicrophoneProbe {
    fn name(&self) -> &str {
        ProbeKind::Microphone.display_name()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&mut self) -> Result<serde_json::Value> {
        let stream = self
            .stream
            .insert(self.media.acquire(&MediaConstraints::audio()).await?);

        let track = stream
            .track(TrackKind::Audio)
            .ok_or_else(|| DeviceError::Unavailable("No audio track".to_string()))?;
        if !track.live {
            return Err(Error::check("Audio track ended"));
        }
        if !track.enabled || track.muted {
            return Err(Error::check("Microphone is muted"));
        }
        info!("Recording from {:?}", track.label);

        let duration = Duration::from_millis(self.config.duration_ms);
        let started = Instant::now();
        let mut levels = AudioLevels::default();
        while started.elapsed() < duration {
            let Some(chunk) = stream.next_audio_chunk().await else {
                warn!("Audio ended after {:?}", started.elapsed());
                break;
            };
            levels.add(&chunk);
        }

        if levels.samples == 0 {
            return Err(Error::check("No audio samples captured"));
        }

        let result = MicrophoneResult {
            track_label: track.label,
            sample_rate: track.sample_rate,
            samples: levels.samples,
            peak_level: levels.peak,
            rms_level: levels.rms(),
            rms_dbfs: levels.rms_dbfs(),
            clipping: levels.peak >= self.config.clipping_threshold,
        };

        if result.rms_dbfs < self.config.silence_threshold_dbfs {
            return Err(Error::check_with_details(
                "Microphone input level is too low",
                &result,
            ));
        }
        if result.clipping {
            warn!("Microphone input is clipping, peak {}", result.peak_level);
        }

        serde_json::to_value(&result).map_err(|error| Error::check(error.to_string()))
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}
