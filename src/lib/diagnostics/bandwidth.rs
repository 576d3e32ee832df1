use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::*;

use crate::{
    bandwidth::{BandwidthConfig, BandwidthSampler},
    capabilities::{
        Capabilities, IceServer, MediaConstraints, MediaSource, MediaStream, PeerLink,
        PeerLinkConfig, PeerLinkFactory, TrackKind,
    },
    error::{DeviceError, Error, Result},
    probe::Probe,
};

use super::{DiagnosticsConfig, ProbeKind};

/// Sends one local track over a loopback peer link and samples its stats
/// for the configured duration.
pub struct BandwidthProbe {
    kind: ProbeKind,
    track_kind: TrackKind,
    constraints: MediaConstraints,
    config: BandwidthConfig,
    ice_servers: Vec<IceServer>,
    timeout: Duration,
    media: Arc<dyn MediaSource>,
    peers: Arc<dyn PeerLinkFactory>,
    stream: Option<Box<dyn MediaStream>>,
    link: Option<Box<dyn PeerLink>>,
}

impl BandwidthProbe {
    pub fn audio(config: &DiagnosticsConfig, capabilities: &Capabilities) -> Self {
        Self::new(
            ProbeKind::AudioBandwidth,
            TrackKind::Audio,
            MediaConstraints::audio(),
            config.audio_bandwidth,
            config,
            capabilities,
        )
    }

    pub fn video(config: &DiagnosticsConfig, capabilities: &Capabilities) -> Self {
        Self::new(
            ProbeKind::VideoBandwidth,
            TrackKind::Video,
            MediaConstraints::video(config.camera.width, config.camera.height),
            config.video_bandwidth,
            config,
            capabilities,
        )
    }

    fn new(
        kind: ProbeKind,
        track_kind: TrackKind,
        constraints: MediaConstraints,
        bandwidth: BandwidthConfig,
        config: &DiagnosticsConfig,
        capabilities: &Capabilities,
    ) -> Self {
        Self {
            kind,
            track_kind,
            constraints,
            config: bandwidth,
            ice_servers: config.ice_servers.clone(),
            timeout: config.timeout,
            media: capabilities.media.clone(),
            peers: capabilities.peers.clone(),
            stream: None,
            link: None,
        }
    }
}

#[async_trait]
impl Probe for BandwidthProbe {
    fn name(&self) -> &str {
        self.kind.display_name()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&mut self) -> Result<serde_json::Value> {
        if self.ice_servers.is_empty() {
            return Err(Error::Connectivity("No ICE servers configured".to_string()));
        }

        let stream = self
            .stream
            .insert(self.media.acquire(&self.constraints).await?);
        let track = stream.track(self.track_kind).ok_or_else(|| {
            DeviceError::Unavailable(format!("No {:?} track", self.track_kind).to_lowercase())
        })?;

        let link = self.link.insert(self.peers.create(&PeerLinkConfig {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        })?);
        link.add_track(&track)?;
        link.negotiate().await?;

        info!(
            "Sampling {:?} bandwidth for {} ms, target {} kbps",
            track.label, self.config.duration_ms, self.config.max_bitrate_kbps
        );
        let result = BandwidthSampler::new(self.config).run(&mut **link).await;

        if result.samples == 0 {
            return Err(Error::check_with_details(
                "No bandwidth samples collected",
                &result,
            ));
        }

        serde_json::to_value(&result).map_err(|error| Error::check(error.to_string()))
    }

    fn release(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}
