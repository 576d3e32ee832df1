//! The built-in probes and the configuration they are constructed from.

pub mod bandwidth;
pub mod camera;
pub mod connectivity;
pub mod microphone;
pub mod nat_type;

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    bandwidth::BandwidthConfig,
    capabilities::{Capabilities, IceServer, IceTransportPolicy},
    probe::{Probe, ProbeTask, DEFAULT_TIMEOUT},
    suite::TestSuite,
    video::FrameQualityConfig,
};

pub use bandwidth::BandwidthProbe;
pub use camera::CameraProbe;
pub use connectivity::ConnectivityProbe;
pub use microphone::MicrophoneProbe;
pub use nat_type::NatTypeProbe;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrophoneCheckConfig {
    pub duration_ms: u64,
    /// RMS level below which the input counts as silent.
    pub silence_threshold_dbfs: f64,
    /// Absolute sample value at which the input counts as clipping.
    pub clipping_threshold: f64,
}

impl Default for MicrophoneCheckConfig {
    fn default() -> Self {
        Self {
            duration_ms: 2000,
            silence_threshold_dbfs: -60.0,
            clipping_threshold: 0.99,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraCheckConfig {
    pub duration_ms: u64,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraCheckConfig {
    fn default() -> Self {
        Self {
            duration_ms: 3000,
            width: 1280,
            height: 720,
        }
    }
}

/// Everything the built-in probes are parameterized with.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsConfig {
    pub ice_servers: Vec<IceServer>,
    /// Candidates the connectivity check gathers.
    pub ice_transport_policy: IceTransportPolicy,
    pub timeout: Duration,
    pub stop_on_failure: bool,
    pub audio_bandwidth: BandwidthConfig,
    pub video_bandwidth: BandwidthConfig,
    pub frame_quality: FrameQualityConfig,
    pub camera: CameraCheckConfig,
    pub microphone: MicrophoneCheckConfig,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::new("stun:stun.l.google.com:19302")],
            ice_transport_policy: IceTransportPolicy::All,
            timeout: DEFAULT_TIMEOUT,
            stop_on_failure: false,
            audio_bandwidth: BandwidthConfig::new(192.0),
            video_bandwidth: BandwidthConfig::new(2000.0),
            frame_quality: FrameQualityConfig::default(),
            camera: CameraCheckConfig::default(),
            microphone: MicrophoneCheckConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeKind {
    Microphone,
    Camera,
    Connectivity,
    NatType,
    AudioBandwidth,
    VideoBandwidth,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 6] = [
        ProbeKind::Microphone,
        ProbeKind::Camera,
        ProbeKind::Connectivity,
        ProbeKind::NatType,
        ProbeKind::AudioBandwidth,
        ProbeKind::VideoBandwidth,
    ];

    /// Identifier used on the command line.
    pub fn id(&self) -> &'static str {
        match self {
            ProbeKind::Microphone => "microphone",
            ProbeKind::Camera => "camera",
            ProbeKind::Connectivity => "connectivity",
            ProbeKind::NatType => "nat-type",
            ProbeKind::AudioBandwidth => "audio-bandwidth",
            ProbeKind::VideoBandwidth => "video-bandwidth",
        }
    }

    /// Name shown in the report.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProbeKind::Microphone => "Microphone",
            ProbeKind::Camera => "Camera",
            ProbeKind::Connectivity => "Connectivity",
            ProbeKind::NatType => "NAT type",
            ProbeKind::AudioBandwidth => "Audio bandwidth",
            ProbeKind::VideoBandwidth => "Video bandwidth",
        }
    }

    pub fn build(&self, config: &DiagnosticsConfig, capabilities: &Capabilities) -> Box<dyn Probe> {
        match self {
            ProbeKind::Microphone => Box::new(MicrophoneProbe::new(config, capabilities)),
            ProbeKind::Camera => Box::new(CameraProbe::new(config, capabilities)),
            ProbeKind::Connectivity => Box::new(ConnectivityProbe::new(config, capabilities)),
            ProbeKind::NatType => Box::new(NatTypeProbe::new(config, capabilities)),
            ProbeKind::AudioBandwidth => Box::new(BandwidthProbe::audio(config, capabilities)),
            ProbeKind::VideoBandwidth => Box::new(BandwidthProbe::video(config, capabilities)),
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProbeKind::ALL
            .into_iter()
            .find(|kind| kind.id() == s)
            .ok_or_else(|| {
                let known: Vec<_> = ProbeKind::ALL.iter().map(ProbeKind::id).collect();
                format!("Unknown test {s:?}, expected one of {known:?}")
            })
    }
}

/// Queues the given probes, in order, into a new suite.
pub fn build_suite(
    name: &str,
    kinds: &[ProbeKind],
    config: &DiagnosticsConfig,
    capabilities: &Capabilities,
) -> TestSuite {
    let mut suite = TestSuite::new(name).stop_on_failure(config.stop_on_failure);
    for kind in kinds {
        suite.add_task(ProbeTask::new(kind.build(config, capabilities)));
    }
    suite
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::simulated::HostProfile;

    #[test]
    fn kinds_parse_from_their_ids() {
        for kind in ProbeKind::ALL {
            assert_eq!(kind.id().parse::<ProbeKind>(), Ok(kind));
        }
        assert!("speaker".parse::<ProbeKind>().is_err());
    }

    #[test]
    fn suite_keeps_the_requested_order() {
        let config = DiagnosticsConfig {
            timeout: Duration::from_secs(10),
            ..Default::default()
        };
        let suite = build_suite(
            "diagnostics",
            &[ProbeKind::NatType, ProbeKind::Microphone],
            &config,
            &HostProfile::Healthy.capabilities(),
        );
        assert_eq!(suite.pending(), 2);
        assert_eq!(Probe::timeout(&suite), Duration::from_secs(20));
    }
}
