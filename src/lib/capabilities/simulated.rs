//! In-process host used by the binary and the integration tests.
//!
//! Everything is deterministic for a given [`HostProfile`]: audio is a sine
//! tone, video a scrolling gradient with seeded noise, and the peer link a
//! loopback whose congestion estimate ramps up linearly to the profile's
//! capacity. Timestamps come from the tokio clock, so paused-time tests see
//! consistent stats.

use std::{
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, time::Instant};
use tracing::*;

use diag_api::v1::stats::{StatsReport, StatsSnapshot};

use crate::error::{DeviceError, Error, Result};

use super::{
    frame::{FrameSource, PixelBuffer},
    media::{MediaConstraints, MediaSource, MediaStream, TrackInfo, TrackKind},
    peer::{IceCandidateEvent, IceTransportPolicy, PeerLink, PeerLinkConfig, PeerLinkFactory},
    Capabilities,
};

const AUDIO_SAMPLE_RATE: u32 = 48_000;
const AUDIO_CHUNK: Duration = Duration::from_millis(10);
const TONE_HZ: f64 = 440.0;
const TONE_AMPLITUDE: f64 = 0.25;

/// Frames are rendered downscaled, like a host drawing the video element
/// into a small canvas.
const FRAME_DOWNSCALE: u32 = 8;

const NEGOTIATION_DELAY: Duration = Duration::from_millis(50);
const STATS_DELAY: Duration = Duration::from_millis(5);
const PACKET_SIZE_BYTES: u64 = 1200;

const LOCAL_ADDRESS: &str = "192.168.1.10";
const PUBLIC_ADDRESS: &str = "203.0.113.7";
const LOCAL_PORT: u16 = 50000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostProfile {
    #[default]
    Healthy,
    SymmetricNat,
    NoCamera,
    BlackCamera,
    MutedMicrophone,
    LossyNetwork,
    NoStun,
}

impl HostProfile {
    pub const ALL: [HostProfile; 7] = [
        HostProfile::Healthy,
        HostProfile::SymmetricNat,
        HostProfile::NoCamera,
        HostProfile::BlackCamera,
        HostProfile::MutedMicrophone,
        HostProfile::LossyNetwork,
        HostProfile::NoStun,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HostProfile::Healthy => "healthy",
            HostProfile::SymmetricNat => "symmetric-nat",
            HostProfile::NoCamera => "no-camera",
            HostProfile::BlackCamera => "black-camera",
            HostProfile::MutedMicrophone => "muted-microphone",
            HostProfile::LossyNetwork => "lossy-network",
            HostProfile::NoStun => "no-stun",
        }
    }

    /// Link capacity in kbps.
    fn capacity_kbps(&self) -> f64 {
        match self {
            HostProfile::LossyNetwork => 800.0,
            _ => 2500.0,
        }
    }

    fn base_rtt_seconds(&self) -> f64 {
        match self {
            HostProfile::LossyNetwork => 0.150,
            _ => 0.020,
        }
    }

    fn loss_ratio(&self) -> f64 {
        match self {
            HostProfile::LossyNetwork => 0.05,
            _ => 0.0,
        }
    }

    /// Capabilities wired to this profile.
    pub fn capabilities(self) -> Capabilities {
        Capabilities {
            media: Arc::new(SimulatedMediaSource::new(self)),
            peers: Arc::new(SimulatedPeerLinkFactory::new(self)),
        }
    }
}

impl fmt::Display for HostProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HostProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        HostProfile::ALL
            .into_iter()
            .find(|profile| profile.name() == s)
            .ok_or_else(|| {
                let known: Vec<_> = HostProfile::ALL.iter().map(HostProfile::name).collect();
                format!("Unknown host profile {s:?}, expected one of {known:?}")
            })
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedMediaSource {
    profile: HostProfile,
}

impl SimulatedMediaSource {
    pub fn new(profile: HostProfile) -> Self {
        Self { profile }
    }
}

#[async_trait]
impl MediaSource for SimulatedMediaSource {
    #[instrument(level = "debug", skip(self), fields(profile = %self.profile))]
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<Box<dyn MediaStream>> {
        let mut tracks = Vec::new();

        if constraints.audio {
            tracks.push(TrackInfo {
                id: "audio-0".to_string(),
                kind: TrackKind::Audio,
                label: "Simulated Microphone".to_string(),
                enabled: true,
                muted: false,
                live: true,
                width: None,
                height: None,
                sample_rate: Some(AUDIO_SAMPLE_RATE),
            });
        }

        if let Some(video) = constraints.video {
            if self.profile == HostProfile::NoCamera {
                return Err(DeviceError::Unavailable("No camera found".to_string()).into());
            }
            tracks.push(TrackInfo {
                id: "video-0".to_string(),
                kind: TrackKind::Video,
                label: "Simulated Camera".to_string(),
                enabled: true,
                muted: false,
                live: true,
                width: Some(video.width),
                height: Some(video.height),
                sample_rate: None,
            });
        }

        debug!("Acquired {} simulated track(s)", tracks.len());
        Ok(Box::new(SimulatedMediaStream {
            profile: self.profile,
            tracks,
            active: Arc::new(AtomicBool::new(true)),
            audio_position: 0,
        }))
    }
}

#[derive(Debug)]
pub struct SimulatedMediaStream {
    profile: HostProfile,
    tracks: Vec<TrackInfo>,
    active: Arc<AtomicBool>,
    audio_position: u64,
}

#[async_trait]
impl MediaStream for SimulatedMediaStream {
    fn tracks(&self) -> Vec<TrackInfo> {
        let live = self.active.load(Ordering::SeqCst);
        self.tracks
            .iter()
            .cloned()
            .map(|track| TrackInfo { live, ..track })
            .collect()
    }

    async fn next_audio_chunk(&mut self) -> Option<Vec<f32>> {
        if !self.active.load(Ordering::SeqCst) || self.track(TrackKind::Audio).is_none() {
            return None;
        }
        tokio::time::sleep(AUDIO_CHUNK).await;

        let samples = (AUDIO_SAMPLE_RATE as u64 * AUDIO_CHUNK.as_millis() as u64) / 1000;
        let start = self.audio_position;
        self.audio_position += samples;

        if self.profile == HostProfile::MutedMicrophone {
            return Some(vec![0.0; samples as usize]);
        }

        let chunk = (start..start + samples)
            .map(|n| {
                let t = n as f64 / AUDIO_SAMPLE_RATE as f64;
                (TONE_AMPLITUDE * (2.0 * std::f64::consts::PI * TONE_HZ * t).sin()) as f32
            })
            .collect();
        Some(chunk)
    }

    fn frame_source(&mut self) -> Option<Box<dyn FrameSource>> {
        let track = self.track(TrackKind::Video)?;
        let width = (track.width.unwrap_or(640) / FRAME_DOWNSCALE).max(1);
        let height = (track.height.unwrap_or(480) / FRAME_DOWNSCALE).max(1);

        Some(Box::new(SimulatedFrameSource {
            black: self.profile == HostProfile::BlackCamera,
            width,
            height,
            frame: 0,
            active: self.active.clone(),
            rng: StdRng::seed_from_u64(0x5eed),
        }))
    }

    fn stop(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            debug!("Stopped simulated tracks");
        }
    }
}

#[derive(Debug)]
pub struct SimulatedFrameSource {
    black: bool,
    width: u32,
    height: u32,
    frame: u32,
    active: Arc<AtomicBool>,
    rng: StdRng,
}

impl FrameSource for SimulatedFrameSource {
    fn current_frame(&mut self) -> Option<PixelBuffer> {
        if self.black {
            return Some(PixelBuffer::filled(self.width, self.height, [0, 0, 0, 255]));
        }

        self.frame = self.frame.wrapping_add(1);
        let shift = self.frame.wrapping_mul(7);
        let mut data = Vec::with_capacity((self.width * self.height) as usize * PixelBuffer::CHANNELS);
        for y in 0..self.height {
            for x in 0..self.width {
                let base = ((x + y + shift) * 4 % 256) as i32;
                let noise: i32 = self.rng.gen_range(-24..=24);
                let value = (base + noise).clamp(0, 255) as u8;
                data.extend_from_slice(&[value, value, value, 255]);
            }
        }
        Some(PixelBuffer::new(self.width, self.height, data))
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedPeerLinkFactory {
    profile: HostProfile,
}

impl SimulatedPeerLinkFactory {
    pub fn new(profile: HostProfile) -> Self {
        Self { profile }
    }
}

impl PeerLinkFactory for SimulatedPeerLinkFactory {
    fn create(&self, config: &PeerLinkConfig) -> Result<Box<dyn PeerLink>> {
        Ok(Box::new(SimulatedPeerLink::new(self.profile, config.clone())))
    }
}

#[derive(Debug)]
struct OutboundTrack {
    id: String,
    kind: TrackKind,
    width: Option<u32>,
    height: Option<u32>,
    bytes_sent: u64,
}

#[derive(Debug)]
pub struct SimulatedPeerLink {
    profile: HostProfile,
    config: PeerLinkConfig,
    created: Instant,
    connected: Option<Instant>,
    last_poll: Option<Instant>,
    outbound: Vec<OutboundTrack>,
    candidates: Option<mpsc::UnboundedSender<IceCandidateEvent>>,
    polls: u64,
    closed: bool,
    rng: StdRng,
}

impl SimulatedPeerLink {
    pub fn new(profile: HostProfile, config: PeerLinkConfig) -> Self {
        Self {
            profile,
            config,
            created: Instant::now(),
            connected: None,
            last_poll: None,
            outbound: Vec::new(),
            candidates: None,
            polls: 0,
            closed: false,
            rng: StdRng::seed_from_u64(0x11ec),
        }
    }

    fn stun_reachable(&self) -> bool {
        self.profile != HostProfile::NoStun
            && self
                .config
                .ice_servers
                .iter()
                .flat_map(|server| server.urls.iter())
                .any(|url| url.starts_with("stun:") || url.starts_with("turn:"))
    }

    fn local_candidate_type(&self) -> &'static str {
        match self.config.ice_transport_policy {
            IceTransportPolicy::Relay => "relay",
            IceTransportPolicy::All => "host",
        }
    }

    fn candidate_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "candidate:1 1 udp 2122260223 {LOCAL_ADDRESS} {LOCAL_PORT} typ host generation 0"
        )];

        if !self.stun_reachable() {
            return lines;
        }

        let mapped_ports: &[u16] = match self.profile {
            HostProfile::SymmetricNat => &[61000, 61017],
            _ => &[61000],
        };
        for (index, port) in mapped_ports.iter().enumerate() {
            lines.push(format!(
                "candidate:{} 1 udp 1686052607 {PUBLIC_ADDRESS} {port} typ srflx raddr {LOCAL_ADDRESS} rport {LOCAL_PORT} generation 0",
                index + 2
            ));
        }
        lines
    }

    fn millis_since_creation(&self, instant: Instant) -> f64 {
        instant.duration_since(self.created).as_secs_f64() * 1000.0
    }
}

#[async_trait]
impl PeerLink for SimulatedPeerLink {
    fn add_track(&mut self, track: &TrackInfo) -> Result<()> {
        if self.closed {
            return Err(Error::Connectivity("Peer link is closed".to_string()));
        }
        self.outbound.push(OutboundTrack {
            id: format!("OUT-{}", track.id),
            kind: track.kind,
            width: track.width,
            height: track.height,
            bytes_sent: 0,
        });
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(profile = %self.profile))]
    async fn negotiate(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Connectivity("Peer link is closed".to_string()));
        }
        tokio::time::sleep(NEGOTIATION_DELAY).await;

        if let Some(sender) = &self.candidates {
            for line in self.candidate_lines() {
                let _ = sender.send(IceCandidateEvent::candidate(line));
            }
            let _ = sender.send(IceCandidateEvent::end_of_candidates());
        }

        self.connected = Some(Instant::now());
        debug!("Simulated link connected");
        Ok(())
    }

    async fn poll_stats(&mut self) -> Result<StatsSnapshot> {
        let Some(connected) = self.connected else {
            return Err(Error::StatsCollection("Peer link not connected".to_string()));
        };
        if self.closed {
            return Err(Error::StatsCollection("Peer link is closed".to_string()));
        }

        tokio::time::sleep(STATS_DELAY).await;
        self.polls += 1;
        if self.profile == HostProfile::LossyNetwork && self.polls % 25 == 0 {
            return Err(Error::StatsCollection("Stats request dropped".to_string()));
        }

        let now = Instant::now();
        let timestamp = self.millis_since_creation(now);
        let connected_ms = now.duration_since(connected).as_secs_f64() * 1000.0;
        let interval_ms = self
            .last_poll
            .map(|last| now.duration_since(last).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        self.last_poll = Some(now);

        let capacity = self.profile.capacity_kbps();
        let estimate_kbps = (300.0 + connected_ms * 2.0).min(capacity);
        let rtt = self.profile.base_rtt_seconds() + self.rng.gen_range(0.0..0.005);
        let loss_ratio = self.profile.loss_ratio();

        let mut reports = Vec::new();

        let mut pair = StatsReport::new("CP1", "candidate-pair", timestamp);
        pair.state = Some("succeeded".to_string());
        pair.nominated = Some(true);
        pair.local_candidate_id = Some("L1".to_string());
        pair.available_outgoing_bitrate = Some(estimate_kbps * 1000.0);
        pair.current_round_trip_time = Some(rtt);
        reports.push(pair);

        let mut local = StatsReport::new("L1", "local-candidate", timestamp);
        local.candidate_type = Some(self.local_candidate_type().to_string());
        reports.push(local);

        let frame_rate = 30.0 - 6.0 * loss_ratio * 20.0;
        for track in &mut self.outbound {
            let rate_kbps = match track.kind {
                TrackKind::Audio => estimate_kbps.min(128.0),
                TrackKind::Video => estimate_kbps,
            };
            // kbps times ms is bits
            track.bytes_sent += (rate_kbps * interval_ms / 8.0) as u64;
            let packets_sent = track.bytes_sent / PACKET_SIZE_BYTES;

            let mut outbound = StatsReport::new(track.id.clone(), "outbound-rtp", timestamp);
            outbound.bytes_sent = Some(track.bytes_sent);
            outbound.packets_sent = Some(packets_sent);
            if track.kind == TrackKind::Video {
                outbound.frames_per_second = Some(frame_rate);
                outbound.frame_width = track.width;
                outbound.frame_height = track.height;
            }
            reports.push(outbound);

            let mut remote =
                StatsReport::new(format!("R{}", track.id), "remote-inbound-rtp", timestamp);
            remote.packets_lost = Some((packets_sent as f64 * loss_ratio) as i64);
            remote.current_round_trip_time = None;
            reports.push(remote);
        }

        Ok(StatsSnapshot { reports })
    }

    fn ice_candidates(&mut self) -> mpsc::UnboundedReceiver<IceCandidateEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.candidates = Some(sender);
        receiver
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.candidates = None;
        debug!("Simulated link closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{capabilities::IceServer, network::NatClassifier, video::ssim::ssim};

    fn stun_config() -> PeerLinkConfig {
        PeerLinkConfig {
            ice_servers: vec![IceServer::new("stun:stun.l.google.com:19302")],
            ..Default::default()
        }
    }

    #[test]
    fn profile_names_round_trip() {
        for profile in HostProfile::ALL {
            assert_eq!(profile.to_string().parse::<HostProfile>(), Ok(profile));
        }
        assert!("flaky".parse::<HostProfile>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn no_camera_fails_video_acquisition() {
        let source = SimulatedMediaSource::new(HostProfile::NoCamera);
        assert!(source.acquire(&MediaConstraints::audio()).await.is_ok());
        assert!(matches!(
            source.acquire(&MediaConstraints::video(640, 480)).await,
            Err(Error::Device(DeviceError::Unavailable(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_stream_ends_audio() {
        let source = SimulatedMediaSource::new(HostProfile::Healthy);
        let mut stream = source.acquire(&MediaConstraints::audio()).await.unwrap();

        let chunk = stream.next_audio_chunk().await.unwrap();
        assert_eq!(chunk.len(), 480);
        assert!(chunk.iter().any(|sample| *sample != 0.0));

        stream.stop();
        stream.stop();
        assert!(stream.next_audio_chunk().await.is_none());
        assert!(!stream.track(TrackKind::Audio).unwrap().live);
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_frames_differ() {
        let source = SimulatedMediaSource::new(HostProfile::Healthy);
        let mut stream = source.acquire(&MediaConstraints::video(640, 480)).await.unwrap();
        let mut frames = stream.frame_source().unwrap();

        let first = frames.current_frame().unwrap();
        let second = frames.current_frame().unwrap();
        assert_eq!((first.width, first.height), (80, 60));
        assert!(ssim(&first.luma(), &second.luma()) < 0.985);

        stream.stop();
        assert!(!frames.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn symmetric_nat_emits_two_mappings() {
        let mut link = SimulatedPeerLink::new(HostProfile::SymmetricNat, stun_config());
        let mut candidates = link.ice_candidates();
        link.negotiate().await.unwrap();

        let mut classifier = NatClassifier::new();
        while let Some(IceCandidateEvent {
            candidate: Some(line),
        }) = candidates.recv().await
        {
            classifier.observe_line(&line);
        }
        assert_eq!(classifier.result().mappings[0].ports, vec![61000, 61017]);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_require_a_connection() {
        let mut link = SimulatedPeerLink::new(HostProfile::Healthy, stun_config());
        assert!(matches!(
            link.poll_stats().await,
            Err(Error::StatsCollection(_))
        ));

        link.negotiate().await.unwrap();
        let snapshot = link.poll_stats().await.unwrap();
        let pair = snapshot.selected_candidate_pair().unwrap();
        assert_eq!(
            snapshot
                .find(pair.local_candidate_id.as_deref().unwrap())
                .unwrap()
                .candidate_type
                .as_deref(),
            Some("host")
        );

        link.close();
        link.close();
        assert!(link.poll_stats().await.is_err());
    }
}
