use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::frame::FrameSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: Option<VideoConstraints>,
}

impl MediaConstraints {
    pub fn audio() -> Self {
        Self {
            audio: true,
            video: None,
        }
    }

    pub fn video(width: u32, height: u32) -> Self {
        Self {
            audio: false,
            video: Some(VideoConstraints { width, height }),
        }
    }
}

/// Metadata of an acquired track, as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub kind: TrackKind,
    pub label: String,
    pub enabled: bool,
    pub muted: bool,
    /// `false` once the track ended.
    pub live: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<u32>,
}

/// A set of live tracks obtained from the host's capture devices.
///
/// Owned by the probe that acquired it; `stop` releases the devices and must
/// be safe to call more than once.
#[async_trait]
pub trait MediaStream: Send {
    fn tracks(&self) -> Vec<TrackInfo>;

    /// Next chunk of PCM samples in `[-1, 1]`, `None` once the audio ended.
    async fn next_audio_chunk(&mut self) -> Option<Vec<f32>>;

    /// Frames of the video track rendered by the host.
    fn frame_source(&mut self) -> Option<Box<dyn FrameSource>>;

    fn stop(&mut self);

    fn track(&self, kind: TrackKind) -> Option<TrackInfo> {
        self.tracks().into_iter().find(|track| track.kind == kind)
    }
}

/// Capture device access.
///
/// Fails with [`crate::error::DeviceError::PermissionDenied`] or
/// [`crate::error::DeviceError::Unavailable`].
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<Box<dyn MediaStream>>;
}
