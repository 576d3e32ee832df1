//! Host capabilities the probes are driven through.
//!
//! Device capture, the WebRTC stack and video rendering belong to the host;
//! probes receive them as trait objects at construction time.

pub mod frame;
pub mod media;
pub mod peer;
pub mod simulated;

use std::sync::Arc;

pub use frame::{FrameSource, PixelBuffer};
pub use media::{MediaConstraints, MediaSource, MediaStream, TrackInfo, TrackKind};
pub use peer::{
    IceCandidateEvent, IceServer, IceTransportPolicy, PeerLink, PeerLinkConfig, PeerLinkFactory,
};

/// Bundle of everything a built-in probe may need from the host.
#[derive(Clone)]
pub struct Capabilities {
    pub media: Arc<dyn MediaSource>,
    pub peers: Arc<dyn PeerLinkFactory>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}
