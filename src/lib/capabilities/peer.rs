use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use diag_api::v1::stats::StatsSnapshot;

use crate::error::Result;

use super::media::TrackInfo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    #[default]
    All,
    Relay,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerLinkConfig {
    pub ice_servers: Vec<IceServer>,
    pub ice_transport_policy: IceTransportPolicy,
}

/// One ICE candidate event. A `None` candidate marks the end of gathering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidateEvent {
    pub candidate: Option<String>,
}

impl IceCandidateEvent {
    pub fn candidate(line: impl Into<String>) -> Self {
        Self {
            candidate: Some(line.into()),
        }
    }

    pub fn end_of_candidates() -> Self {
        Self { candidate: None }
    }
}

/// A loopback pair of peer connections owned by the host's WebRTC stack.
///
/// Everything below ICE/SDP is the host's business; diagnostics only attach
/// tracks, trigger negotiation, and read back stats and candidates.
#[async_trait]
pub trait PeerLink: Send {
    fn add_track(&mut self, track: &TrackInfo) -> Result<()>;

    /// Run the offer/answer exchange. Resolves once the link is connected.
    async fn negotiate(&mut self) -> Result<()>;

    async fn poll_stats(&mut self) -> Result<StatsSnapshot>;

    /// Subscribe to the local ICE candidates. Only one subscriber is served;
    /// subscribe before calling [`Self::negotiate`].
    fn ice_candidates(&mut self) -> mpsc::UnboundedReceiver<IceCandidateEvent>;

    /// Idempotent.
    fn close(&mut self);
}

pub trait PeerLinkFactory: Send + Sync {
    fn create(&self, config: &PeerLinkConfig) -> Result<Box<dyn PeerLink>>;
}
