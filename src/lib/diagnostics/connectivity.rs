use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::*;

use diag_api::v1::stats::ConnectivityResult;

use crate::{
    capabilities::{
        Capabilities, IceServer, IceTransportPolicy, PeerLink, PeerLinkConfig, PeerLinkFactory,
    },
    error::{Error, Result},
    probe::Probe,
};

use super::{DiagnosticsConfig, ProbeKind};

/// Connects a loopback peer link and reports which local candidate type the
/// selected pair ended up using.
pub struct ConnectivityProbe {
    ice_servers: Vec<IceServer>,
    ice_transport_policy: IceTransportPolicy,
    timeout: Duration,
    peers: Arc<dyn PeerLinkFactory>,
    link: Option<Box<dyn PeerLink>>,
}

impl ConnectivityProbe {
    pub fn new(config: &DiagnosticsConfig, capabilities: &Capabilities) -> Self {
        Self {
            ice_servers: config.ice_servers.clone(),
            ice_transport_policy: config.ice_transport_policy,
            timeout: config.timeout,
            peers: capabilities.peers.clone(),
            link: None,
        }
    }
}

#[async_trait]
impl Probe for ConnectivityProbe {
    fn name(&self) -> &str {
        ProbeKind::Connectivity.display_name()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&mut self) -> Result<serde_json::Value> {
        if self.ice_servers.is_empty() {
            return Err(Error::Connectivity("No ICE servers configured".to_string()));
        }

        let link = self.link.insert(self.peers.create(&PeerLinkConfig {
            ice_servers: self.ice_servers.clone(),
            ice_transport_policy: self.ice_transport_policy,
        })?);
        link.negotiate().await?;

        let snapshot = link.poll_stats().await?;
        let pair = snapshot
            .selected_candidate_pair()
            .ok_or_else(|| Error::Connectivity("No candidate pair succeeded".to_string()))?;

        let local_candidate_type = pair
            .local_candidate_id
            .as_deref()
            .and_then(|id| snapshot.find(id))
            .and_then(|candidate| candidate.candidate_type.clone());
        debug!("Selected local candidate type: {local_candidate_type:?}");

        let result = ConnectivityResult {
            local_candidate_type,
            round_trip_time_ms: pair.current_round_trip_time.map(|rtt| rtt * 1000.0),
        };
        serde_json::to_value(&result).map_err(|error| Error::check(error.to_string()))
    }

    fn release(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
    }
}
