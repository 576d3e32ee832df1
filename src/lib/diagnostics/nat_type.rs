use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::*;

use crate::{
    capabilities::{Capabilities, IceServer, PeerLinkConfig, PeerLinkFactory},
    error::{Error, Result},
    network::NatClassifier,
    probe::Probe,
};

use super::{DiagnosticsConfig, ProbeKind};

/// Gathers candidates on a fresh peer link and classifies the NAT from the
/// server-reflexive port mappings.
pub struct NatTypeProbe {
    ice_servers: Vec<IceServer>,
    timeout: Duration,
    peers: Arc<dyn PeerLinkFactory>,
}

impl NatTypeProbe {
    pub fn new(config: &DiagnosticsConfig, capabilities: &Capabilities) -> Self {
        Self {
            ice_servers: config.ice_servers.clone(),
            timeout: config.timeout,
            peers: capabilities.peers.clone(),
        }
    }
}

#[async_trait]
impl Probe for NatTypeProbe {
    fn name(&self) -> &str {
        ProbeKind::NatType.display_name()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&mut self) -> Result<serde_json::Value> {
        let link = self.peers.create(&PeerLinkConfig {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        })?;
        // Closed on every exit path, including cancellation by timeout
        let mut link = scopeguard::guard(link, |mut link| link.close());

        let mut candidates = link.ice_candidates();
        link.negotiate().await?;

        let mut classifier = NatClassifier::new();
        loop {
            match candidates.recv().await {
                Some(event) => match event.candidate {
                    Some(line) => {
                        trace!("Candidate: {line}");
                        classifier.observe_line(&line);
                    }
                    None => break,
                },
                None => {
                    warn!("Candidate events ended without end of gathering");
                    break;
                }
            }
        }

        let result = classifier.result();
        info!("NAT verdict: {}", result.verdict);
        serde_json::to_value(&result).map_err(|error| Error::check(error.to_string()))
    }
}
