use std::collections::BTreeMap;

use tracing::*;

use diag_api::v1::nat::{NatResult, NatVerdict, PortMapping};

use super::candidate::Candidate;

/// Infers NAT mapping behavior from server-reflexive candidates.
///
/// Every srflx candidate maps a local (related) port to the port the STUN
/// server saw. A NAT that hands out one external port per local port behaves
/// asymmetrically (endpoint independent); several external ports for the same
/// local port means the mapping depends on the destination (symmetric).
#[derive(Debug, Default, Clone)]
pub struct NatClassifier {
    mappings: BTreeMap<u16, Vec<u16>>,
}

impl NatClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a parsed candidate. Returns `true` if it was a usable srflx
    /// candidate.
    pub fn observe(&mut self, candidate: &Candidate) -> bool {
        if !candidate.is_server_reflexive() {
            return false;
        }
        let Some(related_port) = candidate.related_port else {
            debug!("Ignoring srflx candidate without rport: {candidate:?}");
            return false;
        };

        self.mappings
            .entry(related_port)
            .or_default()
            .push(candidate.port);
        true
    }

    /// Parses and records a raw `candidate:` line; unparsable lines are
    /// logged and skipped.
    pub fn observe_line(&mut self, line: &str) -> bool {
        match line.parse::<Candidate>() {
            Ok(candidate) => self.observe(&candidate),
            Err(error) => {
                warn!("Skipping unparsable candidate {line:?}: {error}");
                false
            }
        }
    }

    pub fn verdict(&self) -> NatVerdict {
        match self.mappings.len() {
            0 => NatVerdict::NoSrflx,
            1 => {
                let ports = self.mappings.values().next().map(Vec::len).unwrap_or(0);
                if ports == 1 {
                    NatVerdict::Asymmetric
                } else {
                    NatVerdict::Symmetric
                }
            }
            _ => {
                let asymmetric_evidence = self.mappings.values().any(|ports| ports.len() == 1);
                let symmetric_evidence = self.mappings.values().any(|ports| ports.len() > 1);

                match (asymmetric_evidence, symmetric_evidence) {
                    (true, true) => NatVerdict::Both,
                    (true, false) => NatVerdict::Asymmetric,
                    (false, true) => NatVerdict::Symmetric,
                    (false, false) => NatVerdict::Inconclusive,
                }
            }
        }
    }

    pub fn result(&self) -> NatResult {
        NatResult {
            verdict: self.verdict(),
            mappings: self
                .mappings
                .iter()
                .map(|(related_port, ports)| PortMapping {
                    related_port: *related_port,
                    ports: ports.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srflx(related_port: u16, port: u16) -> String {
        format!(
            "candidate:1 1 udp 1677729535 203.0.113.7 {port} typ srflx raddr 192.168.1.20 rport {related_port}"
        )
    }

    #[test]
    fn no_candidates() {
        assert_eq!(NatClassifier::new().verdict(), NatVerdict::NoSrflx);
    }

    #[test]
    fn host_candidates_are_ignored() {
        let mut classifier = NatClassifier::new();
        assert!(!classifier.observe_line("candidate:1 1 udp 2122260223 192.168.1.20 5000 typ host"));
        assert!(!classifier.observe_line("not a candidate"));
        assert_eq!(classifier.verdict(), NatVerdict::NoSrflx);
    }

    #[test]
    fn one_mapping_is_asymmetric() {
        let mut classifier = NatClassifier::new();
        assert!(classifier.observe_line(&srflx(5000, 61000)));
        assert_eq!(classifier.verdict(), NatVerdict::Asymmetric);
    }

    #[test]
    fn remapped_port_is_symmetric() {
        let mut classifier = NatClassifier::new();
        classifier.observe_line(&srflx(5000, 61000));
        classifier.observe_line(&srflx(5000, 61002));
        assert_eq!(classifier.verdict(), NatVerdict::Symmetric);
    }

    #[test]
    fn several_local_ports() {
        let mut asymmetric = NatClassifier::new();
        asymmetric.observe_line(&srflx(5000, 61000));
        asymmetric.observe_line(&srflx(5001, 61001));
        assert_eq!(asymmetric.verdict(), NatVerdict::Asymmetric);

        let mut symmetric = NatClassifier::new();
        for (related, port) in [(5000, 61000), (5000, 61004), (5001, 61001), (5001, 61007)] {
            symmetric.observe_line(&srflx(related, port));
        }
        assert_eq!(symmetric.verdict(), NatVerdict::Symmetric);

        let mut both = NatClassifier::new();
        for (related, port) in [(5000, 61000), (5001, 61001), (5001, 61007)] {
            both.observe_line(&srflx(related, port));
        }
        assert_eq!(both.verdict(), NatVerdict::Both);
    }

    #[test]
    fn result_lists_mappings_by_local_port() {
        let mut classifier = NatClassifier::new();
        classifier.observe_line(&srflx(6000, 1));
        classifier.observe_line(&srflx(5000, 2));
        classifier.observe_line(&srflx(5000, 3));

        let result = classifier.result();
        assert_eq!(result.verdict, NatVerdict::Both);
        assert_eq!(result.mappings[0].related_port, 5000);
        assert_eq!(result.mappings[0].ports, vec![2, 3]);
    }
}
