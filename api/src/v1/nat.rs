use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Topology inferred from server-reflexive port mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub enum NatVerdict {
    /// No server-reflexive candidate was gathered.
    #[serde(rename = "nat.noSrflx")]
    NoSrflx,
    /// Every local port maps to one external port.
    #[serde(rename = "nat.asymmetric")]
    Asymmetric,
    /// Some local port was mapped to several external ports.
    #[serde(rename = "nat.symmetric")]
    Symmetric,
    /// Mixed evidence across local ports.
    #[serde(rename = "nat.both")]
    Both,
    /// Several local ports, none with usable evidence. The key is reported
    /// as it was historically emitted, outside the `nat.` family.
    #[serde(rename = "not.noSrflx")]
    Inconclusive,
}

impl NatVerdict {
    pub fn key(&self) -> &'static str {
        match self {
            Self::NoSrflx => "nat.noSrflx",
            Self::Asymmetric => "nat.asymmetric",
            Self::Symmetric => "nat.symmetric",
            Self::Both => "nat.both",
            Self::Inconclusive => "not.noSrflx",
        }
    }
}

impl std::fmt::Display for NatVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub related_port: u16,
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct NatResult {
    pub verdict: NatVerdict,
    pub mappings: Vec<PortMapping>,
}
