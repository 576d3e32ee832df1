//! Parsing of ICE candidate attributes ([RFC 8839 §5.1](https://www.rfc-editor.org/rfc/rfc8839#section-5.1)).

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateType {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relay,
}

impl FromStr for CandidateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(Self::Host),
            "srflx" => Ok(Self::ServerReflexive),
            "prflx" => Ok(Self::PeerReflexive),
            "relay" => Ok(Self::Relay),
            other => Err(format!("unknown candidate type: {other:?}")),
        }
    }
}

impl std::fmt::Display for CandidateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::ServerReflexive => write!(f, "srflx"),
            Self::PeerReflexive => write!(f, "prflx"),
            Self::Relay => write!(f, "relay"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub foundation: String,
    pub component: u32,
    pub protocol: String,
    pub priority: u32,
    pub address: String,
    /// Externally observed port for derived candidates.
    pub port: u16,
    pub typ: CandidateType,
    pub related_address: Option<String>,
    /// Base port a derived candidate was obtained from.
    pub related_port: Option<u16>,
}

impl FromStr for Candidate {
    type Err = String;

    /// Accepts `candidate:...` with or without the `a=` SDP prefix.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let line = line.strip_prefix("a=").unwrap_or(line);
        let Some(attribute) = line.strip_prefix("candidate:") else {
            return Err(format!("not a candidate attribute: {line:?}"));
        };

        let fields: Vec<&str> = attribute.split_whitespace().collect();
        if fields.len() < 8 || fields[6] != "typ" {
            return Err(format!("malformed candidate: {line:?}"));
        }

        let mut candidate = Candidate {
            foundation: fields[0].to_string(),
            component: parse_number("component", fields[1])?,
            protocol: fields[2].to_lowercase(),
            priority: parse_number("priority", fields[3])?,
            address: fields[4].to_string(),
            port: parse_number("port", fields[5])?,
            typ: fields[7].parse()?,
            related_address: None,
            related_port: None,
        };

        // Extensions come as name/value pairs.
        for pair in fields[8..].chunks(2) {
            match pair {
                ["raddr", value] => candidate.related_address = Some(value.to_string()),
                ["rport", value] => {
                    candidate.related_port = Some(parse_number("rport", value)?)
                }
                _ => (),
            }
        }

        Ok(candidate)
    }
}

fn parse_number<T>(name: &str, value: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|error| format!("invalid {name} {value:?}: {error}"))
}

impl Candidate {
    pub fn is_server_reflexive(&self) -> bool {
        self.typ == CandidateType::ServerReflexive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_reflexive_candidate() {
        let candidate: Candidate = "candidate:842163049 1 udp 1677729535 203.0.113.7 61000 typ srflx raddr 192.168.1.20 rport 54321 generation 0 ufrag abcd network-cost 999"
            .parse()
            .unwrap();

        assert_eq!(candidate.typ, CandidateType::ServerReflexive);
        assert_eq!(candidate.port, 61000);
        assert_eq!(candidate.related_port, Some(54321));
        assert_eq!(candidate.related_address.as_deref(), Some("192.168.1.20"));
        assert_eq!(candidate.protocol, "udp");
    }

    #[test]
    fn parses_host_candidate_with_sdp_prefix() {
        let candidate: Candidate = "a=candidate:1 1 UDP 2122260223 192.168.1.20 54321 typ host"
            .parse()
            .unwrap();

        assert_eq!(candidate.typ, CandidateType::Host);
        assert_eq!(candidate.related_port, None);
        assert!(!candidate.is_server_reflexive());
    }

    #[test]
    fn rejects_garbage() {
        assert!("candidate:1 1 udp".parse::<Candidate>().is_err());
        assert!("foo".parse::<Candidate>().is_err());
        assert!("candidate:1 1 udp 1 1.2.3.4 99999 typ host"
            .parse::<Candidate>()
            .is_err());
        assert!("candidate:1 1 udp 1 1.2.3.4 5 typ bogus"
            .parse::<Candidate>()
            .is_err());
    }
}
