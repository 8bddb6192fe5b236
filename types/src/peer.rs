//! Peer identity, addressing and capability flags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable string identifier of a peer (conventionally its listening port).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Network address a peer listens on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub ip: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl std::str::FromStr for PeerAddress {
    type Err = crate::BraidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s
            .rsplit_once(':')
            .ok_or_else(|| crate::BraidError::InvalidAddress(s.to_string()))?;
        let port = port
            .parse()
            .map_err(|_| crate::BraidError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(ip, port))
    }
}

/// Capability flags advertised by a peer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerFlags {
    /// The peer sits behind NAT and can only be reached through a relay.
    #[serde(default)]
    pub nat: bool,
    /// The peer stores headers only and does not take part in transaction gossip.
    #[serde(default)]
    pub light: bool,
}

/// Liveness classification of a peer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeerStatus {
    Alive,
    Unreachable,
    #[default]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parses_and_displays() {
        let addr: PeerAddress = "127.0.0.1:5001".parse().unwrap();
        assert_eq!(addr, PeerAddress::new("127.0.0.1", 5001));
        assert_eq!(addr.to_string(), "127.0.0.1:5001");
    }

    #[test]
    fn address_rejects_missing_port() {
        assert!("127.0.0.1".parse::<PeerAddress>().is_err());
        assert!("host:notaport".parse::<PeerAddress>().is_err());
    }

    #[test]
    fn flags_default_to_false_when_absent() {
        let flags: PeerFlags = serde_json::from_str("{}").unwrap();
        assert_eq!(flags, PeerFlags::default());
    }

    #[test]
    fn status_uses_upper_case_names() {
        let json = serde_json::to_string(&PeerStatus::Unreachable).unwrap();
        assert_eq!(json, "\"UNREACHABLE\"");
    }

    #[test]
    fn peer_id_is_transparent_on_the_wire() {
        let id = PeerId::new("5003");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"5003\"");
    }
}
