use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use iroh::NodeAddr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::peer_id::{PeerId, PeerIdError};

#[derive(Debug, thiserror::Error)]
pub enum PeerAddrError {
    #[error(transparent)]
    Id(#[from] PeerIdError),
    #[error("invalid socket address {0:?}")]
    Socket(String),
}

/// A peer to dial: its id, optionally with known direct addresses.
///
/// Written `<hex id>` or `<hex id>@<ip:port>[,<ip:port>...]`. Without direct addresses
/// the peer is located through discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr {
    pub id: PeerId,
    pub addrs: Vec<SocketAddr>,
}

impl PeerAddr {
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            addrs: Vec::new(),
        }
    }

    pub fn to_node_addr(&self) -> Result<NodeAddr, PeerIdError> {
        Ok(NodeAddr::new(self.id.to_node_id()?).with_direct_addresses(self.addrs.iter().copied()))
    }
}

impl FromStr for PeerAddr {
    type Err = PeerAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, addrs) = match s.trim().split_once('@') {
            Some((id, addrs)) => (id, Some(addrs)),
            None => (s.trim(), None),
        };
        let id = PeerId::from_hex(id)?;
        let addrs = match addrs {
            Some(addrs) => addrs
                .split(',')
                .map(|addr| {
                    addr.trim()
                        .parse::<SocketAddr>()
                        .map_err(|_| PeerAddrError::Socket(addr.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(Self { id, addrs })
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if !self.addrs.is_empty() {
            let addrs: Vec<String> = self.addrs.iter().map(ToString::to_string).collect();
            write!(f, "@{}", addrs.join(","))?;
        }
        Ok(())
    }
}

impl Serialize for PeerAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeerAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
