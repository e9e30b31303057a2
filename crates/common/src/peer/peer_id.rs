use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use iroh::NodeId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum PeerIdError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected 32 bytes, got {0}")]
    Length(usize),
    #[error("not a valid node key: {0}")]
    InvalidKey(String),
}

/// Stable identity of a peer: the 32 bytes of its node public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId([u8; 32]);

impl PeerId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, PeerIdError> {
        let bytes = hex::decode(s.trim())?;
        let len = bytes.len();
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| PeerIdError::Length(len))?;
        Ok(Self(bytes))
    }

    /// Leading characters of the hex form, for log lines
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(10);
        hex
    }

    pub fn to_node_id(&self) -> Result<NodeId, PeerIdError> {
        NodeId::from_bytes(&self.0).map_err(|e| PeerIdError::InvalidKey(e.to_string()))
    }
}

impl From<NodeId> for PeerId {
    fn from(node_id: NodeId) -> Self {
        Self(*node_id.as_bytes())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.short())
    }
}

impl FromStr for PeerId {
    type Err = PeerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Append-only set of known peers, shared between clones.
///
/// Only members of the set are reconciled against.
#[derive(Debug, Clone, Default)]
pub struct PeerSet {
    inner: Arc<RwLock<Vec<PeerId>>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `peer`, returning true if it was not known yet
    pub fn insert(&self, peer: PeerId) -> bool {
        let mut peers = self.inner.write();
        if peers.contains(&peer) {
            return false;
        }
        peers.push(peer);
        true
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.inner.read().contains(peer)
    }

    pub fn to_vec(&self) -> Vec<PeerId> {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
