//! Cluster membership snapshots.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Address of a cluster peer, e.g. `10.0.0.4:11800`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        PeerAddress(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(address: &str) -> Self {
        PeerAddress(address.to_string())
    }
}

/// Source of the live peer list. The router re-reads it on every dispatch.
pub trait ClusterMembership: Send + Sync {
    /// Current ordered peer list. May change between calls.
    fn current_peers(&self) -> Arc<Vec<PeerAddress>>;
}

/// Membership held in memory and replaced wholesale on change.
pub struct StaticMembership {
    peers: ArcSwap<Vec<PeerAddress>>,
}

impl StaticMembership {
    pub fn new(peers: Vec<PeerAddress>) -> Self {
        Self {
            peers: ArcSwap::from_pointee(normalize(peers)),
        }
    }

    /// Build from configured address strings.
    pub fn from_addresses(addresses: &[String]) -> Self {
        Self::new(addresses.iter().map(|a| PeerAddress::new(a.as_str())).collect())
    }

    /// Publish a new snapshot. Readers holding the old one keep it intact.
    pub fn update(&self, peers: Vec<PeerAddress>) {
        let peers = normalize(peers);
        tracing::info!(peers = peers.len(), "Cluster membership updated");
        self.peers.store(Arc::new(peers));
    }
}

impl ClusterMembership for StaticMembership {
    fn current_peers(&self) -> Arc<Vec<PeerAddress>> {
        self.peers.load_full()
    }
}

/// Every node must see the same order for routing to agree.
fn normalize(mut peers: Vec<PeerAddress>) -> Vec<PeerAddress> {
    peers.sort();
    peers.dedup();
    peers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peers_sorted_and_deduplicated() {
        let membership = StaticMembership::new(vec![
            PeerAddress::from("10.0.0.3:11800"),
            PeerAddress::from("10.0.0.1:11800"),
            PeerAddress::from("10.0.0.3:11800"),
        ]);
        let peers = membership.current_peers();
        assert_eq!(
            peers.as_slice(),
            &[PeerAddress::from("10.0.0.1:11800"), PeerAddress::from("10.0.0.3:11800")]
        );
    }

    #[test]
    fn test_update_does_not_disturb_held_snapshot() {
        let membership = StaticMembership::from_addresses(&["a:1".to_string(), "b:1".to_string()]);
        let before = membership.current_peers();
        membership.update(vec![PeerAddress::from("c:1")]);

        assert_eq!(before.len(), 2);
        assert_eq!(membership.current_peers().as_slice(), &[PeerAddress::from("c:1")]);
    }
}
