//! Peer-to-peer delivery contract.

use super::membership::PeerAddress;
use crate::aggregator::RoleRegistry;
use crate::core::{MeterflowError, Result};
use crate::model::Metric;
use dashmap::DashMap;
use std::sync::Arc;

/// Delivers a record into a remote node's mailbox for `role`.
///
/// Fire-and-forget: an `Err` means the record is lost, the caller does not retry.
#[async_trait::async_trait]
pub trait Transport<M: Metric>: Send + Sync {
    async fn send(&self, peer: &PeerAddress, role: &str, record: M) -> Result<()>;
}

/// Transport between nodes living in the same process.
///
/// Each node registers its role registry under its own address; sending looks
/// the peer up and enqueues straight into its mailbox.
pub struct InProcessTransport<M> {
    nodes: DashMap<PeerAddress, Arc<RoleRegistry<M>>>,
}

impl<M: Metric> InProcessTransport<M> {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
        }
    }

    pub fn register(&self, address: PeerAddress, registry: Arc<RoleRegistry<M>>) {
        self.nodes.insert(address, registry);
    }

    /// Simulate a node leaving or becoming unreachable.
    pub fn unregister(&self, address: &PeerAddress) {
        self.nodes.remove(address);
    }
}

impl<M: Metric> Default for InProcessTransport<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl<M: Metric> Transport<M> for InProcessTransport<M> {
    async fn send(&self, peer: &PeerAddress, role: &str, record: M) -> Result<()> {
        let registry = self
            .nodes
            .get(peer)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| MeterflowError::transport(format!("peer {} unreachable", peer)))?;
        registry.offer(role, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{Mailbox, WorkerMessage};
    use crate::model::ServiceCallsMetric;

    fn call() -> ServiceCallsMetric {
        ServiceCallsMetric::observe(202401011200, "cart", "pod-1", 5, false).unwrap()
    }

    #[tokio::test]
    async fn test_send_reaches_registered_node() {
        let mut registry = RoleRegistry::new();
        let (mailbox, mut rx) = Mailbox::channel("service_calls", 4);
        registry.register(mailbox).unwrap();

        let transport = InProcessTransport::new();
        let peer = PeerAddress::from("node-b:11800");
        transport.register(peer.clone(), Arc::new(registry));

        transport.send(&peer, "service_calls", call()).await.unwrap();
        assert!(matches!(rx.recv().await, Some(WorkerMessage::Record(_))));
    }

    #[tokio::test]
    async fn test_unknown_peer_is_transport_error() {
        let transport = InProcessTransport::<ServiceCallsMetric>::new();
        let err = transport
            .send(&PeerAddress::from("gone:1"), "service_calls", call())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "transport");
    }
}
