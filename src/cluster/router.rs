//! Consistent routing of metric identities to their authoritative peer.
//!
//! `target = hash(id) mod N` over the current, ordered peer list. The hash is
//! FxHash over the identity bytes: unseeded, so every node in the cluster
//! computes the same owner for the same identity and peer count.

use super::membership::{ClusterMembership, PeerAddress};
use super::transport::Transport;
use crate::aggregator::{Downstream, RoleRegistry};
use crate::model::{Metric, MetricId};
use rustc_hash::FxHasher;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Index of the owning peer among `peer_count` peers.
///
/// # Panics
///
/// Panics if `peer_count` is zero.
pub fn route_index(id: &MetricId, peer_count: usize) -> usize {
    assert!(peer_count > 0, "cannot route over an empty topology");
    let mut hasher = FxHasher::default();
    hasher.write(id.as_str().as_bytes());
    (hasher.finish() % peer_count as u64) as usize
}

/// Owning peer of `id`, or `None` for an empty topology.
pub fn select_peer<'a>(id: &MetricId, peers: &'a [PeerAddress]) -> Option<&'a PeerAddress> {
    if peers.is_empty() {
        return None;
    }
    peers.get(route_index(id, peers.len()))
}

/// Where a record was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Enqueued into this node's own mailbox.
    Local,
    /// Handed to the transport for the owning peer.
    Remote(PeerAddress),
    /// Lost: mailbox full, unknown role, or transport failure.
    Dropped,
}

#[derive(Debug, Default)]
struct RouterStats {
    local: AtomicU64,
    remote: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time router counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterSnapshot {
    pub local: u64,
    pub remote: u64,
    pub dropped: u64,
}

/// Routes each record to the single node that aggregates its identity.
pub struct ClusterRouter<M: Metric> {
    self_address: PeerAddress,
    membership: Arc<dyn ClusterMembership>,
    transport: Arc<dyn Transport<M>>,
    local: Arc<RoleRegistry<M>>,
    stats: RouterStats,
}

impl<M: Metric> ClusterRouter<M> {
    pub fn new(
        self_address: PeerAddress,
        membership: Arc<dyn ClusterMembership>,
        transport: Arc<dyn Transport<M>>,
        local: Arc<RoleRegistry<M>>,
    ) -> Self {
        Self {
            self_address,
            membership,
            transport,
            local,
            stats: RouterStats::default(),
        }
    }

    pub fn self_address(&self) -> &PeerAddress {
        &self.self_address
    }

    /// Owner of `id` under the current membership snapshot.
    ///
    /// An empty topology means single-node mode: everything is local.
    pub fn route(&self, id: &MetricId) -> PeerAddress {
        let peers = self.membership.current_peers();
        select_peer(id, &peers)
            .cloned()
            .unwrap_or_else(|| self.self_address.clone())
    }

    /// Send `record` to the mailbox of `role` on its owning node.
    pub async fn dispatch(&self, role: &str, record: M) -> Dispatch {
        let target = self.route(record.id());

        if target == self.self_address {
            return match self.local.offer(role, record) {
                Ok(()) => {
                    self.stats.local.fetch_add(1, Ordering::Relaxed);
                    Dispatch::Local
                },
                Err(e) => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(role, "Local dispatch dropped: {}", e);
                    Dispatch::Dropped
                },
            };
        }

        let id = record.id().clone();
        match self.transport.send(&target, role, record).await {
            Ok(()) => {
                self.stats.remote.fetch_add(1, Ordering::Relaxed);
                Dispatch::Remote(target)
            },
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(role, peer = %target, id = %id, "Remote dispatch failed, record dropped: {}", e);
                Dispatch::Dropped
            },
        }
    }

    pub fn stats(&self) -> RouterSnapshot {
        RouterSnapshot {
            local: self.stats.local.load(Ordering::Relaxed),
            remote: self.stats.remote.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Downstream that re-routes every record of a drained generation to the
/// owner's `target_role`. Used by pre-aggregating roles that are not the
/// authoritative aggregator for their identities.
pub struct RemoteForwarder<M: Metric> {
    router: Arc<ClusterRouter<M>>,
    target_role: String,
}

impl<M: Metric> RemoteForwarder<M> {
    pub fn new(router: Arc<ClusterRouter<M>>, target_role: impl Into<String>) -> Self {
        Self {
            router,
            target_role: target_role.into(),
        }
    }
}

#[async_trait::async_trait]
impl<M: Metric> Downstream<M> for RemoteForwarder<M> {
    async fn accept(&self, role: &str, generation: HashMap<MetricId, M>) {
        let total = generation.len();
        let mut dropped = 0usize;
        for record in generation.into_values() {
            if self.router.dispatch(&self.target_role, record).await == Dispatch::Dropped {
                dropped += 1;
            }
        }
        tracing::debug!(
            role,
            target = %self.target_role,
            total,
            dropped,
            "Forwarded generation to owners"
        );
    }
}
