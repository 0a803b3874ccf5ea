//! Node assembly: wires caches, mailboxes, aggregators, the router and the
//! flush ticker for every configured role.

use crate::aggregator::{
    AggregatorSnapshot, AggregatorStats, Downstream, FlushTicker, LocalAggregator, Mailbox, RoleRegistry,
};
use crate::cache::AggregationCache;
use crate::cluster::{
    ClusterMembership, ClusterRouter, Dispatch, InProcessTransport, PeerAddress, RemoteForwarder, RouterSnapshot,
    StaticMembership, Transport,
};
use crate::core::{Config, MeterflowError, Result};
use crate::model::Metric;
use crate::persistence::{FlushSnapshot, MetricsDao, PersistenceFlusher};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Counters for one role on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleStats {
    pub aggregator: AggregatorSnapshot,
    /// `None` for forwarding roles.
    pub flush: Option<FlushSnapshot>,
}

struct RoleHandle<M: Metric> {
    cache: Arc<AggregationCache<M>>,
    stats: Arc<AggregatorStats>,
    flusher: Option<Arc<PersistenceFlusher<M>>>,
    forward_to: Option<String>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Builder for a [`Node`].
pub struct NodeBuilder<M: Metric> {
    config: Config,
    membership: Option<Arc<dyn ClusterMembership>>,
    transport: Option<Arc<dyn Transport<M>>>,
    daos: HashMap<String, Arc<dyn MetricsDao<M>>>,
}

impl<M: Metric> NodeBuilder<M> {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            membership: None,
            transport: None,
            daos: HashMap::new(),
        }
    }

    /// Defaults to a [`StaticMembership`] built from `cluster.peers`.
    pub fn membership(mut self, membership: Arc<dyn ClusterMembership>) -> Self {
        self.membership = Some(membership);
        self
    }

    /// Defaults to an empty [`InProcessTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport<M>>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Storage for a persisting role.
    pub fn dao(mut self, role: impl Into<String>, dao: Arc<dyn MetricsDao<M>>) -> Self {
        self.daos.insert(role.into(), dao);
        self
    }

    /// Validate, wire every role and spawn the node's tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(mut self) -> Result<Node<M>> {
        self.config.validate()?;
        let config = self.config;

        let membership = self
            .membership
            .unwrap_or_else(|| Arc::new(StaticMembership::from_addresses(&config.cluster.peers)));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(InProcessTransport::<M>::new()));

        let mut registry = RoleRegistry::new();
        let mut receivers = Vec::with_capacity(config.roles.len());
        for role in &config.roles {
            let (mailbox, rx) = Mailbox::channel(&role.name, role.mailbox_capacity(&config.aggregation));
            registry.register(mailbox)?;
            receivers.push(rx);
        }
        let registry = Arc::new(registry);

        let router = Arc::new(ClusterRouter::new(
            PeerAddress::new(config.node.address.as_str()),
            membership,
            transport,
            Arc::clone(&registry),
        ));

        let mut roles = HashMap::with_capacity(config.roles.len());

        for (role, rx) in config.roles.iter().zip(receivers) {
            let (downstream, flusher) = match &role.forward_to {
                Some(target) => {
                    let forwarder = Arc::new(RemoteForwarder::new(Arc::clone(&router), target.as_str()));
                    (forwarder as Arc<dyn Downstream<M>>, None)
                },
                None => {
                    let dao = self.daos.remove(&role.name).ok_or_else(|| {
                        MeterflowError::config(format!("no storage configured for role '{}'", role.name))
                    })?;
                    let flusher = Arc::new(PersistenceFlusher::new(
                        role.name.as_str(),
                        dao,
                        role.need_merge_with_storage,
                    ));
                    (Arc::clone(&flusher) as Arc<dyn Downstream<M>>, Some(flusher))
                },
            };

            let cache = Arc::new(AggregationCache::with_poll_interval(
                role.max_identities(&config.aggregation),
                config.aggregation.drain_poll_interval,
            ));
            let aggregator = LocalAggregator::new(role.name.as_str(), Arc::clone(&cache), downstream);
            let stats = aggregator.stats();

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let task = tokio::spawn(aggregator.run(rx, shutdown_rx));
            roles.insert(
                role.name.clone(),
                RoleHandle {
                    cache,
                    stats,
                    flusher,
                    forward_to: role.forward_to.clone(),
                    shutdown_tx,
                    task,
                },
            );
        }

        let (ticker_tx, ticker_rx) = watch::channel(false);
        let ticker = FlushTicker::new(Arc::clone(&registry), config.aggregation.flush_interval);
        let ticker_task = tokio::spawn(ticker.run(ticker_rx));

        tracing::info!(
            address = %config.node.address,
            roles = config.roles.len(),
            peers = config.cluster.peers.len(),
            "Node started"
        );

        Ok(Node {
            config,
            registry,
            router,
            roles,
            ticker_tx,
            ticker_task,
        })
    }
}

/// A running aggregation node.
pub struct Node<M: Metric> {
    config: Config,
    registry: Arc<RoleRegistry<M>>,
    router: Arc<ClusterRouter<M>>,
    roles: HashMap<String, RoleHandle<M>>,
    ticker_tx: watch::Sender<bool>,
    ticker_task: JoinHandle<()>,
}

impl<M: Metric> Node<M> {
    pub fn builder(config: Config) -> NodeBuilder<M> {
        NodeBuilder::new(config)
    }

    pub fn address(&self) -> &PeerAddress {
        self.router.self_address()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Entry point for a freshly produced record of `role`.
    ///
    /// Pre-aggregating roles (`forward_to`) always take the record locally;
    /// every other role goes through the router to the identity's owner.
    pub async fn ingest(&self, role: &str, record: M) -> Dispatch {
        let pre_aggregate = self.config.role(role).is_some_and(|r| r.forward_to.is_some());
        if !pre_aggregate {
            return self.router.dispatch(role, record).await;
        }

        match self.registry.offer(role, record) {
            Ok(()) => Dispatch::Local,
            Err(e) => {
                tracing::debug!(role, "Local ingest dropped: {}", e);
                Dispatch::Dropped
            },
        }
    }

    /// Request a batch boundary on every role now.
    pub fn flush_now(&self) {
        self.registry.tick_all();
    }

    /// Local mailboxes, e.g. for registering this node with a transport.
    pub fn registry(&self) -> &Arc<RoleRegistry<M>> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<ClusterRouter<M>> {
        &self.router
    }

    pub fn router_stats(&self) -> RouterSnapshot {
        self.router.stats()
    }

    pub fn stats(&self, role: &str) -> Option<RoleStats> {
        self.roles.get(role).map(|handle| RoleStats {
            aggregator: handle.stats.snapshot(),
            flush: handle.flusher.as_ref().map(|f| f.stats()),
        })
    }

    /// Identities currently in the active generation of `role`.
    pub fn pending(&self, role: &str) -> Option<usize> {
        self.roles.get(role).map(|handle| handle.cache.len())
    }

    /// Stop ticking, then let every aggregator drain its mailbox and flush once
    /// more.
    ///
    /// Roles stop in forwarding order: a role is only signalled once every role
    /// forwarding into it has finished its final flush.
    pub async fn shutdown(self) -> Result<()> {
        tracing::info!(address = %self.config.node.address, "Shutting down node");
        // Receivers may already be gone if a task ended on its own.
        let _ = self.ticker_tx.send(true);
        self.ticker_task.await?;

        let mut remaining = self.roles;
        while !remaining.is_empty() {
            let mut stage: Vec<String> = remaining
                .keys()
                .filter(|name| {
                    !remaining
                        .values()
                        .any(|handle| handle.forward_to.as_deref() == Some(name.as_str()))
                })
                .cloned()
                .collect();
            if stage.is_empty() {
                // Forwarding cycle: stop the rest together.
                stage = remaining.keys().cloned().collect();
            }

            let handles: Vec<RoleHandle<M>> = stage.iter().filter_map(|name| remaining.remove(name)).collect();
            for handle in &handles {
                let _ = handle.shutdown_tx.send(true);
            }
            for handle in handles {
                handle.task.await?;
            }
            tracing::debug!(roles = ?stage, "Roles stopped");
        }
        Ok(())
    }
}
