//! Single-consumer aggregation loop of one role partition.

use super::mailbox::{MailboxReceiver, WorkerMessage};
use super::Downstream;
use crate::cache::{AggregationCache, MergeOutcome};
use crate::model::{Metric, MetricId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Counters of one aggregator, updated lock-free from the worker loop.
#[derive(Debug, Default)]
pub struct AggregatorStats {
    received: AtomicU64,
    inserted: AtomicU64,
    merged: AtomicU64,
    rejected: AtomicU64,
    swaps: AtomicU64,
    skipped_swaps: AtomicU64,
    flushed_records: AtomicU64,
}

/// Point-in-time copy of [`AggregatorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorSnapshot {
    /// Records taken off the mailbox
    pub received: u64,
    /// Records that opened a new identity
    pub inserted: u64,
    /// Records folded into an existing identity
    pub merged: u64,
    /// Records shed by the identity threshold
    pub rejected: u64,
    /// Successful generation swaps
    pub swaps: u64,
    /// Boundaries skipped because the previous drain was not finished
    pub skipped_swaps: u64,
    /// Records handed downstream
    pub flushed_records: u64,
}

impl AggregatorStats {
    pub fn snapshot(&self) -> AggregatorSnapshot {
        AggregatorSnapshot {
            received: self.received.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            merged: self.merged.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            swaps: self.swaps.load(Ordering::Relaxed),
            skipped_swaps: self.skipped_swaps.load(Ordering::Relaxed),
            flushed_records: self.flushed_records.load(Ordering::Relaxed),
        }
    }
}

/// Local aggregator: drains one mailbox into one [`AggregationCache`] and hands
/// frozen generations downstream at every batch boundary.
pub struct LocalAggregator<M: Metric> {
    role: String,
    cache: Arc<AggregationCache<M>>,
    downstream: Arc<dyn Downstream<M>>,
    stats: Arc<AggregatorStats>,
}

impl<M: Metric> LocalAggregator<M> {
    pub fn new(
        role: impl Into<String>,
        cache: Arc<AggregationCache<M>>,
        downstream: Arc<dyn Downstream<M>>,
    ) -> Self {
        Self {
            role: role.into(),
            cache,
            downstream,
            stats: Arc::new(AggregatorStats::default()),
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn cache(&self) -> &Arc<AggregationCache<M>> {
        &self.cache
    }

    pub fn stats(&self) -> Arc<AggregatorStats> {
        Arc::clone(&self.stats)
    }

    /// Merge one record into the active generation.
    ///
    /// Hitting the identity threshold forces a batch boundary right away.
    pub async fn handle_record(&self, record: M) -> MergeOutcome {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        let outcome = self.cache.merge_or_insert(record);

        match outcome {
            MergeOutcome::Inserted => {
                self.stats.inserted.fetch_add(1, Ordering::Relaxed);
                if self.cache.is_full() {
                    tracing::debug!(role = %self.role, "Identity threshold reached, forcing flush");
                    self.on_boundary().await;
                }
            },
            MergeOutcome::Merged => {
                self.stats.merged.fetch_add(1, Ordering::Relaxed);
            },
            MergeOutcome::Rejected => {
                let rejected = self.stats.rejected.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(role = %self.role, rejected, "Generation full, new identity shed");
                self.on_boundary().await;
            },
        }

        outcome
    }

    /// Batch boundary: swap generations and forward the frozen one.
    ///
    /// Returns false when the swap was skipped because the previous frozen
    /// generation is still pending; the next boundary retries.
    pub async fn on_boundary(&self) -> bool {
        if !self.cache.try_swap() {
            self.stats.skipped_swaps.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(role = %self.role, "Swap skipped, previous generation not drained");
            return false;
        }
        self.stats.swaps.fetch_add(1, Ordering::Relaxed);

        if let Some(generation) = self.drain().await {
            self.forward(generation).await;
        }
        true
    }

    async fn drain(&self) -> Option<HashMap<MetricId, M>> {
        if self.cache.frozen_holders() == 0 {
            return Some(self.cache.drain());
        }

        let cache = Arc::clone(&self.cache);
        match tokio::task::spawn_blocking(move || cache.drain()).await {
            Ok(generation) => Some(generation),
            Err(e) => {
                tracing::error!(role = %self.role, "Drain task failed: {}", e);
                None
            },
        }
    }

    async fn forward(&self, generation: HashMap<MetricId, M>) {
        if generation.is_empty() {
            return;
        }
        let count = generation.len() as u64;
        tracing::debug!(role = %self.role, records = count, "Forwarding frozen generation");
        self.downstream.accept(&self.role, generation).await;
        self.stats.flushed_records.fetch_add(count, Ordering::Relaxed);
    }

    /// Drain whatever is left once, regardless of tick timing.
    pub async fn flush_remaining(&self) {
        if self.cache.has_frozen() {
            if let Some(generation) = self.drain().await {
                self.forward(generation).await;
            }
        }
        self.on_boundary().await;
    }

    /// Consume the mailbox until it closes or shutdown is signalled.
    ///
    /// On exit, queued messages are still processed and the remaining
    /// generation is drained once.
    pub async fn run(self, mut rx: MailboxReceiver<M>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(role = %self.role, "Aggregator started");

        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                },
            }
        }

        rx.close();
        while let Some(message) = rx.recv().await {
            self.handle(message).await;
        }
        self.flush_remaining().await;

        let stats = self.stats.snapshot();
        tracing::info!(
            role = %self.role,
            received = stats.received,
            flushed = stats.flushed_records,
            rejected = stats.rejected,
            "Aggregator stopped"
        );
    }

    async fn handle(&self, message: WorkerMessage<M>) {
        match message {
            WorkerMessage::Record(record) => {
                self.handle_record(record).await;
            },
            WorkerMessage::FlushTick => {
                self.on_boundary().await;
            },
        }
    }
}
