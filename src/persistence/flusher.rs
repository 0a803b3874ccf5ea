//! Persistence flush of drained generations.

use super::dao::{BatchItem, MetricsDao};
use crate::aggregator::Downstream;
use crate::model::{Metric, MetricId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct FlushStats {
    batches: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    failed_batches: AtomicU64,
    probe_errors: AtomicU64,
}

/// Point-in-time flusher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSnapshot {
    /// Batches accepted by storage
    pub batches: u64,
    /// Insert items written
    pub inserts: u64,
    /// Update items written
    pub updates: u64,
    /// Batches rejected by storage and discarded
    pub failed_batches: u64,
    /// Records skipped because the storage probe failed
    pub probe_errors: u64,
}

/// Outcome of flushing one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub inserts: usize,
    pub updates: usize,
    /// False when storage rejected the batch and it was discarded.
    pub persisted: bool,
}

/// Reconciles drained aggregates with stored rows and writes one batch.
pub struct PersistenceFlusher<M: Metric> {
    role: String,
    dao: Arc<dyn MetricsDao<M>>,
    need_merge_with_storage: bool,
    stats: FlushStats,
}

impl<M: Metric> PersistenceFlusher<M> {
    pub fn new(role: impl Into<String>, dao: Arc<dyn MetricsDao<M>>, need_merge_with_storage: bool) -> Self {
        Self {
            role: role.into(),
            dao,
            need_merge_with_storage,
            stats: FlushStats::default(),
        }
    }

    /// Decide insert vs. update for every record; inserts first, updates after.
    ///
    /// Records whose storage probe fails are left out of the batch.
    pub async fn prepare_batch(&self, generation: HashMap<MetricId, M>) -> Vec<BatchItem<M>> {
        if !self.need_merge_with_storage {
            return generation.into_values().map(BatchItem::Insert).collect();
        }

        let mut inserts = Vec::with_capacity(generation.len());
        let mut updates = Vec::new();

        for (id, record) in generation {
            match self.dao.get(&id, record.schema()).await {
                Ok(Some(mut stored)) => {
                    stored.merge_from(&record);
                    updates.push(BatchItem::Update(stored));
                },
                Ok(None) => inserts.push(BatchItem::Insert(record)),
                Err(e) => {
                    self.stats.probe_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(role = %self.role, id = %id, "Storage probe failed, record dropped: {}", e);
                },
            }
        }

        inserts.extend(updates);
        inserts
    }

    /// Flush one generation. Storage failures are logged and the batch is discarded.
    pub async fn flush(&self, generation: HashMap<MetricId, M>) -> FlushReport {
        let items = self.prepare_batch(generation).await;
        let inserts = items.iter().filter(|item| item.is_insert()).count();
        let updates = items.len() - inserts;

        if items.is_empty() {
            return FlushReport {
                inserts,
                updates,
                persisted: true,
            };
        }

        match self.dao.execute_batch(items).await {
            Ok(()) => {
                self.stats.batches.fetch_add(1, Ordering::Relaxed);
                self.stats.inserts.fetch_add(inserts as u64, Ordering::Relaxed);
                self.stats.updates.fetch_add(updates as u64, Ordering::Relaxed);
                tracing::debug!(role = %self.role, inserts, updates, "Generation persisted");
                FlushReport {
                    inserts,
                    updates,
                    persisted: true,
                }
            },
            Err(e) => {
                self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    role = %self.role,
                    inserts,
                    updates,
                    "Storage batch failed, generation discarded: {}",
                    e
                );
                FlushReport {
                    inserts,
                    updates,
                    persisted: false,
                }
            },
        }
    }

    pub fn stats(&self) -> FlushSnapshot {
        FlushSnapshot {
            batches: self.stats.batches.load(Ordering::Relaxed),
            inserts: self.stats.inserts.load(Ordering::Relaxed),
            updates: self.stats.updates.load(Ordering::Relaxed),
            failed_batches: self.stats.failed_batches.load(Ordering::Relaxed),
            probe_errors: self.stats.probe_errors.load(Ordering::Relaxed),
        }
    }
}

#[async_trait::async_trait]
impl<M: Metric> Downstream<M> for PersistenceFlusher<M> {
    async fn accept(&self, _role: &str, generation: HashMap<MetricId, M>) {
        self.flush(generation).await;
    }
}
