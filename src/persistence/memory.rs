//! In-memory DAO, used by the binary's demo mode and by tests.

use super::dao::{BatchItem, MetricsDao};
use crate::core::{MeterflowError, Result};
use crate::model::{Metric, MetricId, Schema};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Keyed row store with upsert semantics.
pub struct InMemoryMetricsDao<M> {
    rows: DashMap<MetricId, M>,
    failing: AtomicBool,
    batches: AtomicU64,
    get_calls: AtomicU64,
}

impl<M: Metric> InMemoryMetricsDao<M> {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            failing: AtomicBool::new(false),
            batches: AtomicU64::new(0),
            get_calls: AtomicU64::new(0),
        }
    }

    /// Store a row directly, bypassing the batch path.
    pub fn seed(&self, record: M) {
        self.rows.insert(record.id().clone(), record);
    }

    /// Make every following call fail with a storage error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn row(&self, id: &MetricId) -> Option<M> {
        self.rows.get(id).map(|entry| entry.value().clone())
    }

    pub fn rows(&self) -> Vec<M> {
        self.rows.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Successful `execute_batch` calls.
    pub fn batch_count(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::Relaxed)
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MeterflowError::storage("storage unavailable"));
        }
        Ok(())
    }
}

impl<M: Metric> Default for InMemoryMetricsDao<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl<M: Metric> MetricsDao<M> for InMemoryMetricsDao<M> {
    async fn get(&self, id: &MetricId, _schema: &Schema) -> Result<Option<M>> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        Ok(self.row(id))
    }

    async fn execute_batch(&self, items: Vec<BatchItem<M>>) -> Result<()> {
        self.check_available()?;
        for item in items {
            let record = item.into_record();
            self.rows.insert(record.id().clone(), record);
        }
        self.batches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
