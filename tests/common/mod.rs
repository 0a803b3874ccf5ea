//! Common test utilities and fixtures.

#![allow(dead_code)]

use meterflow_lib::cluster::{PeerAddress, Transport};
use meterflow_lib::core::{MeterflowError, Result};
use meterflow_lib::model::{ColumnKind, ColumnValue, MergeOperator, Metric, MetricId, Record, Schema};
use meterflow_lib::persistence::{BatchItem, InMemoryMetricsDao, MetricsDao};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const BUCKET: i64 = 202401011200;

/// `count` (Add) and `name` (Cover) over an identity column.
pub static COUNTER_SCHEMA: Lazy<Arc<Schema>> = Lazy::new(|| {
    Schema::builder("counter")
        .column("key", ColumnKind::String, MergeOperator::Identity)
        .column("count", ColumnKind::Long, MergeOperator::Add)
        .column("name", ColumnKind::String, MergeOperator::Cover)
        .build()
});

/// Test fixture builder for counter records with sensible defaults.
pub struct TestRecordBuilder {
    id: String,
    count: i64,
    name: String,
}

impl TestRecordBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            count: 0,
            name: String::new(),
        }
    }

    pub fn count(mut self, count: i64) -> Self {
        self.count = count;
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn build(self) -> Record {
        Record::new(Arc::clone(&COUNTER_SCHEMA), MetricId::new(self.id.as_str()), BUCKET)
            .with("key", ColumnValue::String(self.id))
            .with("count", ColumnValue::Long(self.count))
            .with("name", ColumnValue::String(self.name))
    }
}

/// Macro for creating a counter record quickly.
#[macro_export]
macro_rules! counter {
    ($id:expr, $count:expr) => {
        TestRecordBuilder::new($id).count($count).build()
    };
    ($id:expr, $count:expr, $name:expr) => {
        TestRecordBuilder::new($id).count($count).name($name).build()
    };
}

pub fn count_of(record: &Record) -> i64 {
    record
        .get("count")
        .and_then(ColumnValue::as_long)
        .expect("count column")
}

pub fn name_of(record: &Record) -> &str {
    record.get("name").and_then(ColumnValue::as_str).expect("name column")
}

/// DAO wrapper that keeps every batch it was handed, in call order.
#[derive(Default)]
pub struct RecordingDao {
    inner: InMemoryMetricsDao<Record>,
    batches: Mutex<Vec<Vec<BatchItem<Record>>>>,
}

impl RecordingDao {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryMetricsDao<Record> {
        &self.inner
    }

    pub fn batches(&self) -> Vec<Vec<BatchItem<Record>>> {
        self.batches.lock().clone()
    }
}

#[async_trait::async_trait]
impl MetricsDao<Record> for RecordingDao {
    async fn get(&self, id: &MetricId, schema: &Schema) -> Result<Option<Record>> {
        self.inner.get(id, schema).await
    }

    async fn execute_batch(&self, items: Vec<BatchItem<Record>>) -> Result<()> {
        self.batches.lock().push(items.clone());
        self.inner.execute_batch(items).await
    }
}

/// Transport wrapper that counts deliveries and can cut off single peers.
pub struct RecordingTransport<T> {
    inner: Arc<T>,
    sent: AtomicU64,
    unreachable: Mutex<Vec<PeerAddress>>,
}

impl<T> RecordingTransport<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self {
            inner,
            sent: AtomicU64::new(0),
            unreachable: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn cut(&self, peer: &PeerAddress) {
        self.unreachable.lock().push(peer.clone());
    }
}

#[async_trait::async_trait]
impl<M: Metric, T: Transport<M>> Transport<M> for RecordingTransport<T> {
    async fn send(&self, peer: &PeerAddress, role: &str, record: M) -> Result<()> {
        if self.unreachable.lock().contains(peer) {
            return Err(MeterflowError::transport(format!("peer {} cut off", peer)));
        }
        self.inner.send(peer, role, record).await?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// DAO whose `get` fails for one identity; every other call goes through.
pub struct FailingProbeDao {
    inner: InMemoryMetricsDao<Record>,
    failing_id: MetricId,
}

impl FailingProbeDao {
    pub fn new(failing_id: &str) -> Self {
        Self {
            inner: InMemoryMetricsDao::new(),
            failing_id: MetricId::new(failing_id),
        }
    }

    pub fn inner(&self) -> &InMemoryMetricsDao<Record> {
        &self.inner
    }
}

#[async_trait::async_trait]
impl MetricsDao<Record> for FailingProbeDao {
    async fn get(&self, id: &MetricId, schema: &Schema) -> Result<Option<Record>> {
        if id == &self.failing_id {
            return Err(MeterflowError::storage(format!("lookup of {} timed out", id)));
        }
        self.inner.get(id, schema).await
    }

    async fn execute_batch(&self, items: Vec<BatchItem<Record>>) -> Result<()> {
        self.inner.execute_batch(items).await
    }
}
