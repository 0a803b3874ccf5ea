//! Storage DAO contract.

use crate::core::Result;
use crate::model::{Metric, MetricId, Schema};

/// One storage operation of a flush batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem<M> {
    /// Identity not in storage yet.
    Insert(M),
    /// Identity already stored; carries the merged row.
    Update(M),
}

impl<M: Metric> BatchItem<M> {
    pub fn record(&self) -> &M {
        match self {
            BatchItem::Insert(record) | BatchItem::Update(record) => record,
        }
    }

    pub fn into_record(self) -> M {
        match self {
            BatchItem::Insert(record) | BatchItem::Update(record) => record,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, BatchItem::Insert(_))
    }
}

/// Per-role storage surface. Transactionless; upserts must be idempotent.
#[async_trait::async_trait]
pub trait MetricsDao<M: Metric>: Send + Sync {
    /// Previously stored row for `id`, if any.
    async fn get(&self, id: &MetricId, schema: &Schema) -> Result<Option<M>>;

    /// Apply a whole flush batch in one call.
    async fn execute_batch(&self, items: Vec<BatchItem<M>>) -> Result<()>;
}
