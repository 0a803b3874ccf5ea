//! Local aggregation stage.
//!
//! Each role partition runs one [`LocalAggregator`] task that consumes its own
//! bounded [`Mailbox`]. Records are merged into the role's aggregation cache;
//! flush ticks swap generations and hand the frozen one to a [`Downstream`]
//! stage, either the persistence flusher or the cluster router.

pub mod mailbox;
pub mod registry;
pub mod ticker;
pub mod worker;

pub use mailbox::{Mailbox, MailboxReceiver, WorkerMessage};
pub use registry::RoleRegistry;
pub use ticker::FlushTicker;
pub use worker::{AggregatorSnapshot, AggregatorStats, LocalAggregator};

use crate::model::{Metric, MetricId};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Stage that receives a drained generation.
///
/// Implementations are best-effort: failures are logged and counted inside,
/// never returned to the aggregator.
#[async_trait::async_trait]
pub trait Downstream<M: Metric>: Send + Sync {
    /// Take ownership of one drained generation produced by `role`.
    async fn accept(&self, role: &str, generation: HashMap<MetricId, M>);
}

/// Downstream that keeps every generation it receives, in arrival order.
pub struct CollectingDownstream<M> {
    batches: Mutex<Vec<(String, HashMap<MetricId, M>)>>,
}

impl<M: Metric> CollectingDownstream<M> {
    /// Everything received so far.
    pub fn batches(&self) -> Vec<(String, HashMap<MetricId, M>)> {
        self.batches.lock().clone()
    }

    /// Remove and return everything received so far.
    pub fn take(&self) -> Vec<(String, HashMap<MetricId, M>)> {
        std::mem::take(&mut *self.batches.lock())
    }
}

impl<M> Default for CollectingDownstream<M> {
    fn default() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl<M: Metric> Downstream<M> for CollectingDownstream<M> {
    async fn accept(&self, role: &str, generation: HashMap<MetricId, M>) {
        self.batches.lock().push((role.to_string(), generation));
    }
}
