//! Bounded, non-blocking inbound queue of a worker role.

use crate::core::{MeterflowError, Result};
use crate::model::Metric;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Messages consumed by a [`super::LocalAggregator`].
#[derive(Debug, Clone)]
pub enum WorkerMessage<M> {
    /// A domain record to merge.
    Record(M),
    /// Batch boundary: swap generations and hand the frozen one downstream.
    FlushTick,
}

/// Receiving half, owned by exactly one aggregator task.
pub type MailboxReceiver<M> = mpsc::Receiver<WorkerMessage<M>>;

/// Producer handle to a role's mailbox. Cheap to clone.
///
/// Enqueueing never waits: when the queue is saturated the record is dropped
/// and counted. That is the backpressure policy of the whole pipeline.
pub struct Mailbox<M> {
    role: Arc<str>,
    tx: mpsc::Sender<WorkerMessage<M>>,
    dropped: Arc<AtomicU64>,
}

impl<M> Clone for Mailbox<M> {
    fn clone(&self) -> Self {
        Self {
            role: Arc::clone(&self.role),
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<M: Metric> Mailbox<M> {
    /// Create a mailbox of `capacity` messages for `role`.
    pub fn channel(role: &str, capacity: usize) -> (Self, MailboxReceiver<M>) {
        let (tx, rx) = mpsc::channel(capacity);
        let mailbox = Self {
            role: Arc::from(role),
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (mailbox, rx)
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Enqueue a record without waiting.
    pub fn offer(&self, record: M) -> Result<()> {
        match self.tx.try_send(WorkerMessage::Record(record)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(role = %self.role, dropped, "Mailbox full, record dropped");
                Err(MeterflowError::MailboxFull {
                    role: self.role.to_string(),
                })
            },
            Err(TrySendError::Closed(_)) => Err(MeterflowError::MailboxClosed {
                role: self.role.to_string(),
            }),
        }
    }

    /// Deliver a batch boundary signal without waiting.
    ///
    /// A full queue means the worker is already behind; the boundary is simply
    /// picked up on the next tick.
    pub fn tick(&self) -> Result<()> {
        match self.tx.try_send(WorkerMessage::FlushTick) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::debug!(role = %self.role, "Mailbox full, flush tick skipped");
                Err(MeterflowError::MailboxFull {
                    role: self.role.to_string(),
                })
            },
            Err(TrySendError::Closed(_)) => Err(MeterflowError::MailboxClosed {
                role: self.role.to_string(),
            }),
        }
    }

    /// Records dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Messages currently queued.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
