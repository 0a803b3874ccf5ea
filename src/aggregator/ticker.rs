//! Periodic batch boundary scheduler.

use super::registry::RoleRegistry;
use crate::model::Metric;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Delivers a [`super::WorkerMessage::FlushTick`] to every registered role at a
/// fixed interval.
pub struct FlushTicker<M> {
    registry: Arc<RoleRegistry<M>>,
    period: Duration,
}

impl<M: Metric> FlushTicker<M> {
    pub fn new(registry: Arc<RoleRegistry<M>>, period: Duration) -> Self {
        Self { registry, period }
    }

    /// Tick until shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticks = interval(self.period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of an interval fires immediately.
        ticks.tick().await;

        loop {
            tokio::select! {
                _ = ticks.tick() => self.registry.tick_all(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                },
            }
        }
        tracing::debug!("Flush ticker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{Mailbox, WorkerMessage};
    use crate::model::ServiceCallsMetric;

    #[tokio::test]
    async fn test_ticks_every_role() {
        let mut registry = RoleRegistry::<ServiceCallsMetric>::new();
        let (calls, mut calls_rx) = Mailbox::channel("service_calls", 8);
        let (latency, mut latency_rx) = Mailbox::channel("endpoint_latency", 8);
        registry.register(calls).unwrap();
        registry.register(latency).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticker = FlushTicker::new(Arc::new(registry), Duration::from_millis(5));
        let task = tokio::spawn(ticker.run(shutdown_rx));

        assert!(matches!(calls_rx.recv().await, Some(WorkerMessage::FlushTick)));
        assert!(matches!(latency_rx.recv().await, Some(WorkerMessage::FlushTick)));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
