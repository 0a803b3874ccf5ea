//! End-to-end aggregation behaviour on a single node.

mod common;

use common::*;
use meterflow_lib::cache::{AggregationCache, MergeOutcome};
use meterflow_lib::cluster::{select_peer, Dispatch, PeerAddress};
use meterflow_lib::core::{Config, ConfigBuilder, RoleConfig};
use meterflow_lib::model::{Metric, MetricId, Record};
use meterflow_lib::persistence::{BatchItem, FlushReport, MetricsDao, PersistenceFlusher};
use meterflow_lib::Node;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn single_role(need_merge: bool) -> Config {
    ConfigBuilder::new()
        .flush_interval(Duration::from_secs(3600))
        .role(RoleConfig::new("counter", need_merge))
        .build()
        .unwrap()
}

fn start(config: Config, dao: &Arc<RecordingDao>) -> Node<Record> {
    Node::builder(config)
        .dao("counter", Arc::clone(dao) as Arc<dyn MetricsDao<Record>>)
        .start()
        .unwrap()
}

fn generation(records: Vec<Record>) -> HashMap<MetricId, Record> {
    records.into_iter().map(|r| (r.id().clone(), r)).collect()
}

#[test]
fn test_add_column_is_order_independent() {
    for order in [[1, 2], [2, 1]] {
        let cache = AggregationCache::new(1000);
        for count in order {
            cache.merge_or_insert(counter!("A", count));
        }
        assert_eq!(count_of(&cache.get(&MetricId::new("A")).unwrap()), 3);
    }
}

#[test]
fn test_cover_column_keeps_last_write() {
    let cache = AggregationCache::new(1000);
    cache.merge_or_insert(counter!("B", 0, "x"));
    cache.merge_or_insert(counter!("B", 0, "y"));
    assert_eq!(name_of(&cache.get(&MetricId::new("B")).unwrap()), "y");
}

#[test]
fn test_route_is_stable_for_three_peers() {
    let peers: Vec<PeerAddress> = ["a:1", "b:1", "c:1"].into_iter().map(PeerAddress::from).collect();
    let id = MetricId::new("A");
    assert_eq!(select_peer(&id, &peers), select_peer(&id, &peers));
}

#[test]
fn test_threshold_sheds_new_identities_only() {
    let cache = AggregationCache::new(1000);
    for i in 0..1000 {
        assert_eq!(cache.merge_or_insert(counter!(&format!("id-{}", i), 1)), MergeOutcome::Inserted);
    }
    assert_eq!(cache.merge_or_insert(counter!("id-1000", 1)), MergeOutcome::Rejected);
    assert_eq!(cache.merge_or_insert(counter!("id-7", 1)), MergeOutcome::Merged);
    assert_eq!(count_of(&cache.get(&MetricId::new("id-7")).unwrap()), 2);
}

#[test]
fn test_second_swap_fails_until_drained() {
    let cache = AggregationCache::new(1000);
    cache.merge_or_insert(counter!("A", 1));

    assert!(cache.try_swap());
    assert!(!cache.try_swap());

    let drained = cache.drain();
    assert_eq!(drained.len(), 1);
    assert!(cache.try_swap());
}

#[tokio::test]
async fn test_flush_merges_with_stored_row() {
    let dao = Arc::new(RecordingDao::new());
    dao.inner().seed(counter!("C", 5));
    let node = start(single_role(true), &dao);

    assert_eq!(node.ingest("counter", counter!("C", 2)).await, Dispatch::Local);
    node.shutdown().await.unwrap();

    let batches = dao.batches();
    assert_eq!(batches.len(), 1);
    match &batches[0][..] {
        [BatchItem::Update(record)] => assert_eq!(count_of(record), 7),
        other => panic!("unexpected batch {:?}", other),
    }
    assert_eq!(count_of(&dao.inner().row(&MetricId::new("C")).unwrap()), 7);
}

#[tokio::test]
async fn test_append_only_role_never_probes() {
    let dao = Arc::new(RecordingDao::new());
    dao.inner().seed(counter!("C", 5));
    let flusher = PersistenceFlusher::new("counter", Arc::clone(&dao) as Arc<dyn MetricsDao<Record>>, false);

    let report = flusher.flush(generation(vec![counter!("C", 2), counter!("D", 1)])).await;

    assert_eq!(report.inserts, 2);
    assert_eq!(report.updates, 0);
    assert_eq!(dao.inner().get_calls(), 0);
    assert!(dao.batches()[0].iter().all(BatchItem::is_insert));
}

#[tokio::test]
async fn test_failed_lookup_skips_only_that_record() {
    let dao = Arc::new(FailingProbeDao::new("B"));
    dao.inner().seed(counter!("A", 5));
    let flusher = PersistenceFlusher::new("counter", Arc::clone(&dao) as Arc<dyn MetricsDao<Record>>, true);

    let items = flusher
        .prepare_batch(generation(vec![counter!("A", 2), counter!("B", 1), counter!("C", 4)]))
        .await;
    let ids: Vec<&str> = items.iter().map(|item| item.record().id().as_str()).collect();
    assert_eq!(ids, vec!["C", "A"]);
    assert_eq!(flusher.stats().probe_errors, 1);
    assert_eq!(dao.inner().batch_count(), 0);
}

#[tokio::test]
async fn test_failed_lookup_still_writes_the_batch() {
    let dao = Arc::new(FailingProbeDao::new("B"));
    dao.inner().seed(counter!("A", 5));
    let flusher = PersistenceFlusher::new("counter", Arc::clone(&dao) as Arc<dyn MetricsDao<Record>>, true);

    let report = flusher
        .flush(generation(vec![counter!("A", 2), counter!("B", 1), counter!("C", 4)]))
        .await;

    assert_eq!(
        report,
        FlushReport {
            inserts: 1,
            updates: 1,
            persisted: true
        }
    );
    assert_eq!(dao.inner().batch_count(), 1);
    assert_eq!(count_of(&dao.inner().row(&MetricId::new("A")).unwrap()), 7);
    assert_eq!(count_of(&dao.inner().row(&MetricId::new("C")).unwrap()), 4);
    assert!(dao.inner().row(&MetricId::new("B")).is_none());

    let stats = flusher.stats();
    assert_eq!(stats.probe_errors, 1);
    assert_eq!(stats.batches, 1);
}

#[tokio::test]
async fn test_batch_puts_inserts_before_updates() {
    let dao = Arc::new(RecordingDao::new());
    dao.inner().seed(counter!("known", 1));
    let node = start(single_role(true), &dao);

    node.ingest("counter", counter!("known", 1)).await;
    node.ingest("counter", counter!("fresh", 1)).await;
    node.shutdown().await.unwrap();

    let batch = &dao.batches()[0];
    let kinds: Vec<bool> = batch.iter().map(BatchItem::is_insert).collect();
    assert_eq!(kinds, vec![true, false]);
}

#[tokio::test]
async fn test_full_generation_forces_flush() {
    let mut config = single_role(true);
    config.roles[0].max_identities = Some(2);
    let dao = Arc::new(RecordingDao::new());
    let node = start(config, &dao);

    for id in ["a", "b", "c"] {
        node.ingest("counter", counter!(id, 1)).await;
    }
    node.shutdown().await.unwrap();

    let sizes: Vec<usize> = dao.batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 1]);
    assert_eq!(dao.inner().len(), 3);
}

fn with_pre_aggregation() -> Config {
    ConfigBuilder::new()
        .flush_interval(Duration::from_secs(3600))
        .role(RoleConfig::new("counter", true))
        .role(RoleConfig::new("counter_l1", false).forward_to("counter"))
        .build()
        .unwrap()
}

async fn pre_aggregate_then_shutdown() -> Arc<RecordingDao> {
    let dao = Arc::new(RecordingDao::new());
    let node = start(with_pre_aggregation(), &dao);

    assert_eq!(node.ingest("counter_l1", counter!("A", 5)).await, Dispatch::Local);
    assert_eq!(node.ingest("counter_l1", counter!("A", 2)).await, Dispatch::Local);
    node.shutdown().await.unwrap();
    dao
}

#[tokio::test]
async fn test_shutdown_flushes_pre_aggregation_into_target() {
    let dao = pre_aggregate_then_shutdown().await;

    let row = dao.inner().row(&MetricId::new("A")).expect("pre-aggregated row persisted");
    assert_eq!(count_of(&row), 7);
    assert_eq!(dao.batches().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_order_holds_on_multi_thread_runtime() {
    for _ in 0..20 {
        let dao = pre_aggregate_then_shutdown().await;
        assert_eq!(dao.inner().row(&MetricId::new("A")).map(|r| count_of(&r)), Some(7));
    }
}

#[tokio::test]
async fn test_storage_failure_drops_generation() {
    let dao = Arc::new(RecordingDao::new());
    let node = start(single_role(false), &dao);
    dao.inner().set_failing(true);

    node.ingest("counter", counter!("lost", 1)).await;
    node.shutdown().await.unwrap();

    assert!(dao.inner().is_empty());
}

#[tokio::test]
async fn test_ticks_flush_periodically() {
    let config = ConfigBuilder::new()
        .flush_interval(Duration::from_millis(20))
        .role(RoleConfig::new("counter", true))
        .build()
        .unwrap();
    let dao = Arc::new(RecordingDao::new());
    let node = start(config, &dao);

    node.ingest("counter", counter!("A", 4)).await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while dao.inner().row(&MetricId::new("A")).is_none() {
        assert!(tokio::time::Instant::now() < deadline, "tick never flushed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let stats = node.stats("counter").unwrap();
    assert!(stats.aggregator.swaps >= 1);
    node.shutdown().await.unwrap();
}
