//! meterflow - streaming metrics aggregation core for APM backends.
//!
//! Raw metric records are produced continuously by trace analysis. meterflow
//! folds them into per-identity aggregates inside a time bucket, keeps exactly
//! one authoritative aggregator per identity across the cluster, and
//! periodically reconciles the aggregates with storage.
//!
//! # Architecture
//!
//! - `model`: columns with merge operators, schemas, records, time buckets
//! - `cache`: double-buffered aggregation cache with hold/release
//! - `aggregator`: per-role mailbox, aggregation loop and flush ticker
//! - `cluster`: `hash(id) mod N` routing over a membership snapshot
//! - `persistence`: storage merge and single-batch flush through a DAO
//! - `pipeline`: wires all of the above into a running [`Node`]
//! - `core`: configuration and errors
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use meterflow_lib::core::{ConfigBuilder, RoleConfig};
//! use meterflow_lib::model::ServiceCallsMetric;
//! use meterflow_lib::persistence::{InMemoryMetricsDao, MetricsDao};
//! use meterflow_lib::Node;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigBuilder::new()
//!         .role(RoleConfig::new(ServiceCallsMetric::ROLE, true))
//!         .build()?;
//!     let dao: Arc<dyn MetricsDao<ServiceCallsMetric>> = Arc::new(InMemoryMetricsDao::new());
//!     let node = Node::builder(config).dao(ServiceCallsMetric::ROLE, dao).start()?;
//!
//!     let call = ServiceCallsMetric::observe(202401011200, "cart", "pod-1", 12, false)?;
//!     node.ingest(ServiceCallsMetric::ROLE, call).await;
//!
//!     node.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod aggregator;
pub mod cache;
pub mod cli;
pub mod cluster;
pub mod core;
pub mod model;
pub mod persistence;
pub mod pipeline;

// Re-export core types for convenience
pub use crate::core::{Config, MeterflowError, Result};
pub use crate::pipeline::{Node, NodeBuilder};
