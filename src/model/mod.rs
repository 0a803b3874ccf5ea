//! Metric data model: columns, schemas, records and time buckets.

pub mod bucket;
pub mod column;
pub mod metrics;
pub mod record;
pub mod schema;

pub use bucket::{time_bucket, Granularity};
pub use column::{ColumnKind, ColumnValue, MergeOperator};
pub use metrics::{EndpointLatencyGauge, ServiceCallsMetric};
pub use record::{Metric, MetricId, Record};
pub use schema::{Column, Schema};
