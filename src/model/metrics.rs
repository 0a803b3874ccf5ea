//! Strongly typed metric structs.
//!
//! Each struct declares its `(field, merge operator)` list once as a static
//! [`Schema`] and merges field by field without positional lookups.

use super::column::{ColumnKind, MergeOperator};
use super::record::{Metric, MetricId};
use super::schema::Schema;
use once_cell::sync::Lazy;
use std::sync::Arc;

static SERVICE_CALLS_SCHEMA: Lazy<Arc<Schema>> = Lazy::new(|| {
    Schema::builder(ServiceCallsMetric::ROLE)
        .column("service", ColumnKind::String, MergeOperator::Identity)
        .column("calls", ColumnKind::Long, MergeOperator::Add)
        .column("errors", ColumnKind::Long, MergeOperator::Add)
        .column("total_latency_ms", ColumnKind::Long, MergeOperator::Add)
        .column("instance", ColumnKind::String, MergeOperator::Cover)
        .build()
});

static ENDPOINT_LATENCY_SCHEMA: Lazy<Arc<Schema>> = Lazy::new(|| {
    Schema::builder(EndpointLatencyGauge::ROLE)
        .column("endpoint", ColumnKind::String, MergeOperator::Identity)
        .column("latency_ms", ColumnKind::Double, MergeOperator::Cover)
        .column("samples", ColumnKind::Long, MergeOperator::Add)
        .build()
});

/// Per-service call counters for one time bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCallsMetric {
    pub id: MetricId,
    pub time_bucket: i64,
    pub service: String,
    pub calls: i64,
    pub errors: i64,
    pub total_latency_ms: i64,
    /// Instance that reported last.
    pub instance: String,
}

impl ServiceCallsMetric {
    pub const ROLE: &'static str = "service_calls";

    /// One observed call.
    pub fn observe(
        time_bucket: i64,
        service: &str,
        instance: &str,
        latency_ms: i64,
        is_error: bool,
    ) -> crate::core::Result<Self> {
        Ok(Self {
            id: MetricId::compose(time_bucket, &[service])?,
            time_bucket,
            service: service.to_string(),
            calls: 1,
            errors: i64::from(is_error),
            total_latency_ms: latency_ms,
            instance: instance.to_string(),
        })
    }

    pub fn schema_handle() -> Arc<Schema> {
        Arc::clone(&SERVICE_CALLS_SCHEMA)
    }

    /// Mean latency over all calls in the bucket.
    pub fn avg_latency_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.calls as f64
        }
    }
}

impl Metric for ServiceCallsMetric {
    fn id(&self) -> &MetricId {
        &self.id
    }

    fn time_bucket(&self) -> i64 {
        self.time_bucket
    }

    fn schema(&self) -> &Schema {
        &SERVICE_CALLS_SCHEMA
    }

    fn merge_from(&mut self, incoming: &Self) {
        assert_eq!(self.id, incoming.id, "merge of records with different identities");
        let columns = SERVICE_CALLS_SCHEMA.columns();
        columns[0].merge.merge_label(&mut self.service, &incoming.service);
        columns[1].merge.merge_field(&mut self.calls, incoming.calls);
        columns[2].merge.merge_field(&mut self.errors, incoming.errors);
        columns[3]
            .merge
            .merge_field(&mut self.total_latency_ms, incoming.total_latency_ms);
        columns[4].merge.merge_label(&mut self.instance, &incoming.instance);
    }
}

/// Latest observed latency of an endpoint, gauge style.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointLatencyGauge {
    pub id: MetricId,
    pub time_bucket: i64,
    pub endpoint: String,
    pub latency_ms: f64,
    pub samples: i64,
}

impl EndpointLatencyGauge {
    pub const ROLE: &'static str = "endpoint_latency";

    pub fn observe(time_bucket: i64, service: &str, endpoint: &str, latency_ms: f64) -> crate::core::Result<Self> {
        Ok(Self {
            id: MetricId::compose(time_bucket, &[service, endpoint])?,
            time_bucket,
            endpoint: endpoint.to_string(),
            latency_ms,
            samples: 1,
        })
    }

    pub fn schema_handle() -> Arc<Schema> {
        Arc::clone(&ENDPOINT_LATENCY_SCHEMA)
    }
}

impl Metric for EndpointLatencyGauge {
    fn id(&self) -> &MetricId {
        &self.id
    }

    fn time_bucket(&self) -> i64 {
        self.time_bucket
    }

    fn schema(&self) -> &Schema {
        &ENDPOINT_LATENCY_SCHEMA
    }

    fn merge_from(&mut self, incoming: &Self) {
        assert_eq!(self.id, incoming.id, "merge of records with different identities");
        let columns = ENDPOINT_LATENCY_SCHEMA.columns();
        columns[0].merge.merge_label(&mut self.endpoint, &incoming.endpoint);
        columns[1].merge.merge_field(&mut self.latency_ms, incoming.latency_ms);
        columns[2].merge.merge_field(&mut self.samples, incoming.samples);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_calls_merge() {
        let mut a = ServiceCallsMetric::observe(202401011200, "checkout", "pod-1", 40, false).unwrap();
        let b = ServiceCallsMetric::observe(202401011200, "checkout", "pod-2", 60, true).unwrap();

        a.merge_from(&b);

        assert_eq!(a.calls, 2);
        assert_eq!(a.errors, 1);
        assert_eq!(a.total_latency_ms, 100);
        assert_eq!(a.instance, "pod-2");
        assert_eq!(a.service, "checkout");
        assert_eq!(a.avg_latency_ms(), 50.0);
    }

    #[test]
    fn test_gauge_last_write_wins() {
        let mut a = EndpointLatencyGauge::observe(202401011200, "checkout", "/pay", 12.5).unwrap();
        let b = EndpointLatencyGauge::observe(202401011200, "checkout", "/pay", 30.0).unwrap();
        a.merge_from(&b);
        assert_eq!(a.latency_ms, 30.0);
        assert_eq!(a.samples, 2);
        assert_eq!(a.id.as_str(), "202401011200_checkout_/pay");
    }

    #[test]
    fn test_static_schemas_declare_identity() {
        let calls = ServiceCallsMetric::schema_handle();
        assert_eq!(calls.name(), "service_calls");
        assert_eq!(calls.identity_columns().count(), 1);
        assert_eq!(EndpointLatencyGauge::schema_handle().len(), 3);
    }
}
