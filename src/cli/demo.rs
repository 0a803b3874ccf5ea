//! Synthetic service-call traffic for demo runs.

use crate::core::Result;
use crate::model::{time_bucket, ColumnValue, Granularity, MetricId, Record, ServiceCallsMetric};
use rand::{thread_rng, Rng};

/// Shape of one simulated service.
#[derive(Debug, Clone)]
struct DemoService {
    name: &'static str,
    instances: u32,
    /// Median latency in milliseconds
    base_latency_ms: i64,
    /// Error rate (0.0 to 1.0)
    error_rate: f64,
}

/// Produces raw, unaggregated call records using the `service_calls` schema.
pub struct TrafficGenerator {
    services: Vec<DemoService>,
}

impl TrafficGenerator {
    pub fn new() -> Self {
        let services = vec![
            DemoService {
                name: "api-gateway",
                instances: 3,
                base_latency_ms: 20,
                error_rate: 0.001,
            },
            DemoService {
                name: "user-service",
                instances: 2,
                base_latency_ms: 15,
                error_rate: 0.002,
            },
            DemoService {
                name: "order-service",
                instances: 4,
                base_latency_ms: 45,
                error_rate: 0.01,
            },
            DemoService {
                name: "payment-service",
                instances: 2,
                base_latency_ms: 120,
                error_rate: 0.02,
            },
            DemoService {
                name: "inventory-service",
                instances: 1,
                base_latency_ms: 30,
                error_rate: 0.005,
            },
        ];
        Self { services }
    }

    /// `count` call records observed at `now_millis`.
    pub fn next_batch(&self, count: usize, now_millis: i64) -> Result<Vec<Record>> {
        let bucket = time_bucket(now_millis, Granularity::Minute)?;
        let mut rng = thread_rng();
        let mut batch = Vec::with_capacity(count);

        for _ in 0..count {
            let service = &self.services[rng.gen_range(0..self.services.len())];
            let instance = rng.gen_range(0..service.instances);
            let jitter: f64 = rng.gen_range(0.5..2.0);
            // 1% slow outliers
            let outlier = if rng.gen::<f64>() < 0.01 { 5.0 } else { 1.0 };
            let latency = (service.base_latency_ms as f64 * jitter * outlier) as i64;
            let is_error = rng.gen::<f64>() < service.error_rate;

            let id = MetricId::compose(bucket, &[service.name])?;
            batch.push(
                Record::new(ServiceCallsMetric::schema_handle(), id, bucket)
                    .with("service", ColumnValue::String(service.name.to_string()))
                    .with("calls", ColumnValue::Long(1))
                    .with("errors", ColumnValue::Long(i64::from(is_error)))
                    .with("total_latency_ms", ColumnValue::Long(latency))
                    .with("instance", ColumnValue::String(format!("{}-{}", service.name, instance))),
            );
        }

        Ok(batch)
    }
}

impl Default for TrafficGenerator {
    fn default() -> Self {
        Self::new()
    }
}
