//! Metric identities, the [`Metric`] trait and the column-addressable [`Record`].

use super::column::ColumnValue;
use super::schema::Schema;
use crate::core::{MeterflowError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of one aggregatable metric row: time bucket plus business dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricId(String);

impl MetricId {
    /// Wrap an already-derived identity string.
    pub fn new(id: impl Into<String>) -> Self {
        MetricId(id.into())
    }

    /// Derive an identity as `{time_bucket}_{dim1}_{dim2}...`.
    pub fn compose(time_bucket: i64, dimensions: &[&str]) -> Result<Self> {
        if dimensions.is_empty() {
            return Err(MeterflowError::InvalidIdentity(
                "at least one dimension is required".to_string(),
            ));
        }
        if dimensions.iter().any(|d| d.is_empty()) {
            return Err(MeterflowError::InvalidIdentity(format!(
                "empty dimension in {:?}",
                dimensions
            )));
        }

        let mut id = time_bucket.to_string();
        for dim in dimensions {
            id.push('_');
            id.push_str(dim);
        }
        Ok(MetricId(id))
    }

    /// Returns the string representation of the identity
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the inner string value
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MetricId {
    fn from(id: &str) -> Self {
        MetricId(id.to_string())
    }
}

/// A record that can be folded into another record with the same identity.
///
/// Implemented by the dynamic [`Record`] and by strongly typed metric structs
/// that declare their `(field, merge operator)` list as a static [`Schema`].
pub trait Metric: Clone + Send + Sync + 'static {
    /// Identity used as the aggregation key.
    fn id(&self) -> &MetricId;

    /// Time bucket this occurrence belongs to, e.g. `202401011230`.
    fn time_bucket(&self) -> i64;

    /// Schema describing the record's columns.
    fn schema(&self) -> &Schema;

    /// Fold `incoming` into `self` according to the schema's merge operators.
    ///
    /// Panics if `incoming` belongs to a different schema.
    fn merge_from(&mut self, incoming: &Self);
}

/// Dynamic, column-addressable metric record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: MetricId,
    time_bucket: i64,
    schema: Arc<Schema>,
    values: Vec<ColumnValue>,
}

impl Record {
    /// Create a record with every column at its zero value.
    pub fn new(schema: Arc<Schema>, id: MetricId, time_bucket: i64) -> Self {
        let values = schema.zero_values();
        Self {
            id,
            time_bucket,
            schema,
            values,
        }
    }

    /// Builder-style [`Record::set`].
    pub fn with(mut self, column: &str, value: ColumnValue) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column by name.
    ///
    /// # Panics
    ///
    /// Panics if the column is unknown or the value has the wrong kind.
    pub fn set(&mut self, column: &str, value: ColumnValue) {
        let idx = self.schema.position(column).unwrap_or_else(|| {
            panic!("unknown column '{}' in schema '{}'", column, self.schema.name())
        });
        let expected = self.schema.columns()[idx].kind;
        assert_eq!(
            expected,
            value.kind(),
            "column '{}' expects {:?}",
            column,
            expected
        );
        self.values[idx] = value;
    }

    /// Column value by name.
    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.schema.position(column).map(|idx| &self.values[idx])
    }

    /// Column value by position.
    pub fn value(&self, idx: usize) -> &ColumnValue {
        &self.values[idx]
    }

    pub(crate) fn value_mut(&mut self, idx: usize) -> &mut ColumnValue {
        &mut self.values[idx]
    }

    pub fn values(&self) -> &[ColumnValue] {
        &self.values
    }

    pub fn schema_handle(&self) -> &Arc<Schema> {
        &self.schema
    }
}

impl Metric for Record {
    fn id(&self) -> &MetricId {
        &self.id
    }

    fn time_bucket(&self) -> i64 {
        self.time_bucket
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn merge_from(&mut self, incoming: &Self) {
        let schema = Arc::clone(&self.schema);
        schema.merge(self, incoming);
    }
}
