//! Per-role record schema.
//!
//! A [`Schema`] is created once at startup for each metric type and shared
//! read-only by every worker handling that type. It maps column positions to
//! names, kinds and merge operators, and performs the field-by-field merge.

use super::column::{ColumnKind, ColumnValue, MergeOperator};
use super::record::{Metric, Record};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One declared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub merge: MergeOperator,
}

/// Immutable description of a metric type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    columns: Vec<Column>,
}

impl Schema {
    /// Start declaring a schema for the named metric type.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column by name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Columns that make up the metric identity. These never change once set.
    pub fn identity_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|c| c.merge == MergeOperator::Identity)
    }

    /// Zero-valued column list in declaration order.
    pub fn zero_values(&self) -> Vec<ColumnValue> {
        self.columns
            .iter()
            .map(|c| ColumnValue::zero(c.kind))
            .collect()
    }

    /// True when two schemas describe the same metric type.
    pub fn is_compatible(&self, other: &Schema) -> bool {
        std::ptr::eq(self, other) || self == other
    }

    /// Fold `incoming` into `existing`, column by column.
    ///
    /// # Panics
    ///
    /// Panics if either record belongs to a different schema, or if the two
    /// records carry different identities.
    pub fn merge(&self, existing: &mut Record, incoming: &Record) {
        assert!(
            self.is_compatible(existing.schema()) && self.is_compatible(incoming.schema()),
            "merge across schemas: '{}' vs '{}'",
            existing.schema().name(),
            incoming.schema().name()
        );
        assert_eq!(
            existing.id(),
            incoming.id(),
            "merge of records with different identities"
        );

        for (idx, column) in self.columns.iter().enumerate() {
            column
                .merge
                .merge(existing.value_mut(idx), incoming.value(idx));
        }
    }
}

/// Fluent declaration of a [`Schema`].
pub struct SchemaBuilder {
    name: String,
    columns: Vec<Column>,
}

impl SchemaBuilder {
    /// Declare the next column.
    ///
    /// # Panics
    ///
    /// Panics on duplicate column names, or when `Add` is declared on a string
    /// or bytes column.
    pub fn column(mut self, name: impl Into<String>, kind: ColumnKind, merge: MergeOperator) -> Self {
        let name = name.into();
        assert!(
            !self.columns.iter().any(|c| c.name == name),
            "duplicate column '{}' in schema '{}'",
            name,
            self.name
        );
        assert!(
            !(merge == MergeOperator::Add && matches!(kind, ColumnKind::String | ColumnKind::Bytes)),
            "Add is not defined for {:?} column '{}'",
            kind,
            name
        );
        self.columns.push(Column { name, kind, merge });
        self
    }

    pub fn build(self) -> Arc<Schema> {
        Arc::new(Schema {
            name: self.name,
            columns: self.columns,
        })
    }
}
