//! Column values and their merge operators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    String,
    Integer,
    Long,
    Double,
    Bytes,
}

/// How an incoming value is folded into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeOperator {
    /// `existing + incoming`, for counters and sums.
    Add,
    /// `incoming`, last write wins. Labels and gauges.
    Cover,
    /// `existing`, immutable once set.
    Identity,
}

/// A single typed column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValue {
    String(String),
    Integer(i32),
    Long(i64),
    Double(f64),
    Bytes(Vec<u8>),
}

impl ColumnValue {
    /// The kind this value belongs to.
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnValue::String(_) => ColumnKind::String,
            ColumnValue::Integer(_) => ColumnKind::Integer,
            ColumnValue::Long(_) => ColumnKind::Long,
            ColumnValue::Double(_) => ColumnKind::Double,
            ColumnValue::Bytes(_) => ColumnKind::Bytes,
        }
    }

    /// Zero value of a kind, used when a record is seeded fresh.
    pub fn zero(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::String => ColumnValue::String(String::new()),
            ColumnKind::Integer => ColumnValue::Integer(0),
            ColumnKind::Long => ColumnValue::Long(0),
            ColumnKind::Double => ColumnValue::Double(0.0),
            ColumnKind::Bytes => ColumnValue::Bytes(Vec::new()),
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            ColumnValue::Long(v) => Some(*v),
            ColumnValue::Integer(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            ColumnValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::String(v) => write!(f, "{}", v),
            ColumnValue::Integer(v) => write!(f, "{}", v),
            ColumnValue::Long(v) => write!(f, "{}", v),
            ColumnValue::Double(v) => write!(f, "{}", v),
            ColumnValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Numeric types that support the `Add` operator on typed metric fields.
pub trait Summable: Copy {
    fn sum_with(self, other: Self) -> Self;
}

impl Summable for i32 {
    #[inline]
    fn sum_with(self, other: Self) -> Self {
        self.wrapping_add(other)
    }
}

impl Summable for i64 {
    #[inline]
    fn sum_with(self, other: Self) -> Self {
        self.wrapping_add(other)
    }
}

impl Summable for u64 {
    #[inline]
    fn sum_with(self, other: Self) -> Self {
        self.wrapping_add(other)
    }
}

impl Summable for f64 {
    #[inline]
    fn sum_with(self, other: Self) -> Self {
        self + other
    }
}

impl MergeOperator {
    /// Fold `incoming` into `existing` in place.
    ///
    /// # Panics
    ///
    /// Panics when the two values are of different kinds, or when `Add` is
    /// applied to a string or bytes column. Both are schema bugs, not data errors.
    pub fn merge(self, existing: &mut ColumnValue, incoming: &ColumnValue) {
        assert_eq!(
            existing.kind(),
            incoming.kind(),
            "merge of mismatched column kinds"
        );

        match self {
            MergeOperator::Identity => {},
            MergeOperator::Cover => existing.clone_from(incoming),
            MergeOperator::Add => match (existing, incoming) {
                (ColumnValue::Integer(a), ColumnValue::Integer(b)) => *a = a.sum_with(*b),
                (ColumnValue::Long(a), ColumnValue::Long(b)) => *a = a.sum_with(*b),
                (ColumnValue::Double(a), ColumnValue::Double(b)) => *a = a.sum_with(*b),
                (existing, _) => panic!("Add is not defined for {:?} columns", existing.kind()),
            },
        }
    }

    /// Typed counterpart of [`MergeOperator::merge`] for struct fields.
    #[inline]
    pub fn merge_field<T: Summable>(self, existing: &mut T, incoming: T) {
        match self {
            MergeOperator::Identity => {},
            MergeOperator::Cover => *existing = incoming,
            MergeOperator::Add => *existing = existing.sum_with(incoming),
        }
    }

    /// Typed merge for non-numeric fields. `Add` is rejected.
    #[inline]
    pub fn merge_label<T: Clone>(self, existing: &mut T, incoming: &T) {
        match self {
            MergeOperator::Identity => {},
            MergeOperator::Cover => existing.clone_from(incoming),
            MergeOperator::Add => panic!("Add is not defined for label fields"),
        }
    }
}
