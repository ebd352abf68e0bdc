//! Store client trait definitions
//!
//! The store is a generic row store: every collection holds JSON objects and
//! supports equality / membership filters, a single ordering field and a
//! limit. Typed access goes through [`super::Records`].

use crate::error::StorageError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One stored record
pub type Row = Map<String, Value>;

/// Named record collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Workflows,
    Runs,
    QueuedWorkflows,
    Config,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Workflows,
        Collection::Runs,
        Collection::QueuedWorkflows,
        Collection::Config,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Workflows => "workflows",
            Collection::Runs => "runs",
            Collection::QueuedWorkflows => "queued_workflows",
            Collection::Config => "config",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Row predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value` (a missing field compares as `null`)
    Eq(String, Value),
    /// `field` is one of `values`
    In(String, Vec<Value>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Eq(field, value) => row.get(field).unwrap_or(&Value::Null) == value,
            Filter::In(field, values) => {
                let actual = row.get(field).unwrap_or(&Value::Null);
                values.iter().any(|v| v == actual)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

/// Select parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order = Some(Order {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }
}

/// Total order over JSON scalars used for in-process sorting.
///
/// `null` sorts first, numbers compare numerically, strings lexically.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Generic access to the bookkeeping store
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Short backend name for logs and status output
    fn backend(&self) -> &'static str;

    /// Read rows matching the query
    async fn select(&self, collection: Collection, query: &Query) -> StorageResult<Vec<Row>>;

    /// Insert one row
    async fn insert(&self, collection: Collection, row: Row) -> StorageResult<()>;

    /// Merge `patch` into every row matching `filters`, returning the number of rows changed
    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Row,
    ) -> StorageResult<u64>;

    /// Delete every row matching `filters`, returning the number of rows removed
    async fn delete(&self, collection: Collection, filters: &[Filter]) -> StorageResult<u64>;

    /// Next value of a monotonically increasing sequence over `collection.field`.
    ///
    /// The first value is one more than the largest existing value (or 1).
    async fn next_sequence(&self, collection: Collection, field: &str) -> StorageResult<i64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_matching() {
        let r = row(json!({"status": "active", "run_number": 2}));
        assert!(Filter::eq("status", "active").matches(&r));
        assert!(!Filter::eq("status", "completed").matches(&r));
        assert!(Filter::eq("failure_summary", Value::Null).matches(&r));
        assert!(Filter::is_in("run_number", [1, 2, 3]).matches(&r));
        assert!(!Filter::is_in("run_number", Vec::<i64>::new()).matches(&r));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&Value::Null, &json!(0)), Ordering::Less);
    }
}
