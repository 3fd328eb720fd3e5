//! Port over the hosted realtime tree database.
//!
//! The catalog never talks to the hosted service directly; every read and
//! write goes through [`TreeStore`]. Writes are multi-path updates applied
//! atomically: all paths change or none do.

mod memory;
mod path;

pub use memory::InMemoryTreeStore;
pub use path::{paths, DbPath};

use async_trait::async_trait;
use prints_core::{BlueprintId, StoreError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use tracing::warn;

// ============================================================================
// WRITES
// ============================================================================

/// Value written at one path of a multi-path update.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteValue {
    /// Replace the node with this value.
    Set(Value),
    /// Replace the node with the server's current time in milliseconds.
    ServerTimestamp,
    /// Remove the node. Parents left empty are removed too.
    Delete,
}

/// Atomic multi-path write.
///
/// Writing the same path twice keeps the later value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiPathUpdate {
    writes: BTreeMap<DbPath, WriteValue>,
}

impl MultiPathUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DbPath, value: Value) -> &mut Self {
        self.writes.insert(path, WriteValue::Set(value));
        self
    }

    /// Serialize `value` and set it at `path`.
    pub fn set_json<T: serde::Serialize>(
        &mut self,
        path: DbPath,
        value: &T,
    ) -> Result<&mut Self, StoreError> {
        let json = serde_json::to_value(value).map_err(|e| StoreError::WriteRejected {
            reason: format!("cannot serialize value for {path}: {e}"),
        })?;
        Ok(self.set(path, json))
    }

    pub fn server_timestamp(&mut self, path: DbPath) -> &mut Self {
        self.writes.insert(path, WriteValue::ServerTimestamp);
        self
    }

    pub fn delete(&mut self, path: DbPath) -> &mut Self {
        self.writes.insert(path, WriteValue::Delete);
        self
    }

    pub fn get(&self, path: &DbPath) -> Option<&WriteValue> {
        self.writes.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &DbPath> {
        self.writes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DbPath, &WriteValue)> {
        self.writes.iter()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

// ============================================================================
// ORDERED QUERIES
// ============================================================================

/// Ordering of an ordered range read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderBy {
    Key,
    Child(String),
}

/// Inclusive upper bound of an ordered range read.
#[derive(Debug, Clone, PartialEq)]
pub struct EndAt {
    pub value: Value,
    /// Tie-breaker among children with equal `value`.
    pub key: Option<String>,
}

/// Ordered range read over the children of one node.
///
/// Children are sorted ascending by `order_by` (ties broken by key), cut at
/// `start_at` and `end_at` inclusive, and the last `limit_to_last` are
/// returned.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedQuery {
    pub order_by: OrderBy,
    pub limit_to_last: Option<usize>,
    /// Inclusive lower bound on the ordered value.
    pub start_at: Option<Value>,
    pub end_at: Option<EndAt>,
}

impl OrderedQuery {
    pub fn by_child(child: impl Into<String>) -> Self {
        Self {
            order_by: OrderBy::Child(child.into()),
            limit_to_last: None,
            start_at: None,
            end_at: None,
        }
    }

    pub fn limit_to_last(mut self, limit: usize) -> Self {
        self.limit_to_last = Some(limit);
        self
    }

    pub fn start_at(mut self, value: Value) -> Self {
        self.start_at = Some(value);
        self
    }

    pub fn end_at(mut self, value: Value, key: Option<String>) -> Self {
        self.end_at = Some(EndAt { value, key });
        self
    }
}

// ============================================================================
// PORT
// ============================================================================

/// Backing tree store.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Point read. `None` when nothing is stored at `path`.
    async fn get(&self, path: &DbPath) -> Result<Option<Value>, StoreError>;

    /// Apply every write of `update` atomically.
    async fn update(&self, update: MultiPathUpdate) -> Result<(), StoreError>;

    /// Ordered range read, ascending. Returns `(child key, child value)`.
    async fn query_ordered(
        &self,
        path: &DbPath,
        query: &OrderedQuery,
    ) -> Result<Vec<(String, Value)>, StoreError>;

    /// Generate a new time-sortable child key under `parent`.
    fn generate_key(&self, parent: &DbPath) -> Result<BlueprintId, StoreError>;
}

/// Run `op`, retrying up to `retries` extra times on failure.
pub async fn retry<T, F, Fut>(operation: &str, retries: u32, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retries => {
                attempt += 1;
                warn!(operation, attempt, error = %e, "Remote operation failed, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}
