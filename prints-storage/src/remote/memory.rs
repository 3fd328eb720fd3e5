//! In-memory tree store.
//!
//! Uses a JSON tree behind an RwLock. Updates are applied to a copy and
//! swapped in, so a failed update leaves the tree untouched. It is not
//! intended for production use but serves tests and local runs.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use prints_core::{now_millis, BlueprintId, EpochMillis, StoreError};
use serde_json::{Map, Value};

use super::{DbPath, MultiPathUpdate, OrderBy, OrderedQuery, TreeStore, WriteValue};

fn lock_error(path: &DbPath) -> StoreError {
    StoreError::ReadFailed {
        path: path.to_string(),
        reason: "tree lock poisoned".to_string(),
    }
}

/// JSON-tree implementation of [`TreeStore`] with a write journal and
/// failure injection.
#[derive(Debug, Default)]
pub struct InMemoryTreeStore {
    root: RwLock<Value>,
    journal: Mutex<Vec<MultiPathUpdate>>,
    failing_updates: AtomicU32,
    failing_reads: AtomicU32,
    reads: AtomicU64,
    server_time: Mutex<Option<EpochMillis>>,
}

impl InMemoryTreeStore {
    pub fn new() -> Self {
        Self::with_root(Value::Object(Map::new()))
    }

    pub fn with_root(root: Value) -> Self {
        Self {
            root: RwLock::new(root),
            ..Self::default()
        }
    }

    /// Reject the next `count` updates.
    pub fn fail_next_updates(&self, count: u32) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    /// Reject the next update.
    pub fn fail_next_update(&self) {
        self.fail_next_updates(1);
    }

    /// Fail the next `count` reads (point reads and queries).
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Pin the value written for `ServerTimestamp`.
    pub fn set_server_time(&self, millis: EpochMillis) {
        if let Ok(mut time) = self.server_time.lock() {
            *time = Some(millis);
        }
    }

    /// Every update applied so far, oldest first.
    pub fn journal(&self) -> Vec<MultiPathUpdate> {
        self.journal.lock().map(|j| j.clone()).unwrap_or_default()
    }

    pub fn last_update(&self) -> Option<MultiPathUpdate> {
        self.journal().pop()
    }

    /// Number of reads served, including failed ones.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Synchronous point read for assertions.
    pub fn value_at(&self, path: &DbPath) -> Option<Value> {
        let root = self.root.read().ok()?;
        node_at(&root, path).cloned()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_read(&self, path: &DbPath) -> Result<(), StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_reads) {
            return Err(StoreError::ReadFailed {
                path: path.to_string(),
                reason: "injected read failure".to_string(),
            });
        }
        Ok(())
    }

    fn server_now(&self) -> EpochMillis {
        self.server_time
            .lock()
            .ok()
            .and_then(|time| *time)
            .unwrap_or_else(now_millis)
    }
}

#[async_trait]
impl TreeStore for InMemoryTreeStore {
    async fn get(&self, path: &DbPath) -> Result<Option<Value>, StoreError> {
        self.check_read(path)?;
        let root = self.root.read().map_err(|_| lock_error(path))?;
        Ok(node_at(&root, path).cloned())
    }

    async fn update(&self, update: MultiPathUpdate) -> Result<(), StoreError> {
        if Self::take_failure(&self.failing_updates) {
            return Err(StoreError::WriteRejected {
                reason: "injected write failure".to_string(),
            });
        }

        let now = self.server_now();
        let mut root = self.root.write().map_err(|_| StoreError::WriteRejected {
            reason: "tree lock poisoned".to_string(),
        })?;

        let mut next = root.clone();
        for (path, write) in update.iter() {
            let segments: Vec<&str> = path.segments().collect();
            match write {
                WriteValue::Set(value) if !is_empty_value(value) => {
                    set_at(&mut next, &segments, value.clone())
                }
                WriteValue::Set(_) | WriteValue::Delete => {
                    delete_at(&mut next, &segments);
                }
                WriteValue::ServerTimestamp => set_at(&mut next, &segments, Value::from(now)),
            }
        }
        if next.is_null() {
            next = Value::Object(Map::new());
        }
        *root = next;
        drop(root);

        if let Ok(mut journal) = self.journal.lock() {
            journal.push(update);
        }
        Ok(())
    }

    async fn query_ordered(
        &self,
        path: &DbPath,
        query: &OrderedQuery,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        self.check_read(path)?;
        let root = self.root.read().map_err(|_| lock_error(path))?;
        let Some(Value::Object(children)) = node_at(&root, path) else {
            return Ok(Vec::new());
        };

        let sort_value = |child: &Value| -> Value {
            match &query.order_by {
                OrderBy::Key => Value::Null,
                OrderBy::Child(name) => child.get(name).cloned().unwrap_or(Value::Null),
            }
        };

        let mut items: Vec<(String, Value, Value)> = children
            .iter()
            .map(|(key, child)| (key.clone(), sort_value(child), child.clone()))
            .collect();
        items.sort_by(|a, b| compare_values(&a.1, &b.1).then_with(|| a.0.cmp(&b.0)));

        if let Some(start) = &query.start_at {
            items.retain(|(key, value, _)| match query.order_by {
                OrderBy::Key => start.as_str().map_or(true, |start| key.as_str() >= start),
                OrderBy::Child(_) => compare_values(value, start) != CmpOrdering::Less,
            });
        }

        if let Some(end) = &query.end_at {
            items.retain(|(key, value, _)| {
                let end_value = match query.order_by {
                    OrderBy::Key => Value::Null,
                    OrderBy::Child(_) => end.value.clone(),
                };
                let end_key = match query.order_by {
                    OrderBy::Key => end.value.as_str().map(str::to_string),
                    OrderBy::Child(_) => end.key.clone(),
                };
                match compare_values(value, &end_value) {
                    CmpOrdering::Less => true,
                    CmpOrdering::Greater => false,
                    CmpOrdering::Equal => end_key.as_deref().map_or(true, |end| key.as_str() <= end),
                }
            });
        }

        if let Some(limit) = query.limit_to_last {
            let skip = items.len().saturating_sub(limit);
            items.drain(..skip);
        }

        Ok(items.into_iter().map(|(key, _, value)| (key, value)).collect())
    }

    fn generate_key(&self, _parent: &DbPath) -> Result<BlueprintId, StoreError> {
        Ok(BlueprintId::generate())
    }
}

// ============================================================================
// TREE HELPERS
// ============================================================================

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn node_at<'a>(root: &'a Value, path: &DbPath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.get(segment)?;
    }
    if node.is_null() {
        None
    } else {
        Some(node)
    }
}

fn set_at(node: &mut Value, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(head.to_string()).or_insert(Value::Null);
        set_at(child, rest, value);
    }
}

/// Remove the node at `segments`. Returns true when `node` is left empty.
fn delete_at(node: &mut Value, segments: &[&str]) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        *node = Value::Null;
        return true;
    };
    match node {
        Value::Object(map) => {
            if let Some(child) = map.get_mut(*head) {
                if delete_at(child, rest) {
                    map.remove(*head);
                }
            }
            map.is_empty()
        }
        _ => false,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) | Value::Object(_) => 4,
    }
}

/// Null < booleans < numbers < strings < objects.
fn compare_values(a: &Value, b: &Value) -> CmpOrdering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::paths;
    use serde_json::json;

    fn summaries_store() -> InMemoryTreeStore {
        InMemoryTreeStore::with_root(json!({
            "blueprintSummaries": {
                "a": { "title": "A", "lastUpdatedDate": 10 },
                "b": { "title": "B", "lastUpdatedDate": 30 },
                "c": { "title": "C", "lastUpdatedDate": 20 },
                "d": { "title": "D", "lastUpdatedDate": 30 }
            }
        }))
    }

    #[tokio::test]
    async fn test_update_is_all_or_nothing() {
        let store = InMemoryTreeStore::new();
        store.fail_next_update();

        let mut update = MultiPathUpdate::new();
        update.set(DbPath::parse("blueprints/k1/title"), json!("Smelter"));
        assert!(store.update(update.clone()).await.is_err());
        assert!(store.value_at(&DbPath::parse("blueprints")).is_none());
        assert!(store.journal().is_empty());

        store.update(update).await.expect("update should succeed");
        assert_eq!(
            store.value_at(&DbPath::parse("blueprints/k1/title")),
            Some(json!("Smelter"))
        );
        assert_eq!(store.journal().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_prunes_empty_parents() {
        let store = InMemoryTreeStore::with_root(json!({
            "byTag": { "combat": { "k1": true }, "logistics": { "k1": true, "k2": true } }
        }));
        let id = BlueprintId::from("k1");
        let mut update = MultiPathUpdate::new();
        update.delete(paths::tag_entry("combat", &id));
        update.set(paths::tag_entry("logistics", &id), Value::Null);
        store.update(update).await.expect("update should succeed");

        assert!(store.value_at(&paths::tag_index("combat")).is_none());
        assert_eq!(
            store.value_at(&paths::tag_index("logistics")),
            Some(json!({ "k2": true }))
        );
    }

    #[tokio::test]
    async fn test_server_timestamp() {
        let store = InMemoryTreeStore::new();
        store.set_server_time(1_234);
        let mut update = MultiPathUpdate::new();
        update.server_timestamp(DbPath::parse("blueprints/k1/lastUpdatedDate"));
        store.update(update).await.expect("update should succeed");
        assert_eq!(
            store.value_at(&DbPath::parse("blueprints/k1/lastUpdatedDate")),
            Some(json!(1_234))
        );
    }

    #[tokio::test]
    async fn test_query_ordered_limit_to_last() {
        let store = summaries_store();
        let query = OrderedQuery::by_child(paths::LAST_UPDATED).limit_to_last(3);
        let keys: Vec<String> = store
            .query_ordered(&paths::summaries(), &query)
            .await
            .expect("query should succeed")
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["c", "b", "d"]);
    }

    #[tokio::test]
    async fn test_query_ordered_end_at_is_inclusive() {
        let store = summaries_store();
        let query = OrderedQuery::by_child(paths::LAST_UPDATED)
            .limit_to_last(2)
            .end_at(json!(30), Some("b".to_string()));
        let keys: Vec<String> = store
            .query_ordered(&paths::summaries(), &query)
            .await
            .expect("query should succeed")
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_query_ordered_start_at_is_inclusive() {
        let store = summaries_store();
        let query = OrderedQuery::by_child(paths::LAST_UPDATED).start_at(json!(20));
        let keys: Vec<String> = store
            .query_ordered(&paths::summaries(), &query)
            .await
            .expect("query should succeed")
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["c", "b", "d"]);
    }

    #[tokio::test]
    async fn test_injected_read_failure() {
        let store = summaries_store();
        store.fail_next_reads(1);
        assert!(store.get(&paths::summaries()).await.is_err());
        assert!(store.get(&paths::summaries()).await.expect("read should succeed").is_some());
        assert_eq!(store.read_count(), 2);
    }
}
