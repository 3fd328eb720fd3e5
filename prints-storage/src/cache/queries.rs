//! Read-through queries.
//!
//! A fresh cache entry is returned without touching the tree store; an
//! absent or stale entry is read remotely (with retries) and written back.
//! Cache failures never fail a read: a misshapen entry is treated as a miss
//! and a failed write-back is logged.

use std::sync::Arc;

use prints_core::validate::validate_summary;
use prints_core::{
    now_millis, BlueprintId, BlueprintRecord, BlueprintSummary, CacheError, EpochMillis,
    KeySet, PaginatedSummaries, PrintsConfig, PrintsResult, StoreError, SummaryEntry,
    SummaryPage, UserId,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::entry::CacheValue;
use super::key::QueryKey;
use super::read::CacheRead;
use super::repository::CacheRepository;
use crate::remote::{paths, retry, DbPath, OrderedQuery, TreeStore};

/// Inclusive cursor of the next recency page: the first entry's key and
/// last-updated timestamp.
pub type PageCursor = (BlueprintId, EpochMillis);

fn decode<T: DeserializeOwned>(path: &DbPath, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Decode {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Decode a `{key: true}` node. Non-`true` children are ignored.
pub fn decode_key_set(path: &DbPath, value: Option<Value>) -> Result<KeySet, StoreError> {
    match value {
        None => Ok(KeySet::new()),
        Some(Value::Object(map)) => Ok(map
            .into_iter()
            .filter(|(_, flag)| flag.as_bool() == Some(true))
            .map(|(key, _)| BlueprintId::from(key))
            .collect()),
        Some(other) => Err(StoreError::Decode {
            path: path.to_string(),
            reason: format!("expected an object of keys, found {other}"),
        }),
    }
}

/// Read-through access to the tree store via the query cache.
#[derive(Clone)]
pub struct ReadThrough {
    store: Arc<dyn TreeStore>,
    cache: Arc<dyn CacheRepository>,
    retries: u32,
    page_size: usize,
}

impl ReadThrough {
    pub fn new(
        store: Arc<dyn TreeStore>,
        cache: Arc<dyn CacheRepository>,
        config: &PrintsConfig,
    ) -> Self {
        Self {
            store,
            cache,
            retries: config.query_retries,
            page_size: config.page_size.max(1),
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheRepository> {
        &self.cache
    }

    /// Fresh cached value under `key`, if any.
    fn cached<T>(
        &self,
        key: &QueryKey,
        extract: impl FnOnce(CacheValue) -> Result<T, CacheValue>,
    ) -> Option<CacheRead<T>> {
        let entry = match self.cache.entry(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed, reading remotely");
                return None;
            }
        };
        if entry.is_stale_at(now_millis(), self.cache.stale_time()) {
            return None;
        }
        let updated_at = entry.updated_at;
        match extract(entry.value) {
            Ok(value) => Some(CacheRead::from_cache(value, updated_at)),
            Err(found) => {
                let e = CacheError::ShapeMismatch {
                    key: key.to_string(),
                    expected: key.expected_shape(),
                    found: found.shape(),
                };
                warn!(key = %key, error = %e, "Ignoring misshapen cache entry");
                None
            }
        }
    }

    fn write_back(&self, key: &QueryKey, result: Result<(), CacheError>) {
        if let Err(e) = result {
            warn!(key = %key, error = %e, "Failed to cache query result");
        }
    }

    async fn read(&self, path: &DbPath) -> Result<Option<Value>, StoreError> {
        retry("get", self.retries, || self.store.get(path)).await
    }

    // ========================================================================
    // RECORDS
    // ========================================================================

    /// Full record. `None` when the blueprint does not exist.
    pub async fn fetch_record(
        &self,
        id: &BlueprintId,
    ) -> PrintsResult<Option<CacheRead<BlueprintRecord>>> {
        let key = QueryKey::blueprint(id);
        if let Some(hit) = self.cached(&key, |value| match value {
            CacheValue::Record(record) => Ok(record),
            other => Err(other),
        }) {
            return Ok(Some(hit));
        }

        let path = paths::blueprint(id);
        let Some(value) = self.read(&path).await? else {
            return Ok(None);
        };
        let record: BlueprintRecord = decode(&path, value)?;
        self.write_back(&key, self.cache.set_record(id, record.clone()));
        Ok(Some(CacheRead::from_remote(record)))
    }

    /// Summary projection. `None` when the blueprint does not exist.
    pub async fn fetch_summary(
        &self,
        id: &BlueprintId,
    ) -> PrintsResult<Option<CacheRead<BlueprintSummary>>> {
        let key = QueryKey::summary(id);
        if let Some(hit) = self.cached(&key, |value| match value {
            CacheValue::Summary(summary) => Ok(summary),
            other => Err(other),
        }) {
            return Ok(Some(hit));
        }

        let path = paths::summary(id);
        let Some(value) = self.read(&path).await? else {
            return Ok(None);
        };
        let summary: BlueprintSummary = decode(&path, value)?;
        self.write_back(&key, self.cache.set_summary(id, summary.clone()));
        Ok(Some(CacheRead::from_remote(summary)))
    }

    // ========================================================================
    // INDEXES
    // ========================================================================

    async fn fetch_key_set(
        &self,
        key: QueryKey,
        path: DbPath,
        write: impl FnOnce(KeySet) -> Result<(), CacheError>,
    ) -> PrintsResult<CacheRead<KeySet>> {
        if let Some(hit) = self.cached(&key, |value| match value {
            CacheValue::KeySet(set) => Ok(set),
            other => Err(other),
        }) {
            return Ok(hit);
        }

        let set = decode_key_set(&path, self.read(&path).await?)?;
        self.write_back(&key, write(set.clone()));
        Ok(CacheRead::from_remote(set))
    }

    /// Keys carrying `tag`. A missing index is an empty set.
    pub async fn fetch_tag_index(&self, tag: &str) -> PrintsResult<CacheRead<KeySet>> {
        self.fetch_key_set(QueryKey::tag_index(tag), paths::tag_index(tag), |set| {
            self.cache.set_tag_index(tag, set)
        })
        .await
    }

    /// Keys authored by `user`.
    pub async fn fetch_user_blueprints(&self, user: &UserId) -> PrintsResult<CacheRead<KeySet>> {
        self.fetch_key_set(
            QueryKey::user_blueprints(user),
            paths::user_blueprints(user),
            |set| self.cache.set_user_blueprints(user, set),
        )
        .await
    }

    /// Keys favorited by `user`.
    pub async fn fetch_user_favorites(&self, user: &UserId) -> PrintsResult<CacheRead<KeySet>> {
        self.fetch_key_set(
            QueryKey::user_favorites(user),
            paths::user_favorites(user),
            |set| self.cache.set_user_favorites(user, set),
        )
        .await
    }

    /// Whether `user` favorited `id`, read from the user side.
    pub async fn fetch_user_favorite_flag(
        &self,
        user: &UserId,
        id: &BlueprintId,
    ) -> PrintsResult<CacheRead<bool>> {
        let key = QueryKey::user_favorite_flag(user, id);
        if let Some(hit) = self.cached(&key, |value| match value {
            CacheValue::Flag(flag) => Ok(flag),
            other => Err(other),
        }) {
            return Ok(hit);
        }

        let path = paths::user_favorite(user, id);
        let flag = self.read(&path).await?.and_then(|v| v.as_bool()).unwrap_or(false);
        self.write_back(&key, self.cache.set_user_favorite_flag(user, id, flag));
        Ok(CacheRead::from_remote(flag))
    }

    // ========================================================================
    // RECENCY LIST
    // ========================================================================

    /// One page of the recency-ordered summary list, newest first.
    ///
    /// Without a cursor the first page is read (served from cache when the
    /// cached list is fresh) and replaces the cached list. With a cursor the
    /// page is appended to the cached list. Every listed summary is also
    /// written to its own `Summary` entry.
    pub async fn fetch_recent_page(
        &self,
        cursor: Option<PageCursor>,
    ) -> PrintsResult<CacheRead<SummaryPage>> {
        let key = QueryKey::RecentSummaries;
        if cursor.is_none() {
            let first = self.cached(&key, |value| match value {
                CacheValue::RecentSummaries(list) => Ok(list),
                other => Err(other),
            });
            if let Some(hit) = first {
                if !hit.value().pages.is_empty() {
                    return Ok(hit.map(|mut list| list.pages.swap_remove(0)));
                }
            }
        }

        let path = paths::summaries();
        let mut query = OrderedQuery::by_child(paths::LAST_UPDATED).limit_to_last(self.page_size + 1);
        if let Some((cursor_key, cursor_value)) = &cursor {
            query = query.end_at(Value::from(*cursor_value), Some(cursor_key.to_string()));
        }
        let rows = retry("query", self.retries, || self.store.query_ordered(&path, &query)).await?;

        // Paging is decided on raw rows; skipped summaries still count.
        let mut rows: Vec<(String, Value)> = rows.into_iter().rev().collect();
        let mut page = SummaryPage::default();
        if rows.len() > self.page_size {
            let mut overflow = rows.split_off(self.page_size);
            if !overflow.is_empty() {
                let (next_key, next_value) = overflow.swap_remove(0);
                page.last_value = next_value.get(paths::LAST_UPDATED).and_then(Value::as_i64);
                page.last_key = Some(BlueprintId::from(next_key));
                page.has_more = true;
            }
        }
        page.entries = decode_summaries(&path, rows);

        for entry in &page.entries {
            let summary_key = QueryKey::summary(&entry.key);
            self.write_back(
                &summary_key,
                self.cache.set_summary(&entry.key, entry.summary.clone()),
            );
        }

        match cursor {
            None => self.write_back(
                &key,
                self.cache.set_recent_summaries(PaginatedSummaries {
                    pages: vec![page.clone()],
                }),
            ),
            Some(_) => {
                let appended = self
                    .cache
                    .patch_recent_summaries(&mut |list: &mut PaginatedSummaries| {
                        list.pages.push(page.clone());
                        true
                    });
                match appended {
                    Ok(true) => {}
                    Ok(false) => debug!("No cached recency list to extend"),
                    Err(e) => warn!(error = %e, "Cannot extend cached recency list"),
                }
            }
        }

        debug!(
            entries = page.entries.len(),
            has_more = page.has_more,
            "Fetched recency page"
        );
        Ok(CacheRead::from_remote(page))
    }

    /// Summaries last updated at or after `since`, newest first. Always
    /// read remotely; each valid summary is written to its own entry.
    pub async fn fetch_summaries_since(
        &self,
        since: EpochMillis,
    ) -> PrintsResult<Vec<SummaryEntry>> {
        let path = paths::summaries();
        let query = OrderedQuery::by_child(paths::LAST_UPDATED).start_at(Value::from(since));
        let rows = retry("query", self.retries, || self.store.query_ordered(&path, &query)).await?;
        let entries = decode_summaries(&path, rows.into_iter().rev().collect());
        for entry in &entries {
            self.write_back(
                &QueryKey::summary(&entry.key),
                self.cache.set_summary(&entry.key, entry.summary.clone()),
            );
        }
        debug!(since, entries = entries.len(), "Fetched summaries since watermark");
        Ok(entries)
    }
}

/// Decode summary rows under `path`, skipping undecodable or invalid ones.
fn decode_summaries(path: &DbPath, rows: Vec<(String, Value)>) -> Vec<SummaryEntry> {
    let mut entries = Vec::with_capacity(rows.len());
    for (row_key, value) in rows {
        let row_path = path.join(&row_key);
        match decode::<BlueprintSummary>(&row_path, value) {
            Ok(summary) if validate_summary(&summary).is_ok() => entries.push(SummaryEntry {
                key: BlueprintId::from(row_key),
                summary,
            }),
            Ok(_) => warn!(path = %row_path, "Skipping invalid summary"),
            Err(e) => warn!(path = %row_path, error = %e, "Skipping undecodable summary"),
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryCache;
    use crate::remote::InMemoryTreeStore;
    use serde_json::json;
    use std::time::Duration;

    fn summary_json(title: &str, updated: i64) -> Value {
        json!({
            "title": title,
            "imgurId": "abc1234",
            "imgurType": "image/png",
            "numberOfFavorites": 0,
            "lastUpdatedDate": updated
        })
    }

    fn setup(root: Value, page_size: usize) -> (Arc<InMemoryTreeStore>, Arc<QueryCache>, ReadThrough) {
        let store = Arc::new(InMemoryTreeStore::with_root(root));
        let cache = Arc::new(QueryCache::new(Duration::from_secs(3600)));
        let config = PrintsConfig {
            page_size,
            ..PrintsConfig::default()
        };
        let queries = ReadThrough::new(store.clone(), cache.clone(), &config);
        (store, cache, queries)
    }

    #[tokio::test]
    async fn test_fresh_entry_skips_remote_read() {
        let (store, _cache, queries) = setup(
            json!({ "byTag": { "combat": { "k1": true } } }),
            60,
        );

        let first = queries.fetch_tag_index("combat").await.expect("fetch should succeed");
        assert!(first.was_cache_miss());
        let second = queries.fetch_tag_index("combat").await.expect("fetch should succeed");
        assert!(second.was_cache_hit());
        assert!(second.value().contains(&BlueprintId::from("k1")));
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_invalidated_entry_is_refetched() {
        let (store, cache, queries) = setup(json!({}), 60);
        queries.fetch_tag_index("combat").await.expect("fetch should succeed");
        cache.invalidate(&QueryKey::tag_index("combat")).unwrap();
        let read = queries.fetch_tag_index("combat").await.expect("fetch should succeed");
        assert!(read.was_cache_miss());
        assert!(read.value().is_empty());
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_tag_index_caches_empty_set() {
        let (_store, cache, queries) = setup(json!({}), 60);
        queries.fetch_tag_index("combat").await.expect("fetch should succeed");
        assert_eq!(cache.tag_index("combat").unwrap(), Some(KeySet::new()));
    }

    #[tokio::test]
    async fn test_read_retries_once() {
        let (store, _cache, queries) = setup(
            json!({ "blueprintSummaries": { "k1": summary_json("A", 1) } }),
            60,
        );
        store.fail_next_reads(1);
        let read = queries
            .fetch_summary(&BlueprintId::from("k1"))
            .await
            .expect("fetch should succeed after retry");
        assert_eq!(read.expect("summary should exist").map(|s| s.title).into_value(), "A");
    }

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let (_store, cache, queries) = setup(json!({}), 60);
        let read = queries
            .fetch_record(&BlueprintId::from("missing"))
            .await
            .expect("fetch should succeed");
        assert!(read.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_recent_pages_and_summary_seeding() {
        let (_store, cache, queries) = setup(
            json!({
                "blueprintSummaries": {
                    "a": summary_json("A", 10),
                    "b": summary_json("B", 20),
                    "c": summary_json("C", 30),
                    "d": summary_json("D", 40),
                    "e": summary_json("E", 50)
                }
            }),
            2,
        );

        let first = queries.fetch_recent_page(None).await.expect("fetch should succeed");
        let page = first.into_value();
        let keys: Vec<&str> = page.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["e", "d"]);
        assert!(page.has_more);
        assert_eq!(page.last_key, Some(BlueprintId::from("c")));
        assert_eq!(page.last_value, Some(30));
        assert!(cache.summary(&BlueprintId::from("e")).unwrap().is_some());

        let cursor = (BlueprintId::from("c"), 30);
        let second = queries
            .fetch_recent_page(Some(cursor))
            .await
            .expect("fetch should succeed")
            .into_value();
        let keys: Vec<&str> = second.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "b"]);
        assert_eq!(second.last_key, Some(BlueprintId::from("a")));

        let list = cache.recent_summaries().unwrap().expect("list should be cached");
        assert_eq!(list.pages.len(), 2);
        assert_eq!(list.len(), 4);

        let third = queries
            .fetch_recent_page(Some((BlueprintId::from("a"), 10)))
            .await
            .expect("fetch should succeed")
            .into_value();
        assert_eq!(third.entries.len(), 1);
        assert!(!third.has_more);
    }

    #[tokio::test]
    async fn test_first_page_served_from_cache() {
        let (store, _cache, queries) = setup(
            json!({ "blueprintSummaries": { "a": summary_json("A", 10) } }),
            60,
        );
        queries.fetch_recent_page(None).await.expect("fetch should succeed");
        let again = queries.fetch_recent_page(None).await.expect("fetch should succeed");
        assert!(again.was_cache_hit());
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_summary_keeps_next_page_reachable() {
        let mut broken = summary_json("D", 40);
        broken.as_object_mut().expect("summary is an object").remove("imgurId");
        let (_store, _cache, queries) = setup(
            json!({
                "blueprintSummaries": {
                    "a": summary_json("A", 10),
                    "b": summary_json("B", 20),
                    "c": summary_json("C", 30),
                    "d": broken,
                    "e": summary_json("E", 50)
                }
            }),
            2,
        );

        let page = queries
            .fetch_recent_page(None)
            .await
            .expect("fetch should succeed")
            .into_value();
        let keys: Vec<&str> = page.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["e"]);
        assert!(page.has_more);
        assert_eq!(page.last_key, Some(BlueprintId::from("c")));
        assert_eq!(page.last_value, Some(30));
    }

    #[tokio::test]
    async fn test_summaries_since_is_inclusive_and_newest_first() {
        let (store, cache, queries) = setup(
            json!({
                "blueprintSummaries": {
                    "a": summary_json("A", 10),
                    "b": summary_json("B", 20),
                    "c": summary_json("C", 30)
                }
            }),
            2,
        );
        let old: BlueprintSummary =
            serde_json::from_value(summary_json("Old B", 5)).expect("summary should decode");
        cache.set_summary(&BlueprintId::from("b"), old).unwrap();

        let entries = queries.fetch_summaries_since(20).await.expect("fetch should succeed");
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "b"]);
        let b = cache.summary(&BlueprintId::from("b")).unwrap().expect("summary should be cached");
        assert_eq!(b.title, "B");
        assert_eq!(store.read_count(), 1);
    }

    #[test]
    fn test_decode_key_set_rejects_scalars() {
        let path = DbPath::parse("byTag/combat");
        assert!(decode_key_set(&path, Some(json!(3))).is_err());
        let set = decode_key_set(&path, Some(json!({"a": true, "b": false}))).unwrap();
        assert_eq!(set.len(), 1);
    }
}
