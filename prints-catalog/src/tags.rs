//! Tag hierarchy sources.
//!
//! The hierarchy is a map of category to tag names, stored under `/tags`.
//! Flattened, each tag becomes `/{category}/{name}/`, the form stored on
//! records and used as tag-index path.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prints_core::{now_millis, PrintsResult, StoreError};
use prints_storage::{paths, retry, CacheRead, QueryKey, TreeStore};
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::{patched, Catalog};

/// Category name to tag names.
pub type TagHierarchy = BTreeMap<String, Vec<String>>;

/// Flatten a hierarchy into `/{category}/{name}/` tags, categories in order.
pub fn flatten_hierarchy(hierarchy: &TagHierarchy) -> Vec<String> {
    hierarchy
        .iter()
        .flat_map(|(category, names)| names.iter().map(move |name| format!("/{category}/{name}/")))
        .collect()
}

fn parse_hierarchy(source: &str, value: Value) -> Result<TagHierarchy, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Decode {
        path: source.to_string(),
        reason: format!("tag hierarchy has unexpected format: {e}"),
    })
}

/// Where the tag hierarchy comes from.
#[async_trait]
pub trait TagSource: Send + Sync {
    async fn hierarchy(&self) -> Result<TagHierarchy, StoreError>;
}

// ============================================================================
// TREE STORE
// ============================================================================

/// Reads the hierarchy from `/tags` of the tree store.
pub struct StoreTagSource {
    store: Arc<dyn TreeStore>,
    retries: u32,
}

impl StoreTagSource {
    pub fn new(store: Arc<dyn TreeStore>, retries: u32) -> Self {
        Self { store, retries }
    }
}

#[async_trait]
impl TagSource for StoreTagSource {
    async fn hierarchy(&self) -> Result<TagHierarchy, StoreError> {
        let path = paths::tags();
        match retry("get", self.retries, || self.store.get(&path)).await? {
            Some(value) => parse_hierarchy(&path.to_string(), value),
            None => Ok(TagHierarchy::new()),
        }
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Fetches the hierarchy as JSON from an HTTP endpoint.
#[derive(Clone)]
pub struct HttpTagSource {
    client: reqwest::Client,
    url: String,
}

impl HttpTagSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::TagSource {
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TagSource for HttpTagSource {
    async fn hierarchy(&self) -> Result<TagHierarchy, StoreError> {
        let tag_source = |e: reqwest::Error| StoreError::TagSource {
            reason: e.to_string(),
        };
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(tag_source)?
            .error_for_status()
            .map_err(tag_source)?;
        let value: Value = response.json().await.map_err(tag_source)?;
        parse_hierarchy(&self.url, value)
    }
}

// ============================================================================
// CACHED TAG LIST
// ============================================================================

impl Catalog {
    /// Flattened tag list, served from cache while fresh.
    pub async fn fetch_known_tags(
        &self,
        source: &dyn TagSource,
    ) -> PrintsResult<CacheRead<Vec<String>>> {
        let key = QueryKey::KnownTags;
        let cache = self.cache();
        match cache.entry(&key) {
            Ok(Some(entry)) if !entry.is_stale_at(now_millis(), cache.stale_time()) => {
                match cache.known_tags() {
                    Ok(Some(tags)) => return Ok(CacheRead::from_cache(tags, entry.updated_at)),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Ignoring misshapen tag list"),
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Tag list lookup failed, fetching"),
        }

        let tags = flatten_hierarchy(&source.hierarchy().await?);
        debug!(count = tags.len(), "Tag list fetched");
        patched("fetch_tags", &key, cache.set_known_tags(tags.clone()));
        Ok(CacheRead::from_remote(tags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prints_core::PrintsConfig;
    use prints_storage::{CacheRepository, InMemoryTreeStore, QueryCache};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TagSource for CountingSource {
        async fn hierarchy(&self) -> Result<TagHierarchy, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TagHierarchy::from([(
                "belt".to_string(),
                vec!["balancer".to_string()],
            )]))
        }
    }

    #[test]
    fn test_flatten_hierarchy() {
        let hierarchy = TagHierarchy::from([
            ("belt".to_string(), vec!["balancer".to_string(), "prioritizer".to_string()]),
            ("combat".to_string(), vec!["defense".to_string()]),
        ]);
        assert_eq!(
            flatten_hierarchy(&hierarchy),
            vec!["/belt/balancer/", "/belt/prioritizer/", "/combat/defense/"]
        );
    }

    #[tokio::test]
    async fn test_store_source_reads_tags_node() {
        let store = Arc::new(InMemoryTreeStore::with_root(json!({
            "tags": { "train": ["station", "junction"] }
        })));
        let source = StoreTagSource::new(store, 0);
        let hierarchy = source.hierarchy().await.expect("hierarchy should load");
        assert_eq!(flatten_hierarchy(&hierarchy), vec!["/train/station/", "/train/junction/"]);
    }

    #[tokio::test]
    async fn test_store_source_rejects_malformed_hierarchy() {
        let store = Arc::new(InMemoryTreeStore::with_root(json!({ "tags": { "train": 3 } })));
        let source = StoreTagSource::new(store, 0);
        assert!(matches!(source.hierarchy().await, Err(StoreError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_known_tags_are_cached() {
        let store = Arc::new(InMemoryTreeStore::new());
        let cache = Arc::new(QueryCache::default());
        let catalog = Catalog::new(store, cache.clone(), PrintsConfig::default());
        let source = CountingSource {
            calls: AtomicU32::new(0),
        };

        let first = catalog.fetch_known_tags(&source).await.expect("fetch should succeed");
        assert!(first.was_cache_miss());
        let second = catalog.fetch_known_tags(&source).await.expect("fetch should succeed");
        assert!(second.was_cache_hit());
        assert_eq!(second.into_value(), vec!["/belt/balancer/"]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.known_tags().unwrap(), Some(vec!["/belt/balancer/".to_string()]));
    }
}
