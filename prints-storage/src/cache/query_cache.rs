//! In-process query cache.
//!
//! Entries live in a `RwLock<HashMap>`; every change is broadcast on the
//! cache-event stream. `snapshot`/`restore` feed the persister.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use prints_core::{now_millis, CacheError, PrintsConfig};
use tokio::sync::broadcast;
use tracing::debug;

use super::entry::{CacheEntry, CacheEvent, CacheValue};
use super::key::QueryKey;
use super::repository::{CacheRepository, CacheStats};

/// Buffered events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 1024;

pub struct QueryCache {
    entries: RwLock<HashMap<QueryKey, CacheEntry>>,
    events: broadcast::Sender<CacheEvent>,
    stale_time: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    evictions: AtomicU64,
}

impl QueryCache {
    pub fn new(stale_time: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            events,
            stale_time,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &PrintsConfig) -> Self {
        Self::new(config.stale_time)
    }

    /// Copy of every entry, for persistence.
    pub fn snapshot(&self) -> Result<Vec<(QueryKey, CacheEntry)>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
        Ok(entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect())
    }

    /// Load persisted entries. Entries whose value does not fit their key are
    /// skipped. Returns the number loaded. No events are broadcast.
    pub fn restore(&self, restored: Vec<(QueryKey, CacheEntry)>) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        let mut loaded = 0;
        for (key, entry) in restored {
            if entry.value.fits(&key) {
                entries.insert(key, entry);
                loaded += 1;
            }
        }
        debug!(loaded, "Restored query cache entries");
        Ok(loaded)
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        self.entries
            .write()
            .map_err(|_| CacheError::LockPoisoned)?
            .clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn broadcast(&self, event: CacheEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::from_config(&PrintsConfig::default())
    }
}

impl CacheRepository for QueryCache {
    fn entry(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
        let entry = entries.get(key).cloned();
        if entry.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(entry)
    }

    fn put(&self, key: QueryKey, value: CacheValue) -> Result<(), CacheError> {
        if !value.fits(&key) {
            return Err(CacheError::ShapeMismatch {
                key: key.to_string(),
                expected: key.expected_shape(),
                found: value.shape(),
            });
        }
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        entries.insert(key.clone(), CacheEntry::new(value.clone(), now_millis()));
        debug!(key = %key, shape = value.shape(), "Cache entry updated");
        // Sent under the lock so event order matches write order.
        self.broadcast(CacheEvent::updated(key, value));
        Ok(())
    }

    fn update(
        &self,
        key: &QueryKey,
        apply: &mut dyn FnMut(&mut CacheValue) -> Result<bool, CacheError>,
    ) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };
        let mut value = entry.value.clone();
        if !apply(&mut value)? {
            return Ok(false);
        }
        if !value.fits(key) {
            return Err(CacheError::ShapeMismatch {
                key: key.to_string(),
                expected: key.expected_shape(),
                found: value.shape(),
            });
        }
        *entry = CacheEntry::new(value.clone(), now_millis());
        debug!(key = %key, shape = value.shape(), "Cache entry patched");
        self.broadcast(CacheEvent::updated(key.clone(), value));
        Ok(true)
    }

    fn invalidate(&self, key: &QueryKey) -> Result<bool, CacheError> {
        let existed = {
            let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
            match entries.get_mut(key) {
                Some(entry) => {
                    entry.invalidated = true;
                    true
                }
                None => false,
            }
        };
        if existed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache entry invalidated");
            self.broadcast(CacheEvent::invalidated(key.clone()));
        }
        Ok(existed)
    }

    fn evict(&self, key: &QueryKey) -> Result<bool, CacheError> {
        let existed = self
            .entries
            .write()
            .map_err(|_| CacheError::LockPoisoned)?
            .remove(key)
            .is_some();
        if existed {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache entry removed");
            self.broadcast(CacheEvent::removed(key.clone()));
        }
        Ok(existed)
    }

    fn keys(&self) -> Result<Vec<QueryKey>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
        Ok(entries.keys().cloned().collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn stale_time(&self) -> Duration {
        self.stale_time
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::CacheEventKind;
    use prints_core::{
        Author, BlueprintId, BlueprintRecord, BlueprintSummary, ImageRef, KeySet, UserId,
        DEFAULT_IMAGE_TYPE,
    };
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn record(title: &str) -> BlueprintRecord {
        BlueprintRecord {
            title: title.to_string(),
            blueprint_string: "0eNq".to_string(),
            description_markdown: String::new(),
            tags: vec!["combat".to_string()],
            author: Author {
                user_id: UserId::from("u1"),
                display_name: None,
            },
            author_id: Some(UserId::from("u1")),
            created_date: 1,
            last_updated_date: 2,
            number_of_favorites: 0,
            favorites: BTreeMap::new(),
            image: ImageRef::new("abc1234", DEFAULT_IMAGE_TYPE),
            image_url: None,
            file_name: None,
        }
    }

    #[test]
    fn test_set_and_get_record() {
        let cache = QueryCache::default();
        let id = BlueprintId::from("k1");
        assert_eq!(cache.record(&id).unwrap(), None);

        cache.set_record(&id, record("Smelter")).expect("set should succeed");
        assert_eq!(cache.record(&id).unwrap().map(|r| r.title), Some("Smelter".to_string()));
        assert!(!cache.is_stale(&QueryKey::blueprint(&id)).unwrap());
    }

    #[test]
    fn test_put_rejects_wrong_shape() {
        let cache = QueryCache::default();
        let err = cache
            .put(QueryKey::KnownTags, CacheValue::Flag(true))
            .unwrap_err();
        assert!(matches!(err, CacheError::ShapeMismatch { expected: "tags", found: "flag", .. }));
    }

    #[test]
    fn test_getter_reports_shape_mismatch() {
        let cache = QueryCache::default();
        cache.set_known_tags(vec!["combat".to_string()]).unwrap();
        let err = cache.key_set(&QueryKey::KnownTags).unwrap_err();
        assert!(matches!(err, CacheError::ShapeMismatch { found: "tags", .. }));
    }

    #[test]
    fn test_restore_skips_misfit_entries() {
        let cache = QueryCache::default();
        let key = QueryKey::tag_index("combat");
        let loaded = cache
            .restore(vec![(key, CacheEntry::new(CacheValue::Flag(true), 0))])
            .unwrap();
        assert_eq!(loaded, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_record_validates() {
        let cache = QueryCache::default();
        let mut bad = record("Broken");
        bad.image.id.clear();
        let err = cache.set_record(&BlueprintId::from("k1"), bad).unwrap_err();
        assert!(matches!(err, CacheError::Invalid { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_patch_record_absent_is_noop() {
        let cache = QueryCache::default();
        let patched = cache
            .patch_record(&BlueprintId::from("nope"), &mut |r: &mut BlueprintRecord| r.title.clear())
            .unwrap();
        assert!(!patched);
    }

    #[test]
    fn test_update_leaves_entry_on_error() {
        let cache = QueryCache::default();
        let id = BlueprintId::from("k1");
        cache.set_record(&id, record("Smelter")).expect("set should succeed");
        let result = cache.patch_record(&id, &mut |r: &mut BlueprintRecord| r.image.id.clear());
        assert!(matches!(result, Err(CacheError::Invalid { .. })));
        assert_eq!(cache.record(&id).unwrap().map(|r| r.image.id), Some("abc1234".to_string()));
    }

    #[test]
    fn test_update_unchanged_skips_write() {
        let cache = QueryCache::default();
        let key = QueryKey::tag_index("combat");
        cache.set_tag_index("combat", KeySet::new()).unwrap();
        let mut events = cache.subscribe();
        assert!(!cache.remove_from_key_set(&key, &BlueprintId::from("k1")).unwrap());
        assert!(events.try_recv().is_err());
        assert!(!cache
            .add_to_key_set(&QueryKey::tag_index("logistics"), &BlueprintId::from("k1"))
            .unwrap());
        assert!(!cache.contains(&QueryKey::tag_index("logistics")).unwrap());
    }

    #[test]
    fn test_patch_key_set_reports_shape_mismatch() {
        let cache = QueryCache::default();
        cache.set_known_tags(vec!["combat".to_string()]).unwrap();
        let err = cache
            .add_to_key_set(&QueryKey::KnownTags, &BlueprintId::from("k1"))
            .unwrap_err();
        assert!(matches!(err, CacheError::ShapeMismatch { found: "tags", .. }));
    }

    #[test]
    fn test_concurrent_key_set_patches_keep_every_key() {
        let cache = Arc::new(QueryCache::default());
        let key = QueryKey::tag_index("combat");
        cache.set_tag_index("combat", KeySet::new()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                std::thread::spawn(move || {
                    for n in 0..50 {
                        let id = BlueprintId::from(format!("k{worker}-{n}"));
                        cache.add_to_key_set(&key, &id).expect("patch should succeed");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker should finish");
        }

        assert_eq!(cache.tag_index("combat").unwrap().map(|set| set.len()), Some(400));
    }

    #[test]
    fn test_invalidate_marks_stale_and_keeps_value() {
        let cache = QueryCache::default();
        cache.set_tag_index("combat", KeySet::new()).unwrap();
        let key = QueryKey::tag_index("combat");
        assert!(cache.invalidate(&key).unwrap());
        assert!(cache.is_stale(&key).unwrap());
        assert_eq!(cache.tag_index("combat").unwrap(), Some(KeySet::new()));
        assert!(!cache.invalidate(&QueryKey::tag_index("logistics")).unwrap());
    }

    #[test]
    fn test_cached_tags_lists_tag_indexes_only() {
        let cache = QueryCache::default();
        cache.set_tag_index("logistics", KeySet::new()).unwrap();
        cache.set_tag_index("combat", KeySet::new()).unwrap();
        cache.set_known_tags(vec!["combat".to_string()]).unwrap();
        assert_eq!(cache.cached_tags().unwrap(), vec!["combat", "logistics"]);
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let cache = QueryCache::default();
        let mut events = cache.subscribe();
        let id = BlueprintId::from("k1");

        cache
            .set_summary(&id, BlueprintSummary::from_record(&record("Smelter")))
            .unwrap();
        cache.invalidate(&QueryKey::summary(&id)).unwrap();
        cache.evict(&QueryKey::summary(&id)).unwrap();

        let kinds: Vec<CacheEventKind> = (0..3)
            .map(|_| events.try_recv().expect("event should be queued").kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                CacheEventKind::Updated,
                CacheEventKind::Invalidated,
                CacheEventKind::Removed
            ]
        );
    }

    #[test]
    fn test_snapshot_restore() {
        let cache = QueryCache::default();
        cache.set_record(&BlueprintId::from("k1"), record("Smelter")).unwrap();
        cache.set_user_favorite_flag(&UserId::from("u1"), &BlueprintId::from("k1"), true).unwrap();
        let snapshot = cache.snapshot().unwrap();

        let restored = QueryCache::default();
        assert_eq!(restored.restore(snapshot).unwrap(), 2);
        assert_eq!(
            restored
                .favorite_flag(&QueryKey::user_favorite_flag(&UserId::from("u1"), &BlueprintId::from("k1")))
                .unwrap(),
            Some(true)
        );
    }

    #[test]
    fn test_stats() {
        let cache = QueryCache::default();
        let id = BlueprintId::from("k1");
        cache.record(&id).unwrap();
        cache.set_record(&id, record("Smelter")).unwrap();
        cache.record(&id).unwrap();
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }
}
