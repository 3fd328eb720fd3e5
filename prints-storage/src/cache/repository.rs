//! Cache repository trait.
//!
//! Implementations provide a handful of untyped primitives; the typed
//! accessors used by queries and mutations are provided on top of them.
//! Typed getters fail with `CacheError::ShapeMismatch` when a key holds the
//! wrong kind of value, and typed setters validate before writing.
//!
//! Every read-modify-write goes through [`CacheRepository::update`], which
//! applies the change under the implementation's write lock, so concurrent
//! patches to the same entry never lose each other's changes.

use std::time::Duration;

use prints_core::validate::{validate_record, validate_summary};
use prints_core::{
    now_millis, BlueprintId, BlueprintRecord, BlueprintSummary, CacheError, KeySet,
    PaginatedSummaries, UserId, ValidationError,
};
use tokio::sync::broadcast;

use super::entry::{CacheEntry, CacheEvent, CacheValue};
use super::key::QueryKey;

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of explicit invalidations.
    pub invalidations: u64,
    /// Number of evictions.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

fn mismatch(key: &QueryKey, found: &CacheValue) -> CacheError {
    CacheError::ShapeMismatch {
        key: key.to_string(),
        expected: key.expected_shape(),
        found: found.shape(),
    }
}

fn invalid(key: &QueryKey, source: ValidationError) -> CacheError {
    CacheError::Invalid {
        key: key.to_string(),
        source,
    }
}

fn check_tag(key: &QueryKey, tag: &str) -> Result<(), CacheError> {
    if tag.trim().is_empty() {
        return Err(invalid(
            key,
            ValidationError::InvalidValue {
                field: "tag".to_string(),
                reason: "tag must not be blank".to_string(),
            },
        ));
    }
    Ok(())
}

/// Process-wide query cache.
pub trait CacheRepository: Send + Sync {
    // ========================================================================
    // PRIMITIVES
    // ========================================================================

    /// Raw entry under `key`, stale or not.
    fn entry(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Write a value and broadcast `Updated`. Rejects values of the wrong shape.
    fn put(&self, key: QueryKey, value: CacheValue) -> Result<(), CacheError>;

    /// Mark an entry stale without removing it. Returns whether it existed.
    fn invalidate(&self, key: &QueryKey) -> Result<bool, CacheError>;

    /// Rewrite the value under `key` atomically.
    ///
    /// `apply` edits a copy of the current value and returns whether it
    /// changed anything. An error or `false` leaves the entry as it was; the
    /// result must still fit the key. Absent keys stay absent. Returns
    /// whether a new value was written, in which case `Updated` is
    /// broadcast. `apply` must not call back into the cache.
    fn update(
        &self,
        key: &QueryKey,
        apply: &mut dyn FnMut(&mut CacheValue) -> Result<bool, CacheError>,
    ) -> Result<bool, CacheError>;

    /// Remove an entry. Returns whether it existed.
    fn evict(&self, key: &QueryKey) -> Result<bool, CacheError>;

    /// Keys currently cached.
    fn keys(&self) -> Result<Vec<QueryKey>, CacheError>;

    /// Subscribe to the cache-event stream.
    fn subscribe(&self) -> broadcast::Receiver<CacheEvent>;

    /// Age after which an entry counts as stale.
    fn stale_time(&self) -> Duration;

    fn stats(&self) -> CacheStats;

    // ========================================================================
    // FRESHNESS
    // ========================================================================

    fn contains(&self, key: &QueryKey) -> Result<bool, CacheError> {
        Ok(self.entry(key)?.is_some())
    }

    /// True when the entry is absent, invalidated or too old.
    fn is_stale(&self, key: &QueryKey) -> Result<bool, CacheError> {
        Ok(self
            .entry(key)?
            .map_or(true, |entry| entry.is_stale_at(now_millis(), self.stale_time())))
    }

    // ========================================================================
    // RECORDS AND SUMMARIES
    // ========================================================================

    fn record(&self, id: &BlueprintId) -> Result<Option<BlueprintRecord>, CacheError> {
        let key = QueryKey::blueprint(id);
        match self.entry(&key)?.map(|entry| entry.value) {
            None => Ok(None),
            Some(CacheValue::Record(record)) => Ok(Some(record)),
            Some(other) => Err(mismatch(&key, &other)),
        }
    }

    fn set_record(&self, id: &BlueprintId, record: BlueprintRecord) -> Result<(), CacheError> {
        let key = QueryKey::blueprint(id);
        validate_record(&record).map_err(|e| invalid(&key, e))?;
        self.put(key, CacheValue::Record(record))
    }

    /// Apply `patch` to the cached record. Returns false when none is cached.
    fn patch_record(
        &self,
        id: &BlueprintId,
        patch: &mut dyn FnMut(&mut BlueprintRecord),
    ) -> Result<bool, CacheError> {
        let key = QueryKey::blueprint(id);
        self.update(&key, &mut |value: &mut CacheValue| match value {
            CacheValue::Record(record) => {
                patch(record);
                validate_record(record).map_err(|e| invalid(&key, e))?;
                Ok(true)
            }
            other => Err(mismatch(&key, other)),
        })
    }

    fn summary(&self, id: &BlueprintId) -> Result<Option<BlueprintSummary>, CacheError> {
        let key = QueryKey::summary(id);
        match self.entry(&key)?.map(|entry| entry.value) {
            None => Ok(None),
            Some(CacheValue::Summary(summary)) => Ok(Some(summary)),
            Some(other) => Err(mismatch(&key, &other)),
        }
    }

    fn set_summary(&self, id: &BlueprintId, summary: BlueprintSummary) -> Result<(), CacheError> {
        let key = QueryKey::summary(id);
        validate_summary(&summary).map_err(|e| invalid(&key, e))?;
        self.put(key, CacheValue::Summary(summary))
    }

    /// Apply `patch` to the cached summary. Returns false when none is cached.
    fn patch_summary(
        &self,
        id: &BlueprintId,
        patch: &mut dyn FnMut(&mut BlueprintSummary),
    ) -> Result<bool, CacheError> {
        let key = QueryKey::summary(id);
        self.update(&key, &mut |value: &mut CacheValue| match value {
            CacheValue::Summary(summary) => {
                patch(summary);
                validate_summary(summary).map_err(|e| invalid(&key, e))?;
                Ok(true)
            }
            other => Err(mismatch(&key, other)),
        })
    }

    fn recent_summaries(&self) -> Result<Option<PaginatedSummaries>, CacheError> {
        let key = QueryKey::RecentSummaries;
        match self.entry(&key)?.map(|entry| entry.value) {
            None => Ok(None),
            Some(CacheValue::RecentSummaries(list)) => Ok(Some(list)),
            Some(other) => Err(mismatch(&key, &other)),
        }
    }

    fn set_recent_summaries(&self, list: PaginatedSummaries) -> Result<(), CacheError> {
        let key = QueryKey::RecentSummaries;
        for entry in list.entries() {
            validate_summary(&entry.summary).map_err(|e| invalid(&key, e))?;
        }
        self.put(key, CacheValue::RecentSummaries(list))
    }

    /// Edit the cached recency list. `patch` returns whether it changed the
    /// list. Returns false when no list is cached.
    fn patch_recent_summaries(
        &self,
        patch: &mut dyn FnMut(&mut PaginatedSummaries) -> bool,
    ) -> Result<bool, CacheError> {
        let key = QueryKey::RecentSummaries;
        self.update(&key, &mut |value: &mut CacheValue| match value {
            CacheValue::RecentSummaries(list) => {
                if !patch(list) {
                    return Ok(false);
                }
                for entry in list.entries() {
                    validate_summary(&entry.summary).map_err(|e| invalid(&key, e))?;
                }
                Ok(true)
            }
            other => Err(mismatch(&key, other)),
        })
    }

    // ========================================================================
    // INDEXES
    // ========================================================================

    /// Key set under any of the key-set shaped keys.
    fn key_set(&self, key: &QueryKey) -> Result<Option<KeySet>, CacheError> {
        match self.entry(key)?.map(|entry| entry.value) {
            None => Ok(None),
            Some(CacheValue::KeySet(set)) => Ok(Some(set)),
            Some(other) => Err(mismatch(key, &other)),
        }
    }

    /// Edit a cached key set. `patch` returns whether it changed the set.
    /// Returns false when the set is not cached or was left unchanged.
    fn patch_key_set(
        &self,
        key: &QueryKey,
        patch: &mut dyn FnMut(&mut KeySet) -> bool,
    ) -> Result<bool, CacheError> {
        if let QueryKey::TagIndex { tag } = key {
            check_tag(key, tag)?;
        }
        self.update(key, &mut |value: &mut CacheValue| match value {
            CacheValue::KeySet(set) => Ok(patch(set)),
            other => Err(mismatch(key, other)),
        })
    }

    /// Add `id` to the cached key set under `key`, if it is cached.
    fn add_to_key_set(&self, key: &QueryKey, id: &BlueprintId) -> Result<bool, CacheError> {
        self.patch_key_set(key, &mut |set: &mut KeySet| {
            if set.contains(id) {
                return false;
            }
            set.insert(id.clone());
            true
        })
    }

    /// Drop `id` from the cached key set under `key`, if present.
    fn remove_from_key_set(&self, key: &QueryKey, id: &BlueprintId) -> Result<bool, CacheError> {
        self.patch_key_set(key, &mut |set: &mut KeySet| set.remove(id))
    }

    fn tag_index(&self, tag: &str) -> Result<Option<KeySet>, CacheError> {
        self.key_set(&QueryKey::tag_index(tag))
    }

    fn set_tag_index(&self, tag: &str, keys: KeySet) -> Result<(), CacheError> {
        let key = QueryKey::tag_index(tag);
        check_tag(&key, tag)?;
        self.put(key, CacheValue::KeySet(keys))
    }

    /// Tags whose index is currently cached.
    fn cached_tags(&self) -> Result<Vec<String>, CacheError> {
        let mut tags: Vec<String> = self
            .keys()?
            .into_iter()
            .filter_map(|key| match key {
                QueryKey::TagIndex { tag } => Some(tag),
                _ => None,
            })
            .collect();
        tags.sort();
        Ok(tags)
    }

    fn user_blueprints(&self, user: &UserId) -> Result<Option<KeySet>, CacheError> {
        self.key_set(&QueryKey::user_blueprints(user))
    }

    fn set_user_blueprints(&self, user: &UserId, keys: KeySet) -> Result<(), CacheError> {
        self.put(QueryKey::user_blueprints(user), CacheValue::KeySet(keys))
    }

    fn user_favorites(&self, user: &UserId) -> Result<Option<KeySet>, CacheError> {
        self.key_set(&QueryKey::user_favorites(user))
    }

    fn set_user_favorites(&self, user: &UserId, keys: KeySet) -> Result<(), CacheError> {
        self.put(QueryKey::user_favorites(user), CacheValue::KeySet(keys))
    }

    // ========================================================================
    // FAVORITE FLAGS
    // ========================================================================

    /// Flag under either directional flag key.
    fn favorite_flag(&self, key: &QueryKey) -> Result<Option<bool>, CacheError> {
        match self.entry(key)?.map(|entry| entry.value) {
            None => Ok(None),
            Some(CacheValue::Flag(flag)) => Ok(Some(flag)),
            Some(other) => Err(mismatch(key, &other)),
        }
    }

    fn set_user_favorite_flag(
        &self,
        user: &UserId,
        id: &BlueprintId,
        favorited: bool,
    ) -> Result<(), CacheError> {
        self.put(QueryKey::user_favorite_flag(user, id), CacheValue::Flag(favorited))
    }

    fn set_blueprint_favorite_flag(
        &self,
        id: &BlueprintId,
        user: &UserId,
        favorited: bool,
    ) -> Result<(), CacheError> {
        self.put(QueryKey::blueprint_favorite_flag(id, user), CacheValue::Flag(favorited))
    }

    // ========================================================================
    // TAGS
    // ========================================================================

    fn known_tags(&self) -> Result<Option<Vec<String>>, CacheError> {
        let key = QueryKey::KnownTags;
        match self.entry(&key)?.map(|entry| entry.value) {
            None => Ok(None),
            Some(CacheValue::Tags(tags)) => Ok(Some(tags)),
            Some(other) => Err(mismatch(&key, &other)),
        }
    }

    fn set_known_tags(&self, tags: Vec<String>) -> Result<(), CacheError> {
        let key = QueryKey::KnownTags;
        for tag in &tags {
            check_tag(&key, tag)?;
        }
        self.put(key, CacheValue::Tags(tags))
    }
}
