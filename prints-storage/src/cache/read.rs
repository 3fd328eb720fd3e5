//! Read results carrying cache metadata.

use prints_core::{now_millis, EpochMillis};
use std::time::Duration;

/// Result of a read-through query.
///
/// Carries whether the value came from the cache or a remote read, and
/// when it was cached.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    cached_at: EpochMillis,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// A value served from a fresh cache entry.
    pub fn from_cache(value: T, cached_at: EpochMillis) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: true,
        }
    }

    /// A value just read from the tree store.
    pub fn from_remote(value: T) -> Self {
        Self {
            value,
            cached_at: now_millis(),
            was_cache_hit: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn cached_at(&self) -> EpochMillis {
        self.cached_at
    }

    /// Time since the value was cached.
    pub fn staleness(&self) -> Duration {
        let age = now_millis().saturating_sub(self.cached_at);
        Duration::from_millis(age.max(0) as u64)
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            was_cache_hit: self.was_cache_hit,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_read_from_cache() {
        let read = CacheRead::from_cache("value", 1_000);
        assert!(read.was_cache_hit());
        assert_eq!(read.cached_at(), 1_000);
        assert!(read.staleness() > Duration::from_secs(1));
    }

    #[test]
    fn test_cache_read_from_remote() {
        let read = CacheRead::from_remote(42i32);
        assert!(read.was_cache_miss());
        assert!(read.staleness() < Duration::from_secs(5));
        assert_eq!(read.map(|v| v.to_string()).into_value(), "42");
    }
}
