//! Typed query cache.
//!
//! This module mirrors tree-store reads in process and broadcasts every
//! change on the cache-event stream.
//!
//! # Overview
//!
//! - [`QueryKey`]: one variant per cached query
//! - [`CacheValue`] / [`CacheEntry`]: typed payload with freshness metadata
//! - [`CacheEvent`]: `Updated`/`Invalidated`/`Removed` notifications
//! - [`CacheRepository`]: typed accessors over a cache implementation
//! - [`QueryCache`]: the process-wide implementation
//! - [`ReadThrough`]: read-through queries against a tree store
//! - [`CacheRead`]: query results with hit/miss metadata

mod entry;
mod key;
mod queries;
mod query_cache;
mod read;
mod repository;

pub use entry::{CacheEntry, CacheEvent, CacheEventKind, CacheValue};
pub use key::QueryKey;
pub use queries::{decode_key_set, PageCursor, ReadThrough};
pub use query_cache::QueryCache;
pub use read::CacheRead;
pub use repository::{CacheRepository, CacheStats};
