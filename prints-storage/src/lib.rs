//! Factorio Prints Storage
//!
//! The backing tree-store port, the typed query cache that mirrors it, and
//! the bridge that persists the cache across restarts.
//!
//! # Modules
//!
//! - [`remote`]: async port over the hosted tree database plus an in-memory
//!   implementation for tests and local runs
//! - [`cache`]: typed query keys, entries, the cache-event stream and
//!   read-through queries
//! - [`persist`]: durable key-value stores, worker/inline ports, debounce
//!   and the snapshot persister

pub mod cache;
pub mod persist;
pub mod remote;

pub use cache::{
    CacheEntry, CacheEvent, CacheEventKind, CacheRead, CacheRepository, CacheStats, CacheValue,
    QueryCache, QueryKey, ReadThrough,
};
pub use persist::{
    open_durable, select_port, CachePersister, Debouncer, DurablePort, InlinePort,
    KeyValueStore, LmdbStore, MemoryStore, PersistedSnapshot, PortKind, WorkerPort,
};
pub use remote::{
    paths, retry, DbPath, EndAt, InMemoryTreeStore, MultiPathUpdate, OrderBy, OrderedQuery,
    TreeStore, WriteValue,
};
