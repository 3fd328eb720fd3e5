//! Durable persistence of the query cache.
//!
//! # Overview
//!
//! - [`KeyValueStore`]: synchronous byte store ([`LmdbStore`], [`MemoryStore`])
//! - [`DurablePort`]: async access, over a background worker or inline
//! - [`Debouncer`]: leading/trailing debounce with a max wait
//! - [`CachePersister`]: debounced snapshot writes and validated restores

mod debounce;
mod kv;
mod persister;
mod port;

use std::sync::Arc;

use prints_core::{PersistError, PrintsConfig};

pub use debounce::Debouncer;
pub use kv::{KeyValueStore, LmdbStore, LmdbStoreError, MemoryStore};
pub use persister::{CachePersister, PersistedSnapshot};
pub use port::{select_port, DurablePort, InlinePort, PortKind, WorkerPort};

/// Open the configured LMDB store behind the best available port.
pub fn open_durable(config: &PrintsConfig) -> Result<Arc<dyn DurablePort>, PersistError> {
    let path = config.durable_path.clone();
    let size_mb = config.durable_map_size_mb;
    select_port(
        move || LmdbStore::open(&path, size_mb).map_err(PersistError::from),
        config.worker_timeout,
        &config.cache_key,
    )
}
