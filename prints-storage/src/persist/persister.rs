//! Query cache snapshot persistence.
//!
//! Snapshots are JSON documents stored under one key of the durable port,
//! tagged with a buster string and a timestamp. A snapshot with another
//! buster, older than the max age, or that fails to decode is discarded and
//! deleted on restore. Every persistence failure is logged and swallowed.

use std::sync::Arc;
use std::time::Duration;

use prints_core::{now_millis, EpochMillis, PersistError, PrintsConfig};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::debounce::Debouncer;
use super::port::DurablePort;
use crate::cache::{CacheEntry, CacheRepository, QueryCache, QueryKey};

/// Persisted form of the query cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub buster: String,
    pub timestamp: EpochMillis,
    pub entries: Vec<(QueryKey, CacheEntry)>,
}

async fn write_snapshot(port: &dyn DurablePort, key: &str, snapshot: PersistedSnapshot) {
    let bytes = match serde_json::to_vec(&snapshot) {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = PersistError::Serialization {
                reason: e.to_string(),
            };
            error!(error = %err, "Failed to encode cache snapshot");
            return;
        }
    };
    let size = bytes.len();
    match port.set(key, bytes).await {
        Ok(()) => debug!(key, size, entries = snapshot.entries.len(), "Persisted cache snapshot"),
        Err(e) => error!(key, error = %e, "Failed to persist cache snapshot"),
    }
}

/// Debounced writer and reader of query cache snapshots.
pub struct CachePersister {
    port: Arc<dyn DurablePort>,
    debouncer: Debouncer<PersistedSnapshot>,
    key: String,
    buster: String,
    max_age: Option<Duration>,
}

impl CachePersister {
    /// Create a persister. Must be called inside a tokio runtime.
    pub fn new(port: Arc<dyn DurablePort>, config: &PrintsConfig) -> Self {
        let key = config.cache_key.clone();
        let writer_port = port.clone();
        let writer_key = key.clone();
        let debouncer = Debouncer::spawn(config.persist_wait, config.persist_max_wait, move |snapshot| {
            let port = writer_port.clone();
            let key = writer_key.clone();
            async move { write_snapshot(port.as_ref(), &key, snapshot).await }
        });

        Self {
            port,
            debouncer,
            key,
            buster: config.buster.clone(),
            max_age: config.max_age,
        }
    }

    /// Schedule a write of `entries`.
    pub fn persist(&self, entries: Vec<(QueryKey, CacheEntry)>) {
        self.debouncer.call(PersistedSnapshot {
            buster: self.buster.clone(),
            timestamp: now_millis(),
            entries,
        });
    }

    /// Write any scheduled snapshot now.
    pub async fn flush(&self) {
        self.debouncer.flush().await;
    }

    /// Drop any scheduled snapshot.
    pub fn cancel(&self) {
        self.debouncer.cancel();
    }

    /// Read the stored snapshot, discarding it when unusable.
    pub async fn restore(&self) -> Option<Vec<(QueryKey, CacheEntry)>> {
        let bytes = match self.port.get(&self.key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                error!(key = %self.key, error = %e, "Failed to read cache snapshot");
                self.remove().await;
                return None;
            }
        };

        let snapshot: PersistedSnapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Discarding undecodable cache snapshot");
                self.remove().await;
                return None;
            }
        };

        if snapshot.buster != self.buster {
            warn!(
                stored = %snapshot.buster,
                expected = %self.buster,
                "Discarding cache snapshot with another buster"
            );
            self.remove().await;
            return None;
        }

        let age = now_millis().saturating_sub(snapshot.timestamp);
        let expired = self
            .max_age
            .is_some_and(|max_age| age as u128 > max_age.as_millis());
        if age < 0 || expired {
            warn!(age_ms = age, "Discarding expired cache snapshot");
            self.remove().await;
            return None;
        }

        Some(snapshot.entries)
    }

    /// Delete the stored snapshot.
    pub async fn remove(&self) {
        if let Err(e) = self.port.delete(&self.key).await {
            error!(key = %self.key, error = %e, "Failed to delete cache snapshot");
        }
    }

    /// Restore the stored snapshot into `cache`. Returns the entries loaded.
    pub async fn restore_into(&self, cache: &QueryCache) -> usize {
        let Some(entries) = self.restore().await else {
            return 0;
        };
        match cache.restore(entries) {
            Ok(loaded) => {
                info!(loaded, "Query cache restored");
                loaded
            }
            Err(e) => {
                error!(error = %e, "Failed to load cache snapshot");
                0
            }
        }
    }

    /// Persist `cache` after every change. Runs until the returned task is
    /// aborted.
    pub fn attach(self: &Arc<Self>, cache: Arc<QueryCache>) -> JoinHandle<()> {
        let persister = self.clone();
        let mut events = cache.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Persister lagged behind cache events");
                    }
                    Err(RecvError::Closed) => break,
                }
                match cache.snapshot() {
                    Ok(entries) => persister.persist(entries),
                    Err(e) => error!(error = %e, "Failed to snapshot query cache"),
                }
            }
            persister.flush().await;
        })
    }
}
