//! Durable key-value stores.
//!
//! Uses the heed crate (Rust bindings for LMDB) for the durable store: a
//! memory-mapped single-database environment. Reads use read transactions;
//! `set` and `delete` commit one write transaction each.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use prints_core::PersistError;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for PersistError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::EnvOpen(_) | LmdbStoreError::DbOpen(_) | LmdbStoreError::Io(_) => {
                PersistError::Open {
                    reason: e.to_string(),
                }
            }
            LmdbStoreError::Transaction(_) => PersistError::Io {
                reason: e.to_string(),
            },
        }
    }
}

/// Synchronous byte store keyed by string.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), PersistError>;
    fn delete(&self, key: &str) -> Result<(), PersistError>;
}

// ============================================================================
// LMDB
// ============================================================================

/// LMDB-backed durable store.
pub struct LmdbStore {
    env: Env,
    db: Database<Str, Bytes>,
}

impl LmdbStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        // Open LMDB environment
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }
}

impl KeyValueStore for LmdbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        let value = self
            .db
            .get(&rtxn, key)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(value.map(<[u8]>::to_vec))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), PersistError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        self.db
            .put(&mut wtxn, key, value)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), PersistError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        self.db
            .delete(&mut wtxn, key)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// MEMORY
// ============================================================================

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, PersistError> {
        self.values.lock().map_err(|_| PersistError::Io {
            reason: "memory store lock poisoned".to_string(),
        })
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), PersistError> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), PersistError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), PersistError> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), PersistError> {
        (**self).delete(key)
    }
}
