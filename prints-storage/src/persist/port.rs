//! Durable I/O ports.
//!
//! Two implementations of [`DurablePort`] exist. [`WorkerPort`] hands every
//! operation to a dedicated background thread that owns the store and
//! bounds each call with a timeout. [`InlinePort`] performs the I/O on the
//! calling task. [`select_port`] picks the worker when it can be started and
//! falls back to inline I/O otherwise.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prints_core::PersistError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::kv::KeyValueStore;

/// Which port implementation is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Worker,
    Inline,
}

/// Async access to a durable key-value store.
#[async_trait]
pub trait DurablePort: Send + Sync {
    fn kind(&self) -> PortKind;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), PersistError>;

    async fn delete(&self, key: &str) -> Result<(), PersistError>;
}

// ============================================================================
// INLINE
// ============================================================================

/// Synchronous I/O on the calling task.
pub struct InlinePort {
    store: Arc<dyn KeyValueStore>,
}

impl InlinePort {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

#[async_trait]
impl DurablePort for InlinePort {
    fn kind(&self) -> PortKind {
        PortKind::Inline
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        self.store.get(key)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), PersistError> {
        self.store.set(key, &value)
    }

    async fn delete(&self, key: &str) -> Result<(), PersistError> {
        self.store.delete(key)
    }
}

// ============================================================================
// WORKER
// ============================================================================

enum Op {
    Get(String),
    Set(String, Vec<u8>),
    Delete(String),
}

enum Reply {
    Value(Option<Vec<u8>>),
    Done,
}

struct Request {
    op: Op,
    reply: Option<oneshot::Sender<Result<Reply, PersistError>>>,
}

/// Background-thread I/O with a per-operation timeout.
///
/// A timed-out operation resolves as empty (`get`) or as a no-op (`set`,
/// `delete`). A timed-out read of the cache snapshot key also schedules a
/// delete of that key, so a snapshot that cannot be read in time is not
/// retried on every start.
pub struct WorkerPort {
    requests: mpsc::UnboundedSender<Request>,
    timeout: Duration,
    cache_key: String,
}

impl WorkerPort {
    /// Start the worker thread and open the store on it.
    ///
    /// Fails when the thread cannot be spawned, the store fails to open, or
    /// the worker does not report ready within `timeout`.
    pub fn spawn<F, S>(
        open: F,
        timeout: Duration,
        cache_key: impl Into<String>,
    ) -> Result<Self, PersistError>
    where
        F: FnOnce() -> Result<S, PersistError> + Send + 'static,
        S: KeyValueStore + 'static,
    {
        let (requests, mut rx) = mpsc::unbounded_channel::<Request>();
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<(), PersistError>>(1);

        std::thread::Builder::new()
            .name("prints-persist".to_string())
            .spawn(move || {
                let store = match open() {
                    Ok(store) => {
                        let _ = ready_tx.send(Ok(()));
                        store
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while let Some(request) = rx.blocking_recv() {
                    let result = match request.op {
                        Op::Get(key) => store.get(&key).map(Reply::Value),
                        Op::Set(key, value) => store.set(&key, &value).map(|_| Reply::Done),
                        Op::Delete(key) => store.delete(&key).map(|_| Reply::Done),
                    };
                    if let Some(reply) = request.reply {
                        let _ = reply.send(result);
                    }
                }
                debug!("Persistence worker stopped");
            })
            .map_err(|e| PersistError::WorkerUnavailable {
                reason: e.to_string(),
            })?;

        match ready_rx.recv_timeout(timeout) {
            Ok(Ok(())) => Ok(Self {
                requests,
                timeout,
                cache_key: cache_key.into(),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PersistError::WorkerUnavailable {
                reason: "worker did not report ready".to_string(),
            }),
        }
    }

    fn send(&self, op: Op, reply: Option<oneshot::Sender<Result<Reply, PersistError>>>) -> Result<(), PersistError> {
        self.requests
            .send(Request { op, reply })
            .map_err(|_| PersistError::WorkerUnavailable {
                reason: "worker stopped".to_string(),
            })
    }

    /// Issue `op` and await its reply. `Ok(None)` on timeout.
    async fn call(&self, operation: &'static str, op: Op) -> Result<Option<Reply>, PersistError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(op, Some(reply_tx))?;

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(result)) => result.map(Some),
            Ok(Err(_)) => Err(PersistError::WorkerUnavailable {
                reason: "worker dropped the request".to_string(),
            }),
            Err(_) => {
                let err = PersistError::Timeout {
                    operation,
                    elapsed: self.timeout,
                };
                warn!(operation, error = %err, "Durable operation timed out");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl DurablePort for WorkerPort {
    fn kind(&self) -> PortKind {
        PortKind::Worker
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        match self.call("get", Op::Get(key.to_string())).await? {
            Some(Reply::Value(value)) => Ok(value),
            Some(Reply::Done) => Ok(None),
            None => {
                if key == self.cache_key {
                    warn!(key, "Scheduling delete of unreadable snapshot");
                    self.send(Op::Delete(key.to_string()), None)?;
                }
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), PersistError> {
        self.call("set", Op::Set(key.to_string(), value)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), PersistError> {
        self.call("delete", Op::Delete(key.to_string())).await?;
        Ok(())
    }
}

// ============================================================================
// PROBING
// ============================================================================

/// True when the platform can run a dedicated persistence thread.
fn worker_supported() -> bool {
    std::thread::available_parallelism().is_ok()
}

/// Pick the durable port for this process.
///
/// Tries the worker first; any spawn or open failure falls back to inline
/// I/O, which opens the store again on the calling thread.
pub fn select_port<F, S>(
    open: F,
    timeout: Duration,
    cache_key: &str,
) -> Result<Arc<dyn DurablePort>, PersistError>
where
    F: Fn() -> Result<S, PersistError> + Clone + Send + 'static,
    S: KeyValueStore + 'static,
{
    if worker_supported() {
        match WorkerPort::spawn(open.clone(), timeout, cache_key) {
            Ok(port) => {
                info!(kind = "worker", "Durable port ready");
                return Ok(Arc::new(port));
            }
            Err(e) => warn!(error = %e, "Persistence worker unavailable, using inline I/O"),
        }
    }

    let store = open()?;
    info!(kind = "inline", "Durable port ready");
    Ok(Arc::new(InlinePort::new(store)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::kv::MemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    impl KeyValueStore for SlowStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
            std::thread::sleep(self.delay);
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &[u8]) -> Result<(), PersistError> {
            self.inner.set(key, value)
        }

        fn delete(&self, key: &str) -> Result<(), PersistError> {
            self.inner.delete(key)
        }
    }

    #[tokio::test]
    async fn test_worker_round_trip() {
        let port = WorkerPort::spawn(|| Ok(MemoryStore::new()), Duration::from_secs(5), "cache")
            .expect("worker should start");
        assert_eq!(port.kind(), PortKind::Worker);

        port.set("k", b"v".to_vec()).await.expect("set should succeed");
        assert_eq!(port.get("k").await.expect("get should succeed"), Some(b"v".to_vec()));
        port.delete("k").await.expect("delete should succeed");
        assert_eq!(port.get("k").await.expect("get should succeed"), None);
    }

    #[tokio::test]
    async fn test_worker_timeout_resolves_empty_and_deletes_cache_key() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(200),
        });
        store.set("cache", b"snapshot").unwrap();
        store.set("other", b"kept").unwrap();

        let worker_store = store.clone();
        let port = WorkerPort::spawn(move || Ok(worker_store), Duration::from_millis(50), "cache")
            .expect("worker should start");

        assert_eq!(port.get("cache").await.expect("timeout is not an error"), None);
        assert_eq!(port.get("other").await.expect("timeout is not an error"), None);

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(store.inner.get("cache").unwrap(), None);
        assert_eq!(store.inner.get("other").unwrap(), Some(b"kept".to_vec()));
    }

    #[tokio::test]
    async fn test_worker_open_failure_is_reported() {
        let result = WorkerPort::spawn(
            || -> Result<MemoryStore, PersistError> {
                Err(PersistError::Open {
                    reason: "locked".to_string(),
                })
            },
            Duration::from_secs(1),
            "cache",
        );
        assert!(matches!(result, Err(PersistError::Open { .. })));
    }

    #[tokio::test]
    async fn test_select_port_falls_back_to_inline() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let open = move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(PersistError::Open {
                    reason: "first open fails".to_string(),
                })
            } else {
                Ok(MemoryStore::new())
            }
        };

        let port = select_port(open, Duration::from_secs(1), "cache").expect("port selection should succeed");
        assert_eq!(port.kind(), PortKind::Inline);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        port.set("k", b"v".to_vec()).await.expect("set should succeed");
        assert_eq!(port.get("k").await.expect("get should succeed"), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_select_port_prefers_worker() {
        let port = select_port(|| Ok(MemoryStore::new()), Duration::from_secs(1), "cache")
            .expect("port selection should succeed");
        assert_eq!(port.kind(), PortKind::Worker);
    }
}
