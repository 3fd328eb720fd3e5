//! Record/summary reconciliation watcher.
//!
//! Summaries reach the cache on their own, through recency pages and
//! mutations, while full records are cached separately. When a summary
//! arrives whose last-updated timestamp differs from the cached record's,
//! the record is marked stale. Nothing is fetched; the next read does that.

use std::sync::Arc;

use prints_core::{BlueprintId, BlueprintSummary};
use prints_storage::{CacheEvent, CacheEventKind, CacheRepository, CacheValue, QueryKey};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Watches summary updates and marks diverging records stale.
#[derive(Clone)]
pub struct BlueprintCacheSync {
    cache: Arc<dyn CacheRepository>,
}

impl BlueprintCacheSync {
    pub fn new(cache: Arc<dyn CacheRepository>) -> Self {
        Self { cache }
    }

    /// React to one cache event. Returns whether a record was invalidated.
    pub fn handle_event(&self, event: &CacheEvent) -> bool {
        if event.kind != CacheEventKind::Updated {
            return false;
        }
        let QueryKey::Summary { id } = &event.key else {
            return false;
        };
        let summary = match &event.value {
            Some(CacheValue::Summary(summary)) => summary.clone(),
            _ => match self.cache.summary(id) {
                Ok(Some(summary)) => summary,
                Ok(None) => return false,
                Err(e) => {
                    warn!(blueprint = %id, error = %e, "Cannot read updated summary");
                    return false;
                }
            },
        };
        self.reconcile(id, &summary)
    }

    fn reconcile(&self, id: &BlueprintId, summary: &BlueprintSummary) -> bool {
        let Some(updated) = summary.last_updated_date else {
            return false;
        };

        let record_updated = match self.cache.record(id) {
            Ok(record) => record.map(|record| record.last_updated_date),
            Err(e) => {
                warn!(blueprint = %id, error = %e, "Cached record unreadable, marking stale");
                None
            }
        };
        if record_updated == Some(updated) {
            return false;
        }

        match self.cache.invalidate(&QueryKey::blueprint(id)) {
            Ok(existed) => {
                debug!(
                    blueprint = %id,
                    summary_updated = updated,
                    record_updated = ?record_updated,
                    existed,
                    "Record marked stale"
                );
                true
            }
            Err(e) => {
                warn!(blueprint = %id, error = %e, "Failed to mark record stale");
                false
            }
        }
    }

    /// Run the watcher until the cache-event stream closes.
    ///
    /// The subscription is taken before this returns, so events emitted
    /// right after the call are seen.
    pub fn spawn(self) -> JoinHandle<()> {
        let mut events = self.cache.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        self.handle_event(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Cache sync lagged, some events were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Cache event stream closed");
                        break;
                    }
                }
            }
        })
    }
}
