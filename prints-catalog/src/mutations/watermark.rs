//! High-watermark sync.
//!
//! The watermark is the newest last-updated timestamp seen in the cached
//! recency list. A sync reads the summaries updated after it. Any hit moves
//! the watermark forward and marks the recency list stale, so the next read
//! of the first page shows the new entries.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use prints_core::{EpochMillis, PrintsResult, SummaryEntry};
use prints_storage::QueryKey;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::catalog::{patched, Catalog};

const OPERATION: &str = "sync_high_watermark";

const UNSET: EpochMillis = EpochMillis::MIN;

/// Newest last-updated timestamp known to the cache. Only moves forward.
#[derive(Debug)]
pub struct HighWatermark {
    latest: AtomicI64,
}

impl HighWatermark {
    pub fn new() -> Self {
        Self {
            latest: AtomicI64::new(UNSET),
        }
    }

    pub fn get(&self) -> Option<EpochMillis> {
        match self.latest.load(Ordering::SeqCst) {
            UNSET => None,
            millis => Some(millis),
        }
    }

    /// Raise the watermark to `millis`. Returns whether it moved.
    pub fn advance(&self, millis: EpochMillis) -> bool {
        self.latest.fetch_max(millis, Ordering::SeqCst) < millis
    }
}

impl Default for HighWatermark {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one watermark sync.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkSync {
    /// Watermark the sync started from. `None` when nothing was seeded yet.
    pub previous: Option<EpochMillis>,
    pub watermark: Option<EpochMillis>,
    /// Summaries updated after `previous`, newest first.
    pub fresh: Vec<SummaryEntry>,
}

impl WatermarkSync {
    pub fn advanced(&self) -> bool {
        self.watermark != self.previous
    }
}

fn newest(entries: &[SummaryEntry]) -> Option<EpochMillis> {
    entries
        .iter()
        .filter_map(|entry| entry.summary.last_updated_date)
        .max()
}

impl Catalog {
    /// Raise the watermark to the newest summary in the cached recency list.
    pub fn seed_high_watermark(&self) -> Option<EpochMillis> {
        match self.cache().recent_summaries() {
            Ok(Some(list)) => {
                let latest = list
                    .pages
                    .iter()
                    .filter_map(|page| newest(&page.entries))
                    .max();
                if let Some(latest) = latest {
                    self.watermark().advance(latest);
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Cannot seed watermark from recency list"),
        }
        self.watermark().get()
    }

    /// Fetch summaries newer than the watermark and mark the recency list
    /// stale when there are any. Does nothing until a watermark exists.
    pub async fn sync_high_watermark(&self) -> PrintsResult<WatermarkSync> {
        let Some(since) = self.seed_high_watermark() else {
            debug!("No watermark yet, skipping sync");
            return Ok(WatermarkSync {
                previous: None,
                watermark: None,
                fresh: Vec::new(),
            });
        };

        let fresh = self
            .queries()
            .fetch_summaries_since(since.saturating_add(1))
            .await?;
        if let Some(latest) = newest(&fresh) {
            self.watermark().advance(latest);
        }
        if !fresh.is_empty() {
            info!(since, fresh = fresh.len(), "Summaries newer than watermark");
            let key = QueryKey::RecentSummaries;
            patched(OPERATION, &key, self.cache().invalidate(&key));
        }

        Ok(WatermarkSync {
            previous: Some(since),
            watermark: self.watermark().get(),
            fresh,
        })
    }

    /// Run [`Catalog::sync_high_watermark`] every `watermark_interval` until
    /// the task is aborted. The first sync runs immediately.
    pub fn spawn_watermark_sync(&self) -> JoinHandle<()> {
        let catalog = self.clone();
        let period = self.config().watermark_interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = catalog.sync_high_watermark().await {
                    warn!(error = %e, "High-watermark sync failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermark_only_moves_forward() {
        let watermark = HighWatermark::new();
        assert_eq!(watermark.get(), None);
        assert!(watermark.advance(20));
        assert!(!watermark.advance(10));
        assert!(!watermark.advance(20));
        assert_eq!(watermark.get(), Some(20));
    }
}
