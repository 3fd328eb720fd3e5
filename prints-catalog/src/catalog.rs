//! Catalog Client
//!
//! [`Catalog`] bundles the tree store, the query cache and the read-through
//! queries. Mutations write through the store and then patch the cache;
//! reads go through [`ReadThrough`].

use std::sync::Arc;

use prints_core::{BlueprintId, CacheError, PrintsConfig, StoreError, UserId};
use prints_storage::{
    retry, CacheRepository, DbPath, MultiPathUpdate, QueryKey, ReadThrough, TreeStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::mutations::HighWatermark;

/// Where the caller should go after a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "route", content = "id", rename_all = "camelCase")]
pub enum Route {
    /// Detail view of one blueprint.
    View(BlueprintId),
    /// Profile page of one user.
    UserProfile(UserId),
}

impl Route {
    /// Path form of the route.
    pub fn path(&self) -> String {
        match self {
            Self::View(id) => format!("/view/{id}"),
            Self::UserProfile(user) => format!("/user/{user}"),
        }
    }
}

/// Result of a create, update or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    pub id: BlueprintId,
    pub author: UserId,
    pub route: Route,
}

/// Cached access to the blueprint catalog.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn TreeStore>,
    cache: Arc<dyn CacheRepository>,
    queries: ReadThrough,
    watermark: Arc<HighWatermark>,
    config: PrintsConfig,
}

impl Catalog {
    /// Create a catalog over `store`, mirrored by `cache`.
    pub fn new(
        store: Arc<dyn TreeStore>,
        cache: Arc<dyn CacheRepository>,
        config: PrintsConfig,
    ) -> Self {
        let queries = ReadThrough::new(store.clone(), cache.clone(), &config);
        Self {
            store,
            cache,
            queries,
            watermark: Arc::new(HighWatermark::new()),
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn TreeStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<dyn CacheRepository> {
        &self.cache
    }

    /// Read-through queries sharing this catalog's cache.
    pub fn queries(&self) -> &ReadThrough {
        &self.queries
    }

    pub fn config(&self) -> &PrintsConfig {
        &self.config
    }

    /// Newest last-updated timestamp seen by this catalog and its clones.
    pub fn watermark(&self) -> &HighWatermark {
        &self.watermark
    }

    /// Uncached point read, retried per `query_retries`.
    pub(crate) async fn read_remote(&self, path: &DbPath) -> Result<Option<Value>, StoreError> {
        retry("get", self.config.query_retries, || self.store.get(path)).await
    }

    /// Apply `update` atomically, retrying per `mutation_retries`.
    pub(crate) async fn write(
        &self,
        operation: &'static str,
        update: MultiPathUpdate,
    ) -> Result<(), StoreError> {
        let paths = update.len();
        retry(operation, self.config.mutation_retries, || {
            self.store.update(update.clone())
        })
        .await?;
        debug!(operation, paths, "Remote write applied");
        Ok(())
    }
}

/// Log and drop a failed cache patch. The remote write already succeeded,
/// so a patch failure never fails the mutation.
pub(crate) fn patched<T>(
    operation: &'static str,
    key: &QueryKey,
    result: Result<T, CacheError>,
) -> Option<T> {
    match result {
        Ok(value) => {
            debug!(operation, key = %key, "Cache patched");
            Some(value)
        }
        Err(e) => {
            warn!(operation, key = %key, error = %e, "Skipping cache patch");
            None
        }
    }
}
