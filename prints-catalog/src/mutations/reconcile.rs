//! Favorite count repair.

use prints_core::{BlueprintId, BlueprintRecord, PrintsResult, StoreError};
use prints_storage::{paths, MultiPathUpdate, QueryKey};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::{patched, Catalog};

const OPERATION: &str = "reconcile_favorites";

/// Result of a favorite count check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub blueprint: BlueprintId,
    /// `true` entries in the favorite map.
    pub counted: u64,
    /// Count stored on the record before the repair.
    pub record_count: u64,
    /// Count stored on the summary before the repair, if it exists.
    pub summary_count: Option<u64>,
    /// Whether the counts were rewritten.
    pub repaired: bool,
}

impl Catalog {
    /// Recount favorites of `id` from the stored favorite map and rewrite
    /// both counts when they disagree. `None` when the blueprint does not
    /// exist.
    pub async fn reconcile_favorites(
        &self,
        id: &BlueprintId,
    ) -> PrintsResult<Option<ReconcileOutcome>> {
        let path = paths::blueprint(id);
        let Some(value) = self.read_remote(&path).await? else {
            return Ok(None);
        };
        let record: BlueprintRecord =
            serde_json::from_value(value).map_err(|e| StoreError::Decode {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        let summary_count = self
            .read_remote(&paths::summary_field(id, "numberOfFavorites"))
            .await?
            .and_then(|value| value.as_u64());
        let summary_exists = summary_count.is_some()
            || self.read_remote(&paths::summary(id)).await?.is_some();

        let counted = record.favorite_count_from_map();
        let record_drift = record.number_of_favorites != counted;
        let summary_drift = summary_exists && summary_count != Some(counted);

        let mut outcome = ReconcileOutcome {
            blueprint: id.clone(),
            counted,
            record_count: record.number_of_favorites,
            summary_count,
            repaired: false,
        };
        if !record_drift && !summary_drift {
            return Ok(Some(outcome));
        }

        warn!(
            blueprint = %id,
            counted,
            record_count = record.number_of_favorites,
            summary_count = ?summary_count,
            "Favorite count drift"
        );
        let mut update = MultiPathUpdate::new();
        update.set(paths::blueprint_field(id, "numberOfFavorites"), counted.into());
        if summary_exists {
            update.set(paths::summary_field(id, "numberOfFavorites"), counted.into());
        }
        self.write(OPERATION, update).await?;
        info!(blueprint = %id, counted, "Favorite counts repaired");

        let cache = self.cache();
        for key in [
            QueryKey::blueprint(id),
            QueryKey::summary(id),
            QueryKey::RecentSummaries,
        ] {
            patched(OPERATION, &key, cache.invalidate(&key));
        }

        outcome.repaired = true;
        Ok(Some(outcome))
    }
}
