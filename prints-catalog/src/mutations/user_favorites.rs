//! User-side favorite repair.
//!
//! A user's favorite set and each blueprint's favorite map are written
//! together, but older data can hold a user-side entry with no matching
//! blueprint-side flag. The repair restores the missing flags in one write
//! and then recounts each touched blueprint.

use prints_core::{BlueprintId, PrintsResult, UserId};
use prints_storage::cache::decode_key_set;
use prints_storage::{paths, MultiPathUpdate, QueryKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ReconcileOutcome;
use crate::catalog::{patched, Catalog};

const OPERATION: &str = "reconcile_user_favorites";

/// Result of a user-side favorite check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReconcileOutcome {
    pub user: UserId,
    /// Blueprints whose favorite map was missing this user.
    pub repaired: Vec<BlueprintId>,
    /// Favorited keys whose blueprint no longer exists. Left as they are.
    pub dangling: Vec<BlueprintId>,
    /// Count checks run on the repaired blueprints.
    pub recounted: Vec<ReconcileOutcome>,
    /// Whether anything was written.
    pub reconciled: bool,
}

impl Catalog {
    /// Restore `/blueprints/{id}/favorites/{user}` for every key in the
    /// user's favorite set that lacks it, then recount those blueprints.
    pub async fn reconcile_user_favorites(
        &self,
        user: &UserId,
    ) -> PrintsResult<UserReconcileOutcome> {
        let favorites_path = paths::user_favorites(user);
        let favorites = decode_key_set(&favorites_path, self.read_remote(&favorites_path).await?)?;

        let mut outcome = UserReconcileOutcome {
            user: user.clone(),
            repaired: Vec::new(),
            dangling: Vec::new(),
            recounted: Vec::new(),
            reconciled: false,
        };
        for id in favorites.keys() {
            let flag = self.read_remote(&paths::blueprint_favorite(id, user)).await?;
            if flag.and_then(|value| value.as_bool()) == Some(true) {
                continue;
            }
            let title = self.read_remote(&paths::blueprint_field(id, "title")).await?;
            if title.is_none() {
                debug!(user = %user, blueprint = %id, "Favorited blueprint no longer exists");
                outcome.dangling.push(id.clone());
                continue;
            }
            warn!(user = %user, blueprint = %id, "User favorite missing from blueprint favorites");
            outcome.repaired.push(id.clone());
        }
        if outcome.repaired.is_empty() {
            return Ok(outcome);
        }

        let mut update = MultiPathUpdate::new();
        for id in &outcome.repaired {
            update.set(paths::blueprint_favorite(id, user), true.into());
        }
        self.write(OPERATION, update).await?;
        outcome.reconciled = true;
        info!(user = %user, repaired = outcome.repaired.len(), "Blueprint favorites restored");

        for id in &outcome.repaired {
            if let Some(recount) = self.reconcile_favorites(id).await? {
                outcome.recounted.push(recount);
            }
        }

        let cache = self.cache();
        let key = QueryKey::user_favorites(user);
        patched(OPERATION, &key, cache.invalidate(&key));
        for id in &outcome.repaired {
            for key in [
                QueryKey::blueprint(id),
                QueryKey::summary(id),
                QueryKey::blueprint_favorite_flag(id, user),
            ] {
                patched(OPERATION, &key, cache.invalidate(&key));
            }
        }

        Ok(outcome)
    }
}
