//! Favorite toggle.
//!
//! The caller supplies the current flag and count; neither is re-read. The
//! record count and the favorite map are written side by side and are not
//! reconciled here; see [`Catalog::reconcile_favorites`].

use prints_core::{BlueprintId, BlueprintRecord, BlueprintSummary, PrintsResult, UserId};
use prints_storage::{paths, MultiPathUpdate, QueryKey};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::{patched, Catalog};

const OPERATION: &str = "toggle_favorite";

/// Input of a favorite toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleFavorite {
    pub blueprint: BlueprintId,
    pub user: UserId,
    pub is_favorite: bool,
    #[serde(default)]
    pub number_of_favorites: u64,
}

/// State after a favorite toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleOutcome {
    pub blueprint: BlueprintId,
    pub user: UserId,
    pub is_favorite: bool,
    pub number_of_favorites: u64,
}

/// Flip the flag and move the count one step, never below zero.
pub fn next_favorite_state(is_favorite: bool, count: u64) -> (bool, u64) {
    let favorited = !is_favorite;
    let count = if favorited {
        count.saturating_add(1)
    } else {
        count.saturating_sub(1)
    };
    (favorited, count)
}

fn toggle_paths(id: &BlueprintId, user: &UserId, favorited: bool, count: u64) -> MultiPathUpdate {
    let mut update = MultiPathUpdate::new();
    update.set(paths::blueprint_field(id, "numberOfFavorites"), count.into());
    update.set(paths::summary_field(id, "numberOfFavorites"), count.into());
    if favorited {
        update.set(paths::blueprint_favorite(id, user), true.into());
        update.set(paths::user_favorite(user, id), true.into());
    } else {
        update.delete(paths::blueprint_favorite(id, user));
        update.delete(paths::user_favorite(user, id));
    }
    update
}

impl Catalog {
    /// Toggle `input.user`'s favorite on `input.blueprint`.
    pub async fn toggle_favorite(&self, input: &ToggleFavorite) -> PrintsResult<ToggleOutcome> {
        let id = &input.blueprint;
        let user = &input.user;
        let (favorited, count) = next_favorite_state(input.is_favorite, input.number_of_favorites);

        self.write(OPERATION, toggle_paths(id, user, favorited, count)).await?;
        info!(blueprint = %id, user = %user, favorited, count, "Favorite toggled");

        self.patch_toggled(id, user, favorited, count);

        Ok(ToggleOutcome {
            blueprint: id.clone(),
            user: user.clone(),
            is_favorite: favorited,
            number_of_favorites: count,
        })
    }

    fn patch_toggled(&self, id: &BlueprintId, user: &UserId, favorited: bool, count: u64) {
        let cache = self.cache();

        patched(
            OPERATION,
            &QueryKey::blueprint(id),
            cache.patch_record(id, &mut |record: &mut BlueprintRecord| {
                record.number_of_favorites = count;
                record.set_favorite(user, favorited);
            }),
        );

        patched(
            OPERATION,
            &QueryKey::summary(id),
            cache.patch_summary(id, &mut |summary: &mut BlueprintSummary| {
                summary.number_of_favorites = count;
            }),
        );

        let favorites = QueryKey::user_favorites(user);
        let result = if favorited {
            cache.add_to_key_set(&favorites, id)
        } else {
            cache.remove_from_key_set(&favorites, id)
        };
        patched(OPERATION, &favorites, result);

        patched(
            OPERATION,
            &QueryKey::user_favorite_flag(user, id),
            cache.set_user_favorite_flag(user, id, favorited),
        );
        patched(
            OPERATION,
            &QueryKey::blueprint_favorite_flag(id, user),
            cache.set_blueprint_favorite_flag(id, user, favorited),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prints_storage::WriteValue;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_unfavorite_deletes_map_entries() {
        let id = BlueprintId::from("k1");
        let user = UserId::from("u1");
        let update = toggle_paths(&id, &user, false, 2);
        assert_eq!(update.len(), 4);
        assert_eq!(update.get(&paths::blueprint_favorite(&id, &user)), Some(&WriteValue::Delete));
        assert_eq!(update.get(&paths::user_favorite(&user, &id)), Some(&WriteValue::Delete));
        assert_eq!(
            update.get(&paths::summary_field(&id, "numberOfFavorites")),
            Some(&WriteValue::Set(json!(2)))
        );
    }

    #[test]
    fn test_count_floor_at_zero() {
        assert_eq!(next_favorite_state(true, 0), (false, 0));
    }

    proptest! {
        #[test]
        fn prop_toggle_twice_restores_state(is_favorite in any::<bool>(), count in 1u64..10_000) {
            let (once, once_count) = next_favorite_state(is_favorite, count);
            let (twice, twice_count) = next_favorite_state(once, once_count);
            prop_assert_eq!(twice, is_favorite);
            prop_assert_eq!(twice_count, count);
        }

        #[test]
        fn prop_count_moves_one_step(is_favorite in any::<bool>(), count in 0u64..10_000) {
            let (favorited, next) = next_favorite_state(is_favorite, count);
            prop_assert_eq!(favorited, !is_favorite);
            if favorited {
                prop_assert_eq!(next, count + 1);
            } else {
                prop_assert_eq!(next, count.saturating_sub(1));
            }
        }
    }
}
