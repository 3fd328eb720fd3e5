//! Delete a blueprint.

use prints_core::{BlueprintId, PrintsResult, UserId};
use prints_storage::{paths, MultiPathUpdate, QueryKey};
use tracing::info;

use crate::catalog::{patched, Catalog, MutationOutcome, Route};

const OPERATION: &str = "delete";

fn delete_paths(id: &BlueprintId, author: &UserId, tags: &[String]) -> MultiPathUpdate {
    let mut update = MultiPathUpdate::new();
    update.delete(paths::blueprint(id));
    update.delete(paths::user_blueprint(author, id));
    update.delete(paths::summary(id));
    update.delete(paths::private(id));
    for tag in tags {
        update.delete(paths::tag_entry(tag, id));
    }
    update
}

impl Catalog {
    /// Delete blueprint `id`, authored by `author` and carrying `tags`.
    pub async fn delete_blueprint(
        &self,
        id: &BlueprintId,
        author: &UserId,
        tags: &[String],
    ) -> PrintsResult<MutationOutcome> {
        self.write(OPERATION, delete_paths(id, author, tags)).await?;
        info!(blueprint = %id, author = %author, "Blueprint deleted");

        self.patch_deleted(id, author, tags);

        Ok(MutationOutcome {
            id: id.clone(),
            author: author.clone(),
            route: Route::UserProfile(author.clone()),
        })
    }

    fn patch_deleted(&self, id: &BlueprintId, author: &UserId, tags: &[String]) {
        let cache = self.cache();

        let recent = QueryKey::RecentSummaries;
        patched(OPERATION, &recent, cache.invalidate(&recent));

        let authored = QueryKey::user_blueprints(author);
        patched(OPERATION, &authored, cache.remove_from_key_set(&authored, id));
        patched(OPERATION, &authored, cache.invalidate(&authored));

        for tag in tags {
            let key = QueryKey::tag_index(tag);
            patched(OPERATION, &key, cache.remove_from_key_set(&key, id));
        }

        for key in [QueryKey::blueprint(id), QueryKey::summary(id)] {
            patched(OPERATION, &key, cache.evict(&key));
        }
    }
}
