//! Create a blueprint.

use std::collections::BTreeMap;

use prints_core::{
    now_millis, Author, BlueprintId, BlueprintRecord, BlueprintSummary, PaginatedSummaries,
    PrintsResult, StoreError, SummaryEntry, UserId,
};
use prints_storage::paths::LAST_UPDATED;
use prints_storage::{paths, MultiPathUpdate, QueryKey};
use tracing::info;

use super::{AuthUser, BlueprintForm};
use crate::catalog::{patched, Catalog, MutationOutcome, Route};

const OPERATION: &str = "create";

/// Multi-path write creating `id`: the record, author index entry,
/// summary, private image URL and one tag-index entry per tag.
fn create_update(
    id: &BlueprintId,
    record: &BlueprintRecord,
    summary: &BlueprintSummary,
    image_url: Option<&str>,
) -> Result<MultiPathUpdate, StoreError> {
    let mut update = MultiPathUpdate::new();
    update.set_json(paths::blueprint(id), record)?;
    update.server_timestamp(paths::blueprint_field(id, "createdDate"));
    update.server_timestamp(paths::blueprint_field(id, LAST_UPDATED));
    update.set(paths::user_blueprint(record.owner(), id), true.into());
    update.set_json(paths::summary(id), summary)?;
    update.server_timestamp(paths::summary_field(id, LAST_UPDATED));
    if let Some(url) = image_url {
        update.set(paths::private_image_url(id), url.into());
    }
    for tag in &record.tags {
        update.set(paths::tag_entry(tag, id), true.into());
    }
    Ok(update)
}

impl Catalog {
    /// Create a blueprint authored by `user`.
    ///
    /// Fails with `InvalidImageUrl` before any write when the image URL
    /// matches neither accepted shape.
    pub async fn create_blueprint(
        &self,
        form: &BlueprintForm,
        user: &AuthUser,
    ) -> PrintsResult<MutationOutcome> {
        form.validate()?;
        let image = form.image.resolve_required()?;
        let tags = form.normalized_tags();

        let id = self.store().generate_key(&paths::blueprints())?;
        let now = now_millis();
        let record = BlueprintRecord {
            title: form.title.clone(),
            blueprint_string: form.blueprint_string.clone(),
            description_markdown: form.description_markdown.clone(),
            tags,
            author: Author {
                user_id: user.uid.clone(),
                display_name: user.display_name.clone(),
            },
            author_id: Some(user.uid.clone()),
            created_date: now,
            last_updated_date: now,
            number_of_favorites: 0,
            favorites: BTreeMap::new(),
            image,
            image_url: None,
            file_name: None,
        };
        let summary = BlueprintSummary::from_record(&record);

        let update = create_update(&id, &record, &summary, form.image.source_url())?;
        self.write(OPERATION, update).await?;
        info!(blueprint = %id, author = %user.uid, tags = record.tags.len(), "Blueprint created");

        let mut summary = summary;
        summary.last_updated_date = Some(now_millis());
        self.patch_created(&id, &user.uid, summary, &record.tags);

        Ok(MutationOutcome {
            id: id.clone(),
            author: user.uid.clone(),
            route: Route::View(id),
        })
    }

    fn patch_created(
        &self,
        id: &BlueprintId,
        author: &UserId,
        summary: BlueprintSummary,
        tags: &[String],
    ) {
        let cache = self.cache();

        patched(
            OPERATION,
            &QueryKey::RecentSummaries,
            cache.patch_recent_summaries(&mut |list: &mut PaginatedSummaries| {
                list.prepend(SummaryEntry {
                    key: id.clone(),
                    summary: summary.clone(),
                });
                true
            }),
        );

        patched(OPERATION, &QueryKey::summary(id), cache.set_summary(id, summary));

        let authored = QueryKey::user_blueprints(author);
        patched(OPERATION, &authored, cache.add_to_key_set(&authored, id));

        let Some(cached_tags) = patched(OPERATION, &QueryKey::KnownTags, cache.cached_tags()) else {
            return;
        };
        for tag in cached_tags {
            let key = QueryKey::tag_index(&tag);
            let result = if tags.contains(&tag) {
                cache.add_to_key_set(&key, id)
            } else {
                cache.remove_from_key_set(&key, id)
            };
            patched(OPERATION, &key, result);
        }
    }
}
