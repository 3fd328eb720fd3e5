//! Edit a blueprint.

use prints_core::{
    now_millis, BlueprintId, BlueprintRecord, BlueprintSummary, ImageRef, PrintsResult,
    StoreError,
};
use prints_storage::paths::LAST_UPDATED;
use prints_storage::{paths, CacheRepository, MultiPathUpdate, QueryKey};
use tracing::{debug, info};

use super::BlueprintForm;
use crate::catalog::{patched, Catalog, MutationOutcome, Route};

const OPERATION: &str = "update";

/// Tag-index rewrite for one blueprint.
///
/// Phase one clears the key from every known tag, phase two sets it under
/// each selected tag. Both phases go into the same multi-path write, where
/// the later write to a path wins, so a tag that is both known and selected
/// ends up set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagIndexPlan {
    cleared: Vec<String>,
    selected: Vec<String>,
}

impl TagIndexPlan {
    pub fn new(known: &[String], selected: &[String]) -> Self {
        let mut cleared: Vec<String> = known.to_vec();
        cleared.sort();
        cleared.dedup();
        Self {
            cleared,
            selected: selected.to_vec(),
        }
    }

    /// Tags cleared in phase one.
    pub fn cleared(&self) -> &[String] {
        &self.cleared
    }

    /// Tags set in phase two.
    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    /// Known tags the key ends up absent from.
    pub fn removed(&self) -> impl Iterator<Item = &String> {
        self.cleared.iter().filter(|tag| !self.selected.contains(tag))
    }

    /// Append both phases to `update`.
    pub fn write_into(&self, update: &mut MultiPathUpdate, id: &BlueprintId) {
        for tag in &self.cleared {
            update.delete(paths::tag_entry(tag, id));
        }
        for tag in &self.selected {
            update.set(paths::tag_entry(tag, id), true.into());
        }
    }

    /// Mirror the plan onto cached tag indexes. Uncached tags are skipped.
    pub fn patch_cache(&self, cache: &dyn CacheRepository, id: &BlueprintId) {
        for tag in self.removed() {
            let key = QueryKey::tag_index(tag);
            patched(OPERATION, &key, cache.remove_from_key_set(&key, id));
        }
        for tag in &self.selected {
            let key = QueryKey::tag_index(tag);
            patched(OPERATION, &key, cache.add_to_key_set(&key, id));
        }
    }
}

fn update_paths(
    id: &BlueprintId,
    form: &BlueprintForm,
    tags: &[String],
    new_image: Option<&ImageRef>,
    plan: &TagIndexPlan,
) -> Result<MultiPathUpdate, StoreError> {
    let mut update = MultiPathUpdate::new();
    update.set(paths::blueprint_field(id, "title"), form.title.as_str().into());
    update.set(
        paths::blueprint_field(id, "blueprintString"),
        form.blueprint_string.as_str().into(),
    );
    update.set(
        paths::blueprint_field(id, "descriptionMarkdown"),
        form.description_markdown.as_str().into(),
    );
    update.set_json(paths::blueprint_field(id, "tags"), &tags)?;
    update.server_timestamp(paths::blueprint_field(id, LAST_UPDATED));
    update.set(paths::summary_field(id, "title"), form.title.as_str().into());
    update.server_timestamp(paths::summary_field(id, LAST_UPDATED));

    if let Some(image) = new_image {
        update.set_json(paths::blueprint_field(id, "image"), image)?;
        update.set(paths::summary_field(id, "imgurId"), image.id.as_str().into());
        update.set(
            paths::summary_field(id, "imgurType"),
            image.mime_type.as_str().into(),
        );
        if let Some(url) = form.image.source_url() {
            update.set(paths::private_image_url(id), url.into());
        }
    }

    plan.write_into(&mut update, id);
    Ok(update)
}

impl Catalog {
    /// Apply an edited form to blueprint `id`.
    ///
    /// `previous` is the record the form was opened with and `known_tags`
    /// the full tag list; the key is cleared from every known tag (and every
    /// tag `previous` carried) before the selection is set. An empty image
    /// URL keeps the current image.
    pub async fn update_blueprint(
        &self,
        id: &BlueprintId,
        previous: &BlueprintRecord,
        form: &BlueprintForm,
        known_tags: &[String],
    ) -> PrintsResult<MutationOutcome> {
        form.validate()?;
        let image = form.image.resolve()?;
        let image_changed = image
            .as_ref()
            .is_some_and(|image| image.id != previous.image.id);
        let tags = form.normalized_tags();

        let mut known: Vec<String> = known_tags.to_vec();
        known.extend(previous.tags.iter().cloned());
        let plan = TagIndexPlan::new(&known, &tags);

        let new_image = if image_changed { image.as_ref() } else { None };
        let update = update_paths(id, form, &tags, new_image, &plan)?;
        self.write(OPERATION, update).await?;
        info!(blueprint = %id, image_changed, tags = tags.len(), "Blueprint updated");

        self.patch_updated(id, previous, form, tags, image, &plan);

        Ok(MutationOutcome {
            id: id.clone(),
            author: previous.owner().clone(),
            route: Route::View(id.clone()),
        })
    }

    fn patch_updated(
        &self,
        id: &BlueprintId,
        previous: &BlueprintRecord,
        form: &BlueprintForm,
        tags: Vec<String>,
        image: Option<ImageRef>,
        plan: &TagIndexPlan,
    ) {
        let cache = self.cache();
        let now = now_millis();

        let mut apply_form = |record: &mut BlueprintRecord| {
            record.title = form.title.clone();
            record.blueprint_string = form.blueprint_string.clone();
            record.description_markdown = form.description_markdown.clone();
            record.tags = tags.clone();
            record.last_updated_date = now;
            if let Some(image) = &image {
                record.image = image.clone();
            }
        };
        let image_ref = image.clone().unwrap_or_else(|| previous.image.clone());
        let mut apply_summary = |summary: &mut BlueprintSummary| {
            summary.title = form.title.clone();
            summary.last_updated_date = Some(now);
            summary.apply_image(&image_ref);
        };

        // Record first, so the summary event finds matching timestamps.
        let record_key = QueryKey::blueprint(id);
        if let Some(false) = patched(OPERATION, &record_key, cache.patch_record(id, &mut apply_form)) {
            let mut record = previous.clone();
            apply_form(&mut record);
            patched(OPERATION, &record_key, cache.set_record(id, record));
        }

        let summary_key = QueryKey::summary(id);
        if let Some(false) =
            patched(OPERATION, &summary_key, cache.patch_summary(id, &mut apply_summary))
        {
            let mut summary = BlueprintSummary::from_record(previous);
            apply_summary(&mut summary);
            patched(OPERATION, &summary_key, cache.set_summary(id, summary));
        }

        let recent = QueryKey::RecentSummaries;
        if let Some(true) = patched(OPERATION, &recent, cache.invalidate(&recent)) {
            debug!("Recency list invalidated");
        }

        plan.patch_cache(cache.as_ref(), id);
    }
}
