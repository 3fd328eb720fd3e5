//! Blueprint record schema and its denormalized projections.
//!
//! Field names serialize in camelCase so that values round-trip through the
//! backing tree unchanged. The summary, tag index and user indexes are all
//! derived from the full record at write time; none of them is
//! authoritative on its own.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::identity::{BlueprintId, EpochMillis, UserId};

/// Mime type recorded when an image is identified from a URL alone.
pub const DEFAULT_IMAGE_TYPE: &str = "image/png";

/// Author of a blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Reference to a hosted screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub id: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_from_album: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

impl ImageRef {
    pub fn new(id: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mime_type: mime_type.into(),
            extension: None,
            width: None,
            height: None,
            title: None,
            is_from_album: None,
            warnings: None,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }
}

/// Full blueprint record as stored under `/blueprints/{key}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintRecord {
    pub title: String,
    pub blueprint_string: String,
    pub description_markdown: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub author: Author,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<UserId>,
    pub created_date: EpochMillis,
    pub last_updated_date: EpochMillis,
    #[serde(default)]
    pub number_of_favorites: u64,
    #[serde(default)]
    pub favorites: BTreeMap<UserId, bool>,
    pub image: ImageRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl BlueprintRecord {
    /// Number of `true` entries in the favorite map.
    pub fn favorite_count_from_map(&self) -> u64 {
        self.favorites.values().filter(|flag| **flag).count() as u64
    }

    /// Stored count minus map-derived count.
    ///
    /// The two are written independently, so a non-zero drift is possible
    /// after racing toggles. Zero means consistent.
    pub fn favorite_drift(&self) -> i64 {
        self.number_of_favorites as i64 - self.favorite_count_from_map() as i64
    }

    pub fn is_favorited_by(&self, user_id: &UserId) -> bool {
        self.favorites.get(user_id).copied().unwrap_or(false)
    }

    /// Set or remove one user's favorite entry. Unfavoriting removes the
    /// entry rather than storing `false`.
    pub fn set_favorite(&mut self, user_id: &UserId, favorited: bool) {
        if favorited {
            self.favorites.insert(user_id.clone(), true);
        } else {
            self.favorites.remove(user_id);
        }
    }

    /// Author id, falling back to the nested author block.
    pub fn owner(&self) -> &UserId {
        self.author_id.as_ref().unwrap_or(&self.author.user_id)
    }
}

/// List-view projection stored under `/blueprintSummaries/{key}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintSummary {
    pub title: String,
    pub imgur_id: String,
    pub imgur_type: String,
    #[serde(default)]
    pub number_of_favorites: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_date: Option<EpochMillis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imgur_extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imgur_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imgur_is_from_album: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl BlueprintSummary {
    /// Derive the summary projection of a record.
    pub fn from_record(record: &BlueprintRecord) -> Self {
        let mut summary = Self {
            title: record.title.clone(),
            imgur_id: String::new(),
            imgur_type: String::new(),
            number_of_favorites: record.number_of_favorites,
            last_updated_date: Some(record.last_updated_date),
            imgur_extension: None,
            imgur_title: None,
            imgur_is_from_album: None,
            width: None,
            height: None,
        };
        summary.apply_image(&record.image);
        summary
    }

    /// Copy image metadata into the summary.
    pub fn apply_image(&mut self, image: &ImageRef) {
        self.imgur_id = image.id.clone();
        self.imgur_type = image.mime_type.clone();
        self.imgur_extension = image.extension.clone();
        self.imgur_title = image.title.clone();
        self.imgur_is_from_album = image.is_from_album;
        self.width = image.width;
        self.height = image.height;
    }
}

/// Set of blueprint keys, stored in the tree as `{key: true}`.
///
/// Used for the per-tag index, the per-user authored index and the per-user
/// favorite set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeySet(BTreeMap<BlueprintId, bool>);

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &BlueprintId) -> bool {
        self.0.get(key).copied().unwrap_or(false)
    }

    pub fn insert(&mut self, key: BlueprintId) {
        self.0.insert(key, true);
    }

    /// Remove a key. Returns whether it was present.
    pub fn remove(&mut self, key: &BlueprintId) -> bool {
        self.0.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.values().filter(|flag| **flag).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> impl Iterator<Item = &BlueprintId> {
        self.0.iter().filter(|(_, flag)| **flag).map(|(key, _)| key)
    }
}

impl FromIterator<BlueprintId> for KeySet {
    fn from_iter<I: IntoIterator<Item = BlueprintId>>(iter: I) -> Self {
        Self(iter.into_iter().map(|key| (key, true)).collect())
    }
}

/// One summary inside a page of the recency-ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub key: BlueprintId,
    pub summary: BlueprintSummary,
}

/// One page of the recency-ordered summary list, newest first.
///
/// `last_key`/`last_value` form the inclusive cursor of the first entry of
/// the next page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryPage {
    pub entries: Vec<SummaryEntry>,
    pub last_key: Option<BlueprintId>,
    pub last_value: Option<EpochMillis>,
    pub has_more: bool,
}

/// All pages of the recency-ordered summary list fetched so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedSummaries {
    pub pages: Vec<SummaryPage>,
}

impl PaginatedSummaries {
    pub fn entries(&self) -> impl Iterator<Item = &SummaryEntry> {
        self.pages.iter().flat_map(|page| page.entries.iter())
    }

    pub fn contains(&self, key: &BlueprintId) -> bool {
        self.entries().any(|entry| &entry.key == key)
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|page| page.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Put an entry at the head of the list and re-derive page boundaries.
    ///
    /// Every page except the last keeps its size, so entries shift down one
    /// slot; the last page absorbs the overflow. Any earlier copy of the same
    /// key is dropped. Cursors of non-final pages are recomputed from the
    /// first entry of the following page; the final page keeps its cursor.
    pub fn prepend(&mut self, entry: SummaryEntry) {
        if self.pages.is_empty() {
            self.pages.push(SummaryPage {
                entries: vec![entry],
                ..SummaryPage::default()
            });
            return;
        }

        let sizes: Vec<usize> = self.pages.iter().map(|page| page.entries.len()).collect();
        let key = entry.key.clone();
        let mut remaining: Vec<SummaryEntry> = std::iter::once(entry)
            .chain(
                self.entries()
                    .filter(|existing| existing.key != key)
                    .cloned()
                    .collect::<Vec<_>>(),
            )
            .collect();

        let last = self.pages.len() - 1;
        for (index, page) in self.pages.iter_mut().enumerate() {
            let take = if index == last {
                remaining.len()
            } else {
                sizes[index].min(remaining.len())
            };
            page.entries = remaining.drain(..take).collect();
        }

        for index in 0..last {
            let next_head = self.pages[index + 1]
                .entries
                .first()
                .map(|head| (head.key.clone(), head.summary.last_updated_date));
            let page = &mut self.pages[index];
            if let Some((next_key, next_value)) = next_head {
                page.last_key = Some(next_key);
                page.last_value = next_value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(title: &str, updated: EpochMillis) -> BlueprintSummary {
        BlueprintSummary {
            title: title.to_string(),
            imgur_id: "abc1234".to_string(),
            imgur_type: DEFAULT_IMAGE_TYPE.to_string(),
            number_of_favorites: 0,
            last_updated_date: Some(updated),
            imgur_extension: None,
            imgur_title: None,
            imgur_is_from_album: None,
            width: None,
            height: None,
        }
    }

    fn entry(key: &str, updated: EpochMillis) -> SummaryEntry {
        SummaryEntry {
            key: BlueprintId::from(key),
            summary: summary(key, updated),
        }
    }

    fn record() -> BlueprintRecord {
        BlueprintRecord {
            title: "Balancer".to_string(),
            blueprint_string: "0eNq...".to_string(),
            description_markdown: "A 4x4 balancer".to_string(),
            tags: vec!["/belt/balancer/".to_string()],
            author: Author {
                user_id: UserId::from("u1"),
                display_name: Some("Dosh".to_string()),
            },
            author_id: Some(UserId::from("u1")),
            created_date: 1_000,
            last_updated_date: 2_000,
            number_of_favorites: 1,
            favorites: BTreeMap::from([(UserId::from("u2"), true)]),
            image: ImageRef::new("abc1234", DEFAULT_IMAGE_TYPE),
            image_url: None,
            file_name: None,
        }
    }

    #[test]
    fn test_record_deserializes_tree_shape() {
        let value = serde_json::json!({
            "title": "Balancer",
            "blueprintString": "0eNq...",
            "descriptionMarkdown": "text",
            "author": { "userId": "u1", "displayName": "Dosh" },
            "createdDate": 1,
            "lastUpdatedDate": 2,
            "image": { "id": "abc1234", "type": "image/png" }
        });
        let record: BlueprintRecord = serde_json::from_value(value).unwrap();
        assert!(record.tags.is_empty());
        assert!(record.favorites.is_empty());
        assert_eq!(record.number_of_favorites, 0);
        assert_eq!(record.owner(), &UserId::from("u1"));
    }

    #[test]
    fn test_summary_from_record() {
        let record = record();
        let summary = BlueprintSummary::from_record(&record);
        assert_eq!(summary.title, "Balancer");
        assert_eq!(summary.imgur_id, "abc1234");
        assert_eq!(summary.imgur_type, DEFAULT_IMAGE_TYPE);
        assert_eq!(summary.number_of_favorites, 1);
        assert_eq!(summary.last_updated_date, Some(2_000));
    }

    #[test]
    fn test_favorite_drift() {
        let mut record = record();
        assert_eq!(record.favorite_drift(), 0);
        record.number_of_favorites = 3;
        assert_eq!(record.favorite_drift(), 2);
        record.set_favorite(&UserId::from("u2"), false);
        assert_eq!(record.favorite_count_from_map(), 0);
        assert!(!record.favorites.contains_key(&UserId::from("u2")));
    }

    #[test]
    fn test_key_set_serializes_as_map_of_true() {
        let set: KeySet = [BlueprintId::from("a"), BlueprintId::from("b")]
            .into_iter()
            .collect();
        assert_eq!(
            serde_json::to_value(&set).unwrap(),
            serde_json::json!({"a": true, "b": true})
        );
    }

    #[test]
    fn test_prepend_into_empty_list() {
        let mut list = PaginatedSummaries::default();
        list.prepend(entry("new", 10));
        assert_eq!(list.pages.len(), 1);
        assert_eq!(list.pages[0].entries[0].key, BlueprintId::from("new"));
    }

    #[test]
    fn test_prepend_shifts_entries_across_pages() {
        let mut list = PaginatedSummaries {
            pages: vec![
                SummaryPage {
                    entries: vec![entry("a", 9), entry("b", 8)],
                    last_key: Some(BlueprintId::from("c")),
                    last_value: Some(7),
                    has_more: true,
                },
                SummaryPage {
                    entries: vec![entry("c", 7), entry("d", 6)],
                    last_key: Some(BlueprintId::from("e")),
                    last_value: Some(5),
                    has_more: true,
                },
            ],
        };

        list.prepend(entry("new", 10));

        let first: Vec<_> = list.pages[0].entries.iter().map(|e| e.key.as_str()).collect();
        let second: Vec<_> = list.pages[1].entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(first, vec!["new", "a"]);
        assert_eq!(second, vec!["b", "c", "d"]);
        assert_eq!(list.pages[0].last_key, Some(BlueprintId::from("b")));
        assert_eq!(list.pages[0].last_value, Some(8));
        assert_eq!(list.pages[1].last_key, Some(BlueprintId::from("e")));
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn test_prepend_replaces_existing_copy() {
        let mut list = PaginatedSummaries {
            pages: vec![SummaryPage {
                entries: vec![entry("a", 9), entry("b", 8)],
                ..SummaryPage::default()
            }],
        };
        list.prepend(entry("b", 11));
        let keys: Vec<_> = list.entries().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }
}
