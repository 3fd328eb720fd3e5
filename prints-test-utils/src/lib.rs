//! Factorio Prints Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - Proptest generators for ids, tags, images, records and summaries
//! - Fixtures for records and pre-seeded tree stores
//! - Assertions on catalog error variants

pub use prints_core::{
    Author, BlueprintId, BlueprintRecord, BlueprintSummary, EpochMillis, ImageRef, KeySet,
    PrintsConfig, PrintsError, PrintsResult, StoreError, UserId, ValidationError,
    DEFAULT_IMAGE_TYPE,
};
pub use prints_storage::{paths, DbPath, InMemoryTreeStore, QueryCache};

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for catalog types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_blueprint_id() -> impl Strategy<Value = BlueprintId> {
        "-[A-Za-z0-9_]{19}".prop_map(BlueprintId::from)
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        "[A-Za-z0-9]{28}".prop_map(UserId::from)
    }

    /// Tag in `/{category}/{name}/` form.
    pub fn arb_tag() -> impl Strategy<Value = String> {
        ("[a-z]{3,10}", "[a-z]{3,10}").prop_map(|(category, name)| format!("/{category}/{name}/"))
    }

    pub fn arb_tags() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::btree_set(arb_tag(), 0..5).prop_map(|tags| tags.into_iter().collect())
    }

    pub fn arb_timestamp() -> impl Strategy<Value = EpochMillis> {
        1_400_000_000_000i64..1_900_000_000_000i64
    }

    pub fn arb_image_ref() -> impl Strategy<Value = ImageRef> {
        "[A-Za-z0-9]{7}".prop_map(|id| ImageRef::new(id, DEFAULT_IMAGE_TYPE))
    }

    pub fn arb_record() -> impl Strategy<Value = BlueprintRecord> {
        (
            "[A-Za-z0-9 ]{1,40}",
            arb_user_id(),
            arb_tags(),
            arb_timestamp(),
            arb_image_ref(),
            proptest::collection::btree_set(arb_user_id(), 0..4),
        )
            .prop_map(|(title, author, tags, created, image, fans)| {
                let mut record = fixtures::record(author, &title);
                record.tags = tags;
                record.created_date = created;
                record.last_updated_date = created;
                record.image = image;
                record.favorites = fans.into_iter().map(|user| (user, true)).collect();
                record.number_of_favorites = record.favorites.len() as u64;
                record
            })
    }

    pub fn arb_summary() -> impl Strategy<Value = BlueprintSummary> {
        arb_record().prop_map(|record| BlueprintSummary::from_record(&record))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records and tree stores.

    use super::*;

    /// Config with no retries and no debounce delay.
    pub fn test_config() -> PrintsConfig {
        PrintsConfig {
            query_retries: 0,
            mutation_retries: 0,
            page_size: 2,
            persist_wait: Duration::ZERO,
            persist_max_wait: Duration::ZERO,
            worker_timeout: Duration::from_secs(1),
            ..PrintsConfig::default()
        }
    }

    /// A valid record by `author` without tags or favorites.
    pub fn record(author: UserId, title: &str) -> BlueprintRecord {
        BlueprintRecord {
            title: title.to_string(),
            blueprint_string: "0eNqdkM0KwjAQhN9lz1GaVGvNq4hIf5YSSDchSYtS8u6mFn8O3ryEnWX2m2UWaPWE1imKIBdQnSEP8riAVwM1et3FuyWQoCKOwICacVXod".to_string(),
            description_markdown: format!("# {title}"),
            tags: Vec::new(),
            author: Author {
                user_id: author.clone(),
                display_name: Some("Test Author".to_string()),
            },
            author_id: Some(author),
            created_date: 1_700_000_000_000,
            last_updated_date: 1_700_000_000_000,
            number_of_favorites: 0,
            favorites: BTreeMap::new(),
            image: ImageRef::new("AbC1234", DEFAULT_IMAGE_TYPE),
            image_url: None,
            file_name: None,
        }
    }

    /// A record under `author` carrying `tags`.
    pub fn tagged_record(author: &str, title: &str, tags: &[&str]) -> BlueprintRecord {
        let mut record = record(UserId::from(author), title);
        record.tags = tags.iter().map(|tag| tag.to_string()).collect();
        record
    }

    fn insert_at(root: &mut Value, path: &DbPath, value: Value) {
        let mut node = root;
        for segment in path.segments() {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else {
                unreachable!("node was just made an object");
            };
            node = map.entry(segment.to_string()).or_insert(Value::Null);
        }
        *node = value;
    }

    /// Tree holding `blueprints` with every projection written: record,
    /// summary, author index and tag index entries.
    pub fn catalog_tree(blueprints: &[(BlueprintId, BlueprintRecord)]) -> Value {
        let mut root = Value::Object(Map::new());
        for (id, record) in blueprints {
            let summary = BlueprintSummary::from_record(record);
            insert_at(
                &mut root,
                &paths::blueprint(id),
                serde_json::to_value(record).expect("record should serialize"),
            );
            insert_at(
                &mut root,
                &paths::summary(id),
                serde_json::to_value(&summary).expect("summary should serialize"),
            );
            insert_at(&mut root, &paths::user_blueprint(record.owner(), id), Value::Bool(true));
            for tag in &record.tags {
                insert_at(&mut root, &paths::tag_entry(tag, id), Value::Bool(true));
            }
            for (user, flag) in &record.favorites {
                if *flag {
                    insert_at(&mut root, &paths::user_favorite(user, id), Value::Bool(true));
                }
            }
        }
        root
    }

    /// In-memory tree store seeded with `blueprints`.
    pub fn seeded_store(blueprints: &[(BlueprintId, BlueprintRecord)]) -> InMemoryTreeStore {
        InMemoryTreeStore::with_root(catalog_tree(blueprints))
    }

    /// Query cache with the default stale time.
    pub fn cache() -> QueryCache {
        QueryCache::from_config(&test_config())
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on catalog results.

    use super::*;

    /// Assert that a PrintsResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &PrintsResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a PrintsResult failed validation.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &PrintsResult<T>) {
        match result {
            Err(PrintsError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert that a PrintsResult is an invalid image URL error.
    #[track_caller]
    pub fn assert_invalid_image<T: std::fmt::Debug>(result: &PrintsResult<T>) {
        match result {
            Err(PrintsError::Validation(ValidationError::InvalidImageUrl { .. })) => {}
            other => panic!("Expected InvalidImageUrl error, got: {:?}", other),
        }
    }

    /// Assert that a PrintsResult is a Store error.
    #[track_caller]
    pub fn assert_store_error<T: std::fmt::Debug>(result: &PrintsResult<T>) {
        match result {
            Err(PrintsError::Store(_)) => {}
            other => panic!("Expected Store error, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_catalog_tree_nests_tags() {
        let id = BlueprintId::from("k1");
        let record = tagged_record("u1", "Balancer", &["/belt/balancer/"]);
        let tree = catalog_tree(&[(id, record)]);
        assert_eq!(tree["byTag"]["belt"]["balancer"]["k1"], Value::Bool(true));
        assert_eq!(tree["users"]["u1"]["blueprints"]["k1"], Value::Bool(true));
        assert_eq!(tree["blueprintSummaries"]["k1"]["title"], "Balancer");
    }
}
