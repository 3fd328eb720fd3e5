//! Validation and normalization applied before cache and store writes.

use crate::error::ValidationError;
use crate::model::{BlueprintRecord, BlueprintSummary};

fn invalid(field: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Check a full record before it is written into the cache.
pub fn validate_record(record: &BlueprintRecord) -> Result<(), ValidationError> {
    if record.author.user_id.as_str().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "author.userId".to_string(),
        });
    }
    if record.image.id.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "image.id".to_string(),
        });
    }
    if record.created_date < 0 || record.last_updated_date < 0 {
        return Err(invalid("lastUpdatedDate", "timestamps must not be negative"));
    }
    if record.tags.iter().any(|tag| tag.trim().is_empty()) {
        return Err(invalid("tags", "tags must not be blank"));
    }
    Ok(())
}

/// Check a summary before it is written into the cache.
pub fn validate_summary(summary: &BlueprintSummary) -> Result<(), ValidationError> {
    if summary.imgur_id.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "imgurId".to_string(),
        });
    }
    if matches!(summary.last_updated_date, Some(date) if date < 0) {
        return Err(invalid("lastUpdatedDate", "timestamps must not be negative"));
    }
    Ok(())
}

/// Trim tags, drop blanks and duplicates, keep first-seen order.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !normalized.iter().any(|seen| seen == tag) {
            normalized.push(tag.to_string());
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserId;
    use crate::model::{Author, ImageRef, DEFAULT_IMAGE_TYPE};
    use std::collections::BTreeMap;

    fn record() -> BlueprintRecord {
        BlueprintRecord {
            title: "Smelter".to_string(),
            blueprint_string: "0eNq".to_string(),
            description_markdown: String::new(),
            tags: vec![],
            author: Author {
                user_id: UserId::from("u1"),
                display_name: None,
            },
            author_id: None,
            created_date: 1,
            last_updated_date: 1,
            number_of_favorites: 0,
            favorites: BTreeMap::new(),
            image: ImageRef::new("abc1234", DEFAULT_IMAGE_TYPE),
            image_url: None,
            file_name: None,
        }
    }

    #[test]
    fn test_valid_record() {
        assert!(validate_record(&record()).is_ok());
    }

    #[test]
    fn test_record_without_image_id() {
        let mut record = record();
        record.image.id.clear();
        assert!(matches!(
            validate_record(&record),
            Err(ValidationError::RequiredFieldMissing { field }) if field == "image.id"
        ));
    }

    #[test]
    fn test_record_with_blank_tag() {
        let mut record = record();
        record.tags = vec!["  ".to_string()];
        assert!(validate_record(&record).is_err());
    }

    #[test]
    fn test_summary_requires_image_id() {
        let mut summary = BlueprintSummary::from_record(&record());
        assert!(validate_summary(&summary).is_ok());
        summary.imgur_id.clear();
        assert!(validate_summary(&summary).is_err());
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(&[" combat ", "", "logistics", "combat"]);
        assert_eq!(tags, vec!["combat", "logistics"]);
    }

    proptest::proptest! {
        #[test]
        fn prop_normalized_tags_are_unique_and_trimmed(tags in proptest::collection::vec("[ a-z/]{0,8}", 0..12)) {
            let normalized = normalize_tags(&tags);
            for (i, tag) in normalized.iter().enumerate() {
                proptest::prop_assert!(!tag.is_empty());
                proptest::prop_assert_eq!(tag.trim(), tag.as_str());
                proptest::prop_assert!(!normalized[..i].contains(tag));
            }
        }
    }
}
