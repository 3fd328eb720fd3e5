//! Blueprint mutations.
//!
//! Every mutation follows the same contract:
//!
//! 1. validate the input; nothing is written when validation fails
//! 2. apply one atomic multi-path write to the tree store
//! 3. on success, patch the mirrored cache entries in a fixed order
//!
//! A failed remote write returns `Err` and leaves the cache untouched. A
//! failed cache patch is logged and skipped.

mod create;
mod delete;
mod favorite;
mod reconcile;
mod update;
mod user_favorites;
mod watermark;

pub use favorite::{next_favorite_state, ToggleFavorite, ToggleOutcome};
pub use reconcile::ReconcileOutcome;
pub use update::TagIndexPlan;
pub use user_favorites::UserReconcileOutcome;
pub use watermark::{HighWatermark, WatermarkSync};

use prints_core::{normalize_tags, ImageInput, UserId, ValidationError};
use serde::{Deserialize, Serialize};

/// Submitted create or edit form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintForm {
    pub title: String,
    pub blueprint_string: String,
    pub description_markdown: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub image: ImageInput,
}

impl BlueprintForm {
    pub fn new(
        title: impl Into<String>,
        blueprint_string: impl Into<String>,
        description_markdown: impl Into<String>,
        image: ImageInput,
    ) -> Self {
        Self {
            title: title.into(),
            blueprint_string: blueprint_string.into(),
            description_markdown: description_markdown.into(),
            tags: Vec::new(),
            image,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Selected tags, trimmed and deduplicated.
    pub fn normalized_tags(&self) -> Vec<String> {
        normalize_tags(&self.tags)
    }

    /// Check required fields. Image validity is checked on resolution.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "title".to_string(),
            });
        }
        if self.blueprint_string.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "blueprintString".to_string(),
            });
        }
        Ok(())
    }
}

/// The signed-in user performing a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub uid: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl AuthUser {
    pub fn new(uid: impl Into<UserId>, display_name: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> BlueprintForm {
        BlueprintForm::new(
            "Balancer",
            "0eNqdkM0KwjAQhN9lz1GaVGvNq4hIf5YSSDchSYtS8u6mFn8O3ryEnWX2m2UWaPWE1imKIBdQnSEP8riAVwM1et3FuyWQoCKOwICacVXodKNVPGq0j35Dx7h",
            "A 4 to 4 belt balancer",
            ImageInput::url("https://imgur.com/AbC1234"),
        )
    }

    #[test]
    fn test_valid_form() {
        assert!(form().validate().is_ok());
    }

    #[test]
    fn test_blank_title_is_rejected() {
        let mut form = form();
        form.title = "   ".to_string();
        assert_eq!(
            form.validate(),
            Err(ValidationError::RequiredFieldMissing {
                field: "title".to_string()
            })
        );
    }

    #[test]
    fn test_blank_blueprint_string_is_rejected() {
        let mut form = form();
        form.blueprint_string = String::new();
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_normalized_tags() {
        let form = form().with_tags([" /belt/balancer/ ", "", "/belt/balancer/", "/combat/"]);
        assert_eq!(form.normalized_tags(), vec!["/belt/balancer/", "/combat/"]);
    }
}
