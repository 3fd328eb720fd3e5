//! Typed query keys.

use prints_core::{BlueprintId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of one cached query result.
///
/// Each key holds exactly one [`CacheValue`](super::CacheValue) shape; see
/// [`QueryKey::expected_shape`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "camelCase")]
pub enum QueryKey {
    /// Full record of one blueprint.
    Blueprint { id: BlueprintId },
    /// Summary projection of one blueprint.
    Summary { id: BlueprintId },
    /// Paginated recency-ordered summary list.
    RecentSummaries,
    /// Keys carrying one tag.
    TagIndex { tag: String },
    /// Keys authored by one user.
    UserBlueprints { user: UserId },
    /// Keys favorited by one user.
    UserFavorites { user: UserId },
    /// Whether `user` favorited `blueprint`, keyed from the user side.
    UserFavoriteFlag { user: UserId, blueprint: BlueprintId },
    /// Whether `user` favorited `blueprint`, keyed from the blueprint side.
    BlueprintFavoriteFlag { blueprint: BlueprintId, user: UserId },
    /// Full tag list.
    KnownTags,
}

impl QueryKey {
    pub fn blueprint(id: &BlueprintId) -> Self {
        Self::Blueprint { id: id.clone() }
    }

    pub fn summary(id: &BlueprintId) -> Self {
        Self::Summary { id: id.clone() }
    }

    pub fn tag_index(tag: &str) -> Self {
        Self::TagIndex {
            tag: tag.to_string(),
        }
    }

    pub fn user_blueprints(user: &UserId) -> Self {
        Self::UserBlueprints { user: user.clone() }
    }

    pub fn user_favorites(user: &UserId) -> Self {
        Self::UserFavorites { user: user.clone() }
    }

    pub fn user_favorite_flag(user: &UserId, blueprint: &BlueprintId) -> Self {
        Self::UserFavoriteFlag {
            user: user.clone(),
            blueprint: blueprint.clone(),
        }
    }

    pub fn blueprint_favorite_flag(blueprint: &BlueprintId, user: &UserId) -> Self {
        Self::BlueprintFavoriteFlag {
            blueprint: blueprint.clone(),
            user: user.clone(),
        }
    }

    /// Name of the value shape stored under this key.
    pub fn expected_shape(&self) -> &'static str {
        match self {
            Self::Blueprint { .. } => "record",
            Self::Summary { .. } => "summary",
            Self::RecentSummaries => "recentSummaries",
            Self::TagIndex { .. } | Self::UserBlueprints { .. } | Self::UserFavorites { .. } => {
                "keySet"
            }
            Self::UserFavoriteFlag { .. } | Self::BlueprintFavoriteFlag { .. } => "flag",
            Self::KnownTags => "tags",
        }
    }

    /// Blueprint the key is about, if any.
    pub fn blueprint_id(&self) -> Option<&BlueprintId> {
        match self {
            Self::Blueprint { id } | Self::Summary { id } => Some(id),
            Self::UserFavoriteFlag { blueprint, .. }
            | Self::BlueprintFavoriteFlag { blueprint, .. } => Some(blueprint),
            _ => None,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blueprint { id } => write!(f, "blueprint/{id}"),
            Self::Summary { id } => write!(f, "blueprintSummary/{id}"),
            Self::RecentSummaries => f.write_str("blueprintSummaries/recent"),
            Self::TagIndex { tag } => write!(f, "byTag/{tag}"),
            Self::UserBlueprints { user } => write!(f, "users/{user}/blueprints"),
            Self::UserFavorites { user } => write!(f, "users/{user}/favorites"),
            Self::UserFavoriteFlag { user, blueprint } => {
                write!(f, "users/{user}/favorites/{blueprint}")
            }
            Self::BlueprintFavoriteFlag { blueprint, user } => {
                write!(f, "blueprint/{blueprint}/favorites/{user}")
            }
            Self::KnownTags => f.write_str("tags"),
        }
    }
}
