//! Normalized tree paths and the catalog's path layout.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Slash-separated path into the tree.
///
/// Empty segments collapse, so `/byTag//belt/balancer/` and
/// `byTag/belt/balancer` name the same node. The root is the empty path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DbPath(String);

impl DbPath {
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Parse a path, collapsing empty segments.
    pub fn parse(raw: &str) -> Self {
        Self::root().join(raw)
    }

    /// Append one or more segments. `segment` may itself contain slashes.
    pub fn join(&self, segment: &str) -> Self {
        let mut path = self.0.clone();
        for part in segment.split('/').filter(|part| !part.is_empty()) {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(part);
        }
        Self(path)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|part| !part.is_empty())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment, if any.
    pub fn leaf(&self) -> Option<&str> {
        self.segments().last()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `self` is `other` or one of its ancestors.
    pub fn contains(&self, other: &DbPath) -> bool {
        self.is_root()
            || other.0 == self.0
            || (other.0.starts_with(&self.0) && other.0.as_bytes().get(self.0.len()) == Some(&b'/'))
    }
}

impl fmt::Display for DbPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl From<&str> for DbPath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// Path layout of the catalog inside the tree.
pub mod paths {
    use super::DbPath;
    use prints_core::{BlueprintId, UserId};

    pub const BLUEPRINTS: &str = "blueprints";
    pub const SUMMARIES: &str = "blueprintSummaries";
    pub const PRIVATE: &str = "blueprintsPrivate";
    pub const BY_TAG: &str = "byTag";
    pub const USERS: &str = "users";
    pub const TAGS: &str = "tags";

    /// Child used to order the recency list.
    pub const LAST_UPDATED: &str = "lastUpdatedDate";

    pub fn blueprints() -> DbPath {
        DbPath::parse(BLUEPRINTS)
    }

    pub fn blueprint(id: &BlueprintId) -> DbPath {
        blueprints().join(id.as_str())
    }

    pub fn blueprint_field(id: &BlueprintId, field: &str) -> DbPath {
        blueprint(id).join(field)
    }

    pub fn blueprint_favorite(id: &BlueprintId, user: &UserId) -> DbPath {
        blueprint(id).join("favorites").join(user.as_str())
    }

    pub fn summaries() -> DbPath {
        DbPath::parse(SUMMARIES)
    }

    pub fn summary(id: &BlueprintId) -> DbPath {
        summaries().join(id.as_str())
    }

    pub fn summary_field(id: &BlueprintId, field: &str) -> DbPath {
        summary(id).join(field)
    }

    pub fn private(id: &BlueprintId) -> DbPath {
        DbPath::parse(PRIVATE).join(id.as_str())
    }

    pub fn private_image_url(id: &BlueprintId) -> DbPath {
        private(id).join("imageUrl")
    }

    /// Index node for a tag. Tags like `/belt/balancer/` nest.
    pub fn tag_index(tag: &str) -> DbPath {
        DbPath::parse(BY_TAG).join(tag)
    }

    pub fn tag_entry(tag: &str, id: &BlueprintId) -> DbPath {
        tag_index(tag).join(id.as_str())
    }

    pub fn user_blueprints(user: &UserId) -> DbPath {
        DbPath::parse(USERS).join(user.as_str()).join("blueprints")
    }

    pub fn user_blueprint(user: &UserId, id: &BlueprintId) -> DbPath {
        user_blueprints(user).join(id.as_str())
    }

    pub fn user_favorites(user: &UserId) -> DbPath {
        DbPath::parse(USERS).join(user.as_str()).join("favorites")
    }

    pub fn user_favorite(user: &UserId, id: &BlueprintId) -> DbPath {
        user_favorites(user).join(id.as_str())
    }

    pub fn tags() -> DbPath {
        DbPath::parse(TAGS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prints_core::{BlueprintId, UserId};

    #[test]
    fn test_empty_segments_collapse() {
        assert_eq!(DbPath::parse("/byTag//belt/balancer/").as_str(), "byTag/belt/balancer");
        assert_eq!(DbPath::parse("///"), DbPath::root());
    }

    #[test]
    fn test_tag_paths_nest() {
        let id = BlueprintId::from("k1");
        let path = paths::tag_entry("/belt/balancer/", &id);
        assert_eq!(path.to_string(), "/byTag/belt/balancer/k1");
        assert_eq!(path.leaf(), Some("k1"));
    }

    #[test]
    fn test_contains() {
        let parent = DbPath::parse("users/u1");
        assert!(parent.contains(&paths::user_favorite(&UserId::from("u1"), &"k".into())));
        assert!(!parent.contains(&DbPath::parse("users/u10")));
        assert!(DbPath::root().contains(&parent));
    }
}
