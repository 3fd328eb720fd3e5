//! Image reference extraction from submitted URLs.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{ImageRef, DEFAULT_IMAGE_TYPE};

/// Gallery short-path form: `https://imgur.com/AbCdEfG`.
static GALLERY_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://imgur\.com/([a-zA-Z0-9]{7})$").expect("Invalid gallery URL regex")
});

/// Direct image form: `https://i.imgur.com/AbCdEfG.png`.
static DIRECT_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://i\.imgur\.com/([a-zA-Z0-9]+)\.([a-zA-Z0-9]{3,4})$")
        .expect("Invalid direct URL regex")
});

/// Image as submitted with a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ImageInput {
    /// A URL pasted by the user. An empty URL means "no image given".
    Url(String),
    /// A descriptor already produced by an external resolver.
    Resolved(ImageRef),
}

impl ImageInput {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// The original URL, when one was submitted.
    pub fn source_url(&self) -> Option<&str> {
        match self {
            Self::Url(url) if !url.is_empty() => Some(url),
            _ => None,
        }
    }

    /// Resolve to an image reference.
    ///
    /// Returns `Ok(None)` for an empty URL and `InvalidImageUrl` when the URL
    /// matches neither accepted shape.
    pub fn resolve(&self) -> Result<Option<ImageRef>, ValidationError> {
        match self {
            Self::Resolved(image) => Ok(Some(image.clone())),
            Self::Url(url) if url.is_empty() => Ok(None),
            Self::Url(url) => extract_image(url)
                .map(Some)
                .ok_or_else(|| ValidationError::InvalidImageUrl { url: url.clone() }),
        }
    }

    /// Resolve, treating an absent image as invalid.
    pub fn resolve_required(&self) -> Result<ImageRef, ValidationError> {
        self.resolve()?.ok_or_else(|| ValidationError::InvalidImageUrl {
            url: String::new(),
        })
    }
}

/// Extract an image reference from one of the two accepted URL shapes.
///
/// The gallery form is tried first. The mime type is always recorded as
/// `image/png`; the direct form also keeps its file extension.
pub fn extract_image(url: &str) -> Option<ImageRef> {
    if let Some(captures) = GALLERY_URL.captures(url) {
        return Some(ImageRef::new(&captures[1], DEFAULT_IMAGE_TYPE));
    }
    DIRECT_URL.captures(url).map(|captures| {
        ImageRef::new(&captures[1], DEFAULT_IMAGE_TYPE).with_extension(&captures[2])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gallery_url() {
        let image = extract_image("https://imgur.com/AbC1234").unwrap();
        assert_eq!(image.id, "AbC1234");
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.extension, None);
    }

    #[test]
    fn test_direct_url() {
        let image = extract_image("https://i.imgur.com/xYz98.jpeg").unwrap();
        assert_eq!(image.id, "xYz98");
        assert_eq!(image.extension.as_deref(), Some("jpeg"));
    }

    #[test]
    fn test_rejected_shapes() {
        for url in [
            "https://imgur.com/short",
            "https://imgur.com/a/AbC1234",
            "http://imgur.com/AbC1234",
            "https://i.imgur.com/xYz98",
            "https://i.imgur.com/xYz98.toolong",
            "https://example.com/AbC1234",
            "not a url",
        ] {
            assert!(extract_image(url).is_none(), "{url} should be rejected");
        }
    }

    #[test]
    fn test_resolved_descriptor_wins() {
        let mut image = ImageRef::new("resolved1", "image/jpeg");
        image.width = Some(800);
        let input = ImageInput::Resolved(image.clone());
        assert_eq!(input.resolve().unwrap(), Some(image));
    }

    #[test]
    fn test_empty_url_resolves_to_none() {
        assert_eq!(ImageInput::url("").resolve().unwrap(), None);
        assert!(ImageInput::url("").resolve_required().is_err());
    }

    #[test]
    fn test_invalid_url_error() {
        let err = ImageInput::url("https://example.com/x.png").resolve().unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidImageUrl {
                url: "https://example.com/x.png".to_string()
            }
        );
    }
}
