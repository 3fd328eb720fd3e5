//! Factorio Prints Core - Catalog Types
//!
//! Record schema, image-reference extraction, validation, the error taxonomy
//! and configuration. Every other crate in the workspace depends on this one.

pub mod config;
pub mod error;
pub mod identity;
pub mod image;
pub mod model;
pub mod validate;

pub use config::{PrintsConfig, QUERY_CACHE_KEY};
pub use error::{
    CacheError, ConfigError, PersistError, PrintsError, PrintsResult, StoreError,
    ValidationError,
};
pub use identity::{now_millis, BlueprintId, EpochMillis, UserId};
pub use image::{extract_image, ImageInput};
pub use model::{
    Author, BlueprintRecord, BlueprintSummary, ImageRef, KeySet, PaginatedSummaries,
    SummaryEntry, SummaryPage, DEFAULT_IMAGE_TYPE,
};
pub use validate::{normalize_tags, validate_record, validate_summary};
