//! Factorio Prints Catalog
//!
//! Blueprint mutations and the cache consistency rules around them. Every
//! mutation performs one atomic multi-path write against the tree store and,
//! once it succeeds, patches the query cache entries that mirror the paths it
//! touched. A watcher keeps cached records in step with their summaries.
//!
//! # Modules
//!
//! - [`catalog`]: the [`Catalog`] handle shared by every mutation
//! - [`mutations`]: create, update, delete, favorite toggle, favorite
//!   repair and the high-watermark sync
//! - [`sync`]: the record/summary reconciliation watcher
//! - [`tags`]: tag hierarchy sources
//! - [`telemetry`]: tracing subscriber bootstrap

pub mod catalog;
pub mod mutations;
pub mod sync;
pub mod tags;
pub mod telemetry;

pub use catalog::{Catalog, MutationOutcome, Route};
pub use mutations::{
    next_favorite_state, AuthUser, BlueprintForm, HighWatermark, ReconcileOutcome, TagIndexPlan,
    ToggleFavorite, ToggleOutcome, UserReconcileOutcome, WatermarkSync,
};
pub use sync::BlueprintCacheSync;
pub use tags::{flatten_hierarchy, HttpTagSource, StoreTagSource, TagHierarchy, TagSource};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig, TelemetryError};
