//! Identity types for catalog entities

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unix timestamp in milliseconds, the unit the backing tree stores.
pub type EpochMillis = i64;

/// Current wall-clock time in milliseconds.
pub fn now_millis() -> EpochMillis {
    Utc::now().timestamp_millis()
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Opaque key of a blueprint record, assigned at creation.
    BlueprintId
);

string_id!(
    /// Authenticated user id as issued by the auth backend.
    UserId
);

impl BlueprintId {
    /// Generate a new time-sortable key.
    ///
    /// UUIDv7 embeds a millisecond timestamp, so keys generated later sort
    /// after keys generated earlier, like hosted push keys do.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }
}
