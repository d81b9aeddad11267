use std::path::PathBuf;

use thiserror::Error;

use crate::keys::KeyOwner;

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse cached JSON under key '{key}': {source}")]
    JsonParse {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize value for key '{key}': {source}")]
    JsonSerialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("key '{key}' has unsupported record version {found}; expected 1")]
    UnsupportedVersion { key: String, found: u32 },

    #[error("key '{key}' has invalid RFC3339 timestamp in field '{field}': {value}")]
    InvalidTimestamp {
        key: String,
        field: &'static str,
        value: String,
    },

    #[error("key '{key}' contains a duplicate non-follower id '{id}'")]
    DuplicateId { key: String, id: String },

    #[error("key '{key}' is not owned by the {owner} partition")]
    ForeignKey { key: String, owner: KeyOwner },

    #[error("key '{key}' cannot be stored: keys must be non-empty printable text")]
    InvalidKey { key: String },

    #[error("failed to format current UTC timestamp as RFC3339: {0}")]
    ClockFormat(#[source] time::error::Format),
}

impl CacheStoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn json_parse(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::JsonParse {
            key: key.into(),
            source,
        }
    }

    #[must_use]
    pub fn json_serialize(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::JsonSerialize {
            key: key.into(),
            source,
        }
    }

    /// True when the stored value exists but cannot be trusted. Callers treat
    /// such entries as absent and overwrite them.
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Self::JsonParse { .. }
                | Self::UnsupportedVersion { .. }
                | Self::InvalidTimestamp { .. }
                | Self::DuplicateId { .. }
        )
    }
}
