use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::CacheStoreError;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NonFollowerRecord {
    pub id: String,
    pub username: String,
}

/// Durable form of the dashboard snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotRecord {
    pub version: u32,
    pub followers_count: u64,
    pub following_count: u64,
    #[serde(default)]
    pub last_sync_time: Option<String>,
    #[serde(default)]
    pub non_followers: Vec<NonFollowerRecord>,
    pub captured_at: String,
}

impl SnapshotRecord {
    /// Parses and validates a stored record. Any failure means the entry is
    /// corrupt (see [`CacheStoreError::is_corrupt`]).
    pub fn decode(key: &str, raw: &str) -> Result<Self, CacheStoreError> {
        let record: Self =
            serde_json::from_str(raw).map_err(|source| CacheStoreError::json_parse(key, source))?;

        if record.version != SNAPSHOT_VERSION {
            return Err(CacheStoreError::UnsupportedVersion {
                key: key.to_string(),
                found: record.version,
            });
        }

        // `last_sync_time` is whatever the backend reported and stays opaque.
        validate_rfc3339(key, "captured_at", &record.captured_at)?;

        let mut seen = HashSet::new();
        for entry in &record.non_followers {
            if !seen.insert(entry.id.as_str()) {
                return Err(CacheStoreError::DuplicateId {
                    key: key.to_string(),
                    id: entry.id.clone(),
                });
            }
        }

        Ok(record)
    }

    pub fn encode(&self, key: &str) -> Result<String, CacheStoreError> {
        serde_json::to_string(self).map_err(|source| CacheStoreError::json_serialize(key, source))
    }
}

/// Cached copy of the identity credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialRecord {
    pub token: String,
    pub stored_at: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl CredentialRecord {
    pub fn decode(key: &str, raw: &str) -> Result<Self, CacheStoreError> {
        let record: Self =
            serde_json::from_str(raw).map_err(|source| CacheStoreError::json_parse(key, source))?;
        validate_rfc3339(key, "stored_at", &record.stored_at)?;
        if let Some(expires_at) = &record.expires_at {
            validate_rfc3339(key, "expires_at", expires_at)?;
        }
        Ok(record)
    }

    pub fn encode(&self, key: &str) -> Result<String, CacheStoreError> {
        serde_json::to_string(self).map_err(|source| CacheStoreError::json_serialize(key, source))
    }

    /// True when the record carries an expiry at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at
            .as_deref()
            .and_then(parse_rfc3339)
            .is_some_and(|expires_at| expires_at <= now)
    }
}

pub fn now_rfc3339() -> Result<String, CacheStoreError> {
    format_rfc3339(OffsetDateTime::now_utc())
}

pub fn format_rfc3339(at: OffsetDateTime) -> Result<String, CacheStoreError> {
    at.format(&Rfc3339).map_err(CacheStoreError::ClockFormat)
}

#[must_use]
pub fn parse_rfc3339(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).ok()
}

fn validate_rfc3339(key: &str, field: &'static str, value: &str) -> Result<(), CacheStoreError> {
    if parse_rfc3339(value).is_none() {
        return Err(CacheStoreError::InvalidTimestamp {
            key: key.to_string(),
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
