//! Durable key-value cache for the orchestrator's local state.
//!
//! Keys are partitioned between two owners (the dashboard data manager and the
//! token relay); [`ScopedStore`] enforces that partition so neither can write
//! the other's keys.

mod error;
mod keys;
mod schema;
mod store;

pub use error::CacheStoreError;
pub use keys::{
    cache_root, key_file_name, owner_of, rules_accepted_key, KeyOwner, CREDENTIAL_KEY,
    DASHBOARD_SNAPSHOT_KEY, REMEMBER_SESSION_KEY, RULES_ACCEPTED_PREFIX,
};
pub use schema::{
    format_rfc3339, now_rfc3339, parse_rfc3339, CredentialRecord, NonFollowerRecord,
    SnapshotRecord, SNAPSHOT_VERSION,
};
pub use store::{FileStore, KeyValueStore, MemoryStore, ScopedStore};
