use std::fmt;
use std::path::{Path, PathBuf};

pub const CACHE_DIR: [&str; 2] = [".followsync", "cache"];

/// Cached dashboard snapshot, written only by the dashboard data manager.
pub const DASHBOARD_SNAPSHOT_KEY: &str = "dashboard_cache";
/// Last fetched credential copy, written only by the token relay.
pub const CREDENTIAL_KEY: &str = "credential";
pub const REMEMBER_SESSION_KEY: &str = "remember_session";
pub const RULES_ACCEPTED_PREFIX: &str = "rules_accepted:";

/// The two writers that share the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOwner {
    Dashboard,
    TokenRelay,
}

impl fmt::Display for KeyOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dashboard => f.write_str("dashboard"),
            Self::TokenRelay => f.write_str("token relay"),
        }
    }
}

#[must_use]
pub fn rules_accepted_key(account: &str) -> String {
    format!("{RULES_ACCEPTED_PREFIX}{account}")
}

/// Returns the partition a key belongs to, or `None` for unknown keys.
#[must_use]
pub fn owner_of(key: &str) -> Option<KeyOwner> {
    match key {
        DASHBOARD_SNAPSHOT_KEY => Some(KeyOwner::Dashboard),
        CREDENTIAL_KEY | REMEMBER_SESSION_KEY => Some(KeyOwner::TokenRelay),
        _ if key.starts_with(RULES_ACCEPTED_PREFIX) => Some(KeyOwner::TokenRelay),
        _ => None,
    }
}

#[must_use]
pub fn cache_root(base: &Path) -> PathBuf {
    base.join(CACHE_DIR[0]).join(CACHE_DIR[1])
}

/// Maps a key to a file name that is safe on every supported platform.
#[must_use]
pub fn key_file_name(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' | '.' => '-',
            _ => c,
        })
        .collect();
    format!("{sanitized}.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_keys_belong_to_the_token_relay() {
        let key = rules_accepted_key("acct-7");
        assert_eq!(key, "rules_accepted:acct-7");
        assert_eq!(owner_of(&key), Some(KeyOwner::TokenRelay));
        assert_eq!(owner_of(DASHBOARD_SNAPSHOT_KEY), Some(KeyOwner::Dashboard));
        assert_eq!(owner_of("something_else"), None);
    }

    #[test]
    fn file_names_never_contain_separators() {
        assert_eq!(
            key_file_name("rules_accepted:a/b c"),
            "rules_accepted-a-b-c.json"
        );
        assert_eq!(key_file_name("../escape"), "---escape.json");
    }
}
