//! Environment configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const API_BASE_URL_ENV: &str = "FOLLOWSYNC_API_BASE_URL";
pub const CACHE_DIR_ENV: &str = "FOLLOWSYNC_CACHE_DIR";
pub const CHANNEL_TIMEOUT_ENV: &str = "FOLLOWSYNC_CHANNEL_TIMEOUT_MS";
pub const HTTP_TIMEOUT_ENV: &str = "FOLLOWSYNC_HTTP_TIMEOUT_SEC";
pub const REMEMBER_SESSION_ENV: &str = "FOLLOWSYNC_REMEMBER_SESSION";

pub const DEFAULT_CHANNEL_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_HTTP_TIMEOUT_SEC: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got '{value}'")]
    InvalidPositiveInteger { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub api_base_url: String,
    pub cache_dir: Option<PathBuf>,
    pub channel_timeout: Duration,
    pub http_timeout: Duration,
    pub remember_session: bool,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            api_base_url: dashboard_api::DEFAULT_API_BASE_URL.to_string(),
            cache_dir: None,
            channel_timeout: Duration::from_millis(DEFAULT_CHANNEL_TIMEOUT_MS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SEC),
            remember_session: false,
        }
    }
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            api_base_url: env_string_opt(API_BASE_URL_ENV).unwrap_or(defaults.api_base_url),
            cache_dir: env_string_opt(CACHE_DIR_ENV).map(PathBuf::from),
            channel_timeout: Duration::from_millis(env_positive_u64(
                CHANNEL_TIMEOUT_ENV,
                DEFAULT_CHANNEL_TIMEOUT_MS,
            )?),
            http_timeout: Duration::from_secs(env_positive_u64(
                HTTP_TIMEOUT_ENV,
                DEFAULT_HTTP_TIMEOUT_SEC,
            )?),
            remember_session: env_flag(REMEMBER_SESSION_ENV),
        })
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value.trim().to_string())
        }
    })
}

fn env_positive_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = env_string_opt(key) else {
        return Ok(default);
    };
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidPositiveInteger { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    #[test]
    fn env_defaults_apply_when_unset() {
        let _lock = env_lock();
        let _g1 = set_env_guard(API_BASE_URL_ENV, None);
        let _g2 = set_env_guard(CACHE_DIR_ENV, None);
        let _g3 = set_env_guard(CHANNEL_TIMEOUT_ENV, None);
        let _g4 = set_env_guard(HTTP_TIMEOUT_ENV, None);
        let _g5 = set_env_guard(REMEMBER_SESSION_ENV, None);

        let config = EnvConfig::from_env().expect("defaults");
        assert_eq!(config.api_base_url, "http://127.0.0.1:8000");
        assert!(config.cache_dir.is_none());
        assert_eq!(config.channel_timeout, Duration::from_millis(5_000));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert!(!config.remember_session);
    }

    #[test]
    fn env_values_override_defaults() {
        let _lock = env_lock();
        let _g1 = set_env_guard(API_BASE_URL_ENV, Some("https://api.example.com"));
        let _g2 = set_env_guard(CACHE_DIR_ENV, Some("/tmp/followsync"));
        let _g3 = set_env_guard(CHANNEL_TIMEOUT_ENV, Some("250"));
        let _g4 = set_env_guard(HTTP_TIMEOUT_ENV, Some("5"));
        let _g5 = set_env_guard(REMEMBER_SESSION_ENV, Some("1"));

        let config = EnvConfig::from_env().expect("overrides");
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/followsync")));
        assert_eq!(config.channel_timeout, Duration::from_millis(250));
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert!(config.remember_session);
    }

    #[test]
    fn zero_or_garbage_timeouts_are_rejected() {
        let _lock = env_lock();
        let _g1 = set_env_guard(CHANNEL_TIMEOUT_ENV, Some("0"));
        let _g2 = set_env_guard(HTTP_TIMEOUT_ENV, None);

        assert_eq!(
            EnvConfig::from_env().expect_err("zero"),
            ConfigError::InvalidPositiveInteger {
                key: CHANNEL_TIMEOUT_ENV,
                value: "0".to_string(),
            }
        );

        let _g3 = set_env_guard(CHANNEL_TIMEOUT_ENV, None);
        let _g4 = set_env_guard(HTTP_TIMEOUT_ENV, Some("soon"));
        assert!(EnvConfig::from_env().is_err());
    }

    #[test]
    fn empty_cache_dir_is_ignored() {
        let _lock = env_lock();
        let _g1 = set_env_guard(CACHE_DIR_ENV, Some("   "));
        let _g2 = set_env_guard(CHANNEL_TIMEOUT_ENV, None);
        let _g3 = set_env_guard(HTTP_TIMEOUT_ENV, None);
        assert!(EnvConfig::from_env().expect("config").cache_dir.is_none());
    }
}
