use std::collections::BTreeMap;
use std::time::Duration;

use crate::url::DEFAULT_API_BASE_URL;

/// Transport configuration for backend requests.
#[derive(Debug, Clone)]
pub struct DashboardApiConfig {
    /// Base URL every endpoint path is joined to.
    pub base_url: String,
    /// Replaces the default `followsync/<version>` user agent.
    pub user_agent: Option<String>,
    /// Extra headers sent with every request. Cannot override `authorization`.
    pub extra_headers: BTreeMap<String, String>,
    /// Per-request timeout. `None` keeps the reqwest default.
    pub timeout: Option<Duration>,
    /// Retry budget for idempotent requests. Zero disables retries.
    pub max_retries: u32,
}

impl Default for DashboardApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
            max_retries: crate::retry::MAX_RETRIES,
        }
    }
}

impl DashboardApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }
}
