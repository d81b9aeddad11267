use crate::error::DashboardApiError;

/// Local development backend.
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";

pub const DASHBOARD_DATA_PATH: &str = "dashboard-data";
pub const NON_FOLLOWERS_PATH: &str = "non-followers";
pub const COMPARE_PATH: &str = "non-followers/compare";
pub const UPDATE_LIST_PATH: &str = "non-followers/update-list";
pub const FOLLOW_STATS_PATH: &str = "follow-stats";
pub const CHECK_DATA_PATH: &str = "check-data";
pub const BOT_STATUS_PATH: &str = "check-bot-status";

/// Normalize a configured base URL.
///
/// Blank input falls back to [`DEFAULT_API_BASE_URL`]; trailing slashes are
/// dropped; anything other than an absolute http(s) URL is rejected.
pub fn normalize_base_url(input: &str) -> Result<String, DashboardApiError> {
    let base = if input.trim().is_empty() {
        DEFAULT_API_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    let host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| DashboardApiError::InvalidBaseUrl(base.to_string()))?;
    if host.is_empty() || host.starts_with('/') {
        return Err(DashboardApiError::InvalidBaseUrl(base.to_string()));
    }

    Ok(trimmed.to_string())
}

/// Join an endpoint path onto a base URL. Trailing slashes in `path` are
/// significant to the backend router and are kept.
pub fn join_endpoint(base_url: &str, path: &str) -> Result<String, DashboardApiError> {
    let base = normalize_base_url(base_url)?;
    Ok(format!("{base}/{}", path.trim_start_matches('/')))
}
