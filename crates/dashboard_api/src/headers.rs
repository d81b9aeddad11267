use std::collections::BTreeMap;

use crate::config::DashboardApiConfig;
use crate::error::DashboardApiError;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_USER_AGENT: &str = "user-agent";

/// Build a deterministic header map for one backend request.
pub fn build_headers(
    config: &DashboardApiConfig,
    credential: &str,
) -> Result<BTreeMap<String, String>, DashboardApiError> {
    let credential = credential.trim();
    if credential.is_empty() {
        return Err(DashboardApiError::MissingCredential);
    }

    let mut headers = BTreeMap::new();
    headers.insert(
        HEADER_AUTHORIZATION.to_owned(),
        format!("Bearer {credential}"),
    );
    headers.insert(HEADER_ACCEPT.to_owned(), "application/json".to_owned());
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );

    let user_agent = config
        .user_agent
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(default_user_agent);
    headers.insert(HEADER_USER_AGENT.to_owned(), user_agent);

    for (key, value) in &config.extra_headers {
        let key = key.trim().to_ascii_lowercase();
        if key == HEADER_AUTHORIZATION {
            continue;
        }
        headers.insert(key, value.trim().to_owned());
    }

    Ok(headers)
}

fn default_user_agent() -> String {
    format!(
        "followsync/{} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_is_trimmed_and_required() {
        let config = DashboardApiConfig::default();
        let headers = build_headers(&config, "  tok  ").expect("headers");
        assert_eq!(headers[HEADER_AUTHORIZATION], "Bearer tok");

        assert!(matches!(
            build_headers(&config, "   "),
            Err(DashboardApiError::MissingCredential)
        ));
    }

    #[test]
    fn extra_headers_cannot_override_authorization() {
        let config = DashboardApiConfig::default()
            .insert_header("Authorization", "Bearer other")
            .insert_header("X-Trace", " abc ")
            .with_user_agent("custom");
        let headers = build_headers(&config, "tok").expect("headers");

        assert_eq!(headers[HEADER_AUTHORIZATION], "Bearer tok");
        assert_eq!(headers["x-trace"], "abc");
        assert_eq!(headers[HEADER_USER_AGENT], "custom");
    }
}
