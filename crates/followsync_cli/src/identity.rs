use async_trait::async_trait;
use followsync::{Credential, CredentialSource, CredentialSourceError, Principal};

pub const TOKEN_ENV: &str = "FOLLOWSYNC_TOKEN";
pub const ACCOUNT_ENV: &str = "FOLLOWSYNC_ACCOUNT";
pub const DEFAULT_ACCOUNT: &str = "local";

/// Credential source backed by a token supplied in the environment. It
/// cannot refresh; an expired token is reported as a refresh failure.
pub struct StaticCredentialSource {
    principal: Option<Principal>,
    token: Option<String>,
}

impl StaticCredentialSource {
    pub fn new(account: impl Into<String>, token: Option<String>) -> Self {
        Self {
            principal: token.as_ref().map(|_| Principal::new(account)),
            token,
        }
    }

    pub fn from_env() -> Self {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let account = std::env::var(ACCOUNT_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string());
        Self::new(account, token)
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn get_credential(
        &self,
        _force_refresh: bool,
    ) -> Result<Credential, CredentialSourceError> {
        match &self.token {
            Some(token) => Ok(Credential::new(token.clone())),
            None => Err(CredentialSourceError::NotSignedIn),
        }
    }

    fn current_principal(&self) -> Option<Principal> {
        self.principal.clone()
    }
}
