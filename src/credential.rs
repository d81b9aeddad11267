//! Identity credential handling.
//!
//! Credentials are short-lived bearer tokens. The expiry is read from the JWT
//! `exp` claim when the token carries one.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;

/// Signed-in account as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub uid: String,
    pub email: Option<String>,
}

impl Principal {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Identity transitions delivered to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Principal),
    SignedOut,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: Option<OffsetDateTime>,
}

impl Credential {
    /// Wraps a raw token, decoding its expiry when it is a JWT.
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let expires_at = decode_jwt_expiry(&token);
        Self { token, expires_at }
    }

    pub fn with_expiry(token: impl Into<String>, expires_at: OffsetDateTime) -> Self {
        Self {
            token: token.into(),
            expires_at: Some(expires_at),
        }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
    }

    /// Tokens without a known expiry are treated as valid.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Short stable identifier for log correlation. Never reversible to the token.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.token.hash(&mut hasher);
        format!("{:08x}", hasher.finish() >> 32)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("fingerprint", &self.fingerprint())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialSourceError {
    #[error("no principal is signed in")]
    NotSignedIn,
    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),
}

/// Identity provider that issues and refreshes credentials.
#[async_trait]
pub trait CredentialSource: Send + Sync + 'static {
    /// Returns a credential, bypassing any provider-side cache when
    /// `force_refresh` is set.
    async fn get_credential(&self, force_refresh: bool)
        -> Result<Credential, CredentialSourceError>;

    fn current_principal(&self) -> Option<Principal>;
}

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    #[serde(default)]
    exp: Option<i64>,
}

/// Reads the `exp` claim of a compact JWT. Returns `None` for anything that
/// is not a three-segment token with a numeric `exp`.
#[must_use]
pub fn decode_jwt_expiry(token: &str) -> Option<OffsetDateTime> {
    let mut parts = token.trim().split('.');
    let _header = parts.next()?;
    let payload_segment = parts.next()?;
    let _signature = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let decoded = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_segment)
        .or_else(|_| general_purpose::URL_SAFE.decode(payload_segment))
        .ok()?;
    let claims = serde_json::from_slice::<ExpiryClaims>(&decoded).ok()?;
    OffsetDateTime::from_unix_timestamp(claims.exp?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_with_payload(payload: &str) -> String {
        let header = general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(payload);
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn expiry_is_decoded_from_exp_claim() {
        let token = jwt_with_payload(r#"{"sub":"u1","exp":1900000000}"#);
        let credential = Credential::new(token);
        assert_eq!(
            credential.expires_at().map(OffsetDateTime::unix_timestamp),
            Some(1_900_000_000)
        );
        assert!(!credential.is_expired_at(
            OffsetDateTime::from_unix_timestamp(1_800_000_000).expect("ts")
        ));
        assert!(credential.is_expired_at(
            OffsetDateTime::from_unix_timestamp(1_900_000_000).expect("ts")
        ));
    }

    #[test]
    fn opaque_tokens_have_no_expiry() {
        assert_eq!(decode_jwt_expiry("opaque-token"), None);
        assert_eq!(decode_jwt_expiry("a.b.c.d"), None);
        assert_eq!(decode_jwt_expiry(&jwt_with_payload(r#"{"sub":"x"}"#)), None);
        assert!(!Credential::new("opaque").is_expired_at(OffsetDateTime::now_utc()));
    }

    #[test]
    fn debug_output_never_contains_the_token() {
        let credential = Credential::new("super-secret-token");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("super-secret-token"));
        assert!(rendered.contains(&credential.fingerprint()));
        assert_eq!(credential.fingerprint().len(), 8);
    }
}
