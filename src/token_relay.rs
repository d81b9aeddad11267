//! Keeps the identity credential fresh and propagated.
//!
//! The relay is the only writer of the credential copy, the remember-session
//! flag and the per-account rules flags.

use std::sync::Arc;
use std::time::Duration;

use agent_channel::{ActionChannel, ChannelMessage};
use cache_store::{
    format_rfc3339, now_rfc3339, rules_accepted_key, CacheStoreError, CredentialRecord, KeyOwner,
    ScopedStore, CREDENTIAL_KEY, REMEMBER_SESSION_KEY,
};
use time::OffsetDateTime;

use crate::credential::{Credential, CredentialSource, CredentialSourceError};
use crate::dispatch::send_with_timeout;
use crate::error::OrchestratorError;
use crate::session::SessionContext;

pub struct TokenRelay {
    session: Arc<SessionContext>,
    source: Arc<dyn CredentialSource>,
    channel: Arc<dyn ActionChannel>,
    store: ScopedStore,
    send_timeout: Duration,
    remember_session_default: bool,
}

impl TokenRelay {
    pub fn new(
        session: Arc<SessionContext>,
        source: Arc<dyn CredentialSource>,
        channel: Arc<dyn ActionChannel>,
        send_timeout: Duration,
    ) -> Self {
        let store = session.scoped_store(KeyOwner::TokenRelay);
        Self {
            session,
            source,
            channel,
            store,
            send_timeout,
            remember_session_default: false,
        }
    }

    /// Value reported by [`Self::remember_session`] until the flag is stored.
    #[must_use]
    pub fn with_remember_session_default(mut self, remember: bool) -> Self {
        self.remember_session_default = remember;
        self
    }

    /// Obtains a usable credential from the identity provider.
    ///
    /// An expired credential is never returned: if the provider hands one
    /// back, a forced refresh is attempted once.
    pub async fn ensure_fresh_credential(
        &self,
        force_refresh: bool,
    ) -> Result<Credential, OrchestratorError> {
        if self.source.current_principal().is_none() {
            return Err(OrchestratorError::CredentialUnavailable(
                CredentialSourceError::NotSignedIn.to_string(),
            ));
        }

        let credential = self.fetch(force_refresh).await?;
        if !credential.is_expired_at(OffsetDateTime::now_utc()) {
            return Ok(credential);
        }

        if force_refresh {
            return Err(OrchestratorError::CredentialUnavailable(
                "identity provider returned an expired credential".to_string(),
            ));
        }

        tracing::debug!(
            credential = %credential.fingerprint(),
            "provider returned an expired credential; forcing refresh"
        );
        let refreshed = self.fetch(true).await?;
        if refreshed.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(OrchestratorError::CredentialUnavailable(
                "identity provider returned an expired credential".to_string(),
            ));
        }
        Ok(refreshed)
    }

    async fn fetch(&self, force_refresh: bool) -> Result<Credential, OrchestratorError> {
        self.source
            .get_credential(force_refresh)
            .await
            .map_err(|error| OrchestratorError::CredentialUnavailable(error.to_string()))
    }

    /// Runs on every transition to ready: force-refresh, persist the copy,
    /// then push it to the agent. Only the refresh can fail; persistence and
    /// propagation failures are logged.
    ///
    /// `epoch` is the sign-in attempt's epoch. If the session signs out or
    /// starts another sign-in while the refresh is pending, nothing is
    /// persisted or sent and [`OrchestratorError::SessionChanged`] is
    /// returned.
    pub async fn on_session_ready(&self, epoch: u64) -> Result<Credential, OrchestratorError> {
        let credential = match self.ensure_fresh_credential(true).await {
            Ok(credential) => credential,
            Err(_) if self.session.epoch() != epoch => {
                return Err(OrchestratorError::SessionChanged)
            }
            Err(error) => return Err(error),
        };

        match self.session.run_if_current(epoch, || self.persist(&credential)) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::warn!(error = %error, "failed to persist credential copy"),
            Err(error) => {
                tracing::debug!(
                    credential = %credential.fingerprint(),
                    "sign-in superseded before the credential arrived; dropping it"
                );
                return Err(error);
            }
        }

        let message = ChannelMessage::SaveCredential {
            token: credential.token().to_string(),
        };
        match send_with_timeout(self.channel.as_ref(), &message, self.send_timeout).await {
            Ok(_) => tracing::debug!(
                credential = %credential.fingerprint(),
                "credential propagated to agent"
            ),
            Err(error) => tracing::warn!(
                credential = %credential.fingerprint(),
                error = %error,
                "credential propagation to agent failed"
            ),
        }

        Ok(credential)
    }

    /// Clears the persisted credential copy. Must run before any other
    /// sign-out work.
    pub fn on_sign_out(&self) {
        if let Err(error) = self.store.remove(CREDENTIAL_KEY) {
            tracing::error!(error = %error, "failed to clear persisted credential");
        }
    }

    fn persist(&self, credential: &Credential) -> Result<(), CacheStoreError> {
        let record = CredentialRecord {
            token: credential.token().to_string(),
            stored_at: now_rfc3339()?,
            expires_at: credential.expires_at().map(format_rfc3339).transpose()?,
        };
        self.store
            .set(CREDENTIAL_KEY, &record.encode(CREDENTIAL_KEY)?)
    }

    /// The persisted credential copy, if present, well-formed and unexpired.
    /// Expired or corrupt copies are removed.
    #[must_use]
    pub fn cached_credential(&self) -> Option<Credential> {
        let raw = self.store.get(CREDENTIAL_KEY).ok().flatten()?;
        let record = match CredentialRecord::decode(CREDENTIAL_KEY, &raw) {
            Ok(record) => record,
            Err(error) => {
                tracing::debug!(error = %error, "discarding unreadable credential copy");
                let _ = self.store.remove(CREDENTIAL_KEY);
                return None;
            }
        };

        if record.is_expired_at(OffsetDateTime::now_utc()) {
            let _ = self.store.remove(CREDENTIAL_KEY);
            return None;
        }

        Some(match record.expires_at.as_deref().and_then(cache_store::parse_rfc3339) {
            Some(expires_at) => Credential::with_expiry(record.token, expires_at),
            None => Credential::new(record.token),
        })
    }

    #[must_use]
    pub fn remember_session(&self) -> bool {
        match self.store.get(REMEMBER_SESSION_KEY) {
            Ok(Some(value)) => value.trim() == "true",
            Ok(None) => self.remember_session_default,
            Err(error) => {
                tracing::debug!(error = %error, "remember-session flag unreadable");
                self.remember_session_default
            }
        }
    }

    pub fn set_remember_session(&self, remember: bool) -> Result<(), OrchestratorError> {
        self.store
            .set(REMEMBER_SESSION_KEY, if remember { "true" } else { "false" })?;
        Ok(())
    }

    #[must_use]
    pub fn rules_accepted(&self, account: &str) -> bool {
        matches!(
            self.store.get(&rules_accepted_key(account)),
            Ok(Some(value)) if value.trim() == "true"
        )
    }

    pub fn accept_rules(&self, account: &str) -> Result<(), OrchestratorError> {
        self.store.set(&rules_accepted_key(account), "true")?;
        Ok(())
    }
}
