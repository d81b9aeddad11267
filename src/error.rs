use agent_channel::ChannelError;
use cache_store::CacheStoreError;
use dashboard_api::DashboardApiError;
use thiserror::Error;

use crate::session::SessionState;

/// Failures surfaced by the orchestrator and its components.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(String),

    #[error("session is {state}; backend and agent calls require a ready session")]
    SessionNotReady { state: SessionState },

    #[error("session ended while the request was in flight; result discarded")]
    SessionChanged,

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("backend rejected the credential: {0}")]
    Unauthorized(#[source] DashboardApiError),

    #[error("backend request failed: {0}")]
    Backend(#[source] DashboardApiError),

    #[error("local cache failed: {0}")]
    Cache(#[from] CacheStoreError),

    #[error("the non-follower list is empty; nothing to unfollow")]
    EmptyUnfollowList,
}

impl OrchestratorError {
    /// True when prior state is intact and the user can simply retry.
    /// Credential problems are not recoverable in place; they route through
    /// the sign-out policy.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::CredentialUnavailable(_) | Self::Unauthorized(_)
        )
    }

    #[must_use]
    pub fn is_credential_problem(&self) -> bool {
        !self.is_recoverable()
    }
}

impl From<DashboardApiError> for OrchestratorError {
    fn from(error: DashboardApiError) -> Self {
        if error.is_unauthorized() {
            Self::Unauthorized(error)
        } else {
            Self::Backend(error)
        }
    }
}
