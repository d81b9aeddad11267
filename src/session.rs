use std::fmt;
use std::sync::{Arc, Mutex};

use cache_store::{KeyOwner, KeyValueStore, ScopedStore};

use crate::credential::Principal;
use crate::error::OrchestratorError;
use crate::lock_unpoisoned;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => f.write_str("unauthenticated"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Ready => f.write_str("ready"),
        }
    }
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    principal: Option<Principal>,
    epoch: u64,
}

/// Handle for one sign-in attempt, returned by
/// [`SessionContext::begin_authentication`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignInAttempt {
    pub epoch: u64,
    resumes_ready: bool,
}

impl SignInAttempt {
    /// True when the attempt re-authenticates the principal of a session
    /// that was already ready.
    #[must_use]
    pub fn resumes_ready(&self) -> bool {
        self.resumes_ready
    }
}

/// Session state shared by every component, plus the durable store they
/// reach through their own [`ScopedStore`] partition.
pub struct SessionContext {
    inner: Mutex<SessionInner>,
    store: Arc<dyn KeyValueStore>,
}

impl SessionContext {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                state: SessionState::Unauthenticated,
                principal: None,
                epoch: 0,
            }),
            store,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        lock_unpoisoned(&self.inner).state
    }

    #[must_use]
    pub fn principal(&self) -> Option<Principal> {
        lock_unpoisoned(&self.inner).principal.clone()
    }

    /// Bumped on every sign-in attempt and every sign-out. Work that
    /// captured an older epoch must not write anything.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        lock_unpoisoned(&self.inner).epoch
    }

    pub fn begin_authentication(&self, principal: Principal) -> SignInAttempt {
        let mut inner = lock_unpoisoned(&self.inner);
        let resumes_ready = inner.state == SessionState::Ready
            && inner
                .principal
                .as_ref()
                .is_some_and(|current| current.uid == principal.uid);
        inner.epoch += 1;
        inner.state = SessionState::Authenticating;
        inner.principal = Some(principal);
        SignInAttempt {
            epoch: inner.epoch,
            resumes_ready,
        }
    }

    /// Moves an authenticating session to ready. Returns false when the
    /// session was signed out or re-authenticated since `epoch`.
    pub fn mark_ready(&self, epoch: u64) -> bool {
        let mut inner = lock_unpoisoned(&self.inner);
        if inner.epoch != epoch || inner.principal.is_none() {
            return false;
        }
        inner.state = SessionState::Ready;
        true
    }

    /// Puts a failed re-authentication back to ready. Only applies to
    /// attempts that resumed a ready session and are still current.
    pub fn restore_ready(&self, attempt: &SignInAttempt) -> bool {
        attempt.resumes_ready && self.mark_ready(attempt.epoch)
    }

    pub fn sign_out(&self) {
        self.sign_out_with(|| {});
    }

    /// Runs `clear` and resets the session under one lock, so no write
    /// guarded by [`Self::run_if_current`] lands in between.
    pub fn sign_out_with(&self, clear: impl FnOnce()) {
        let mut inner = lock_unpoisoned(&self.inner);
        clear();
        inner.epoch += 1;
        inner.state = SessionState::Unauthenticated;
        inner.principal = None;
    }

    /// Runs `action` while `epoch` is still current, holding the session
    /// lock. `action` must not call back into the session.
    pub fn run_if_current<T>(
        &self,
        epoch: u64,
        action: impl FnOnce() -> T,
    ) -> Result<T, OrchestratorError> {
        let inner = lock_unpoisoned(&self.inner);
        if inner.epoch != epoch {
            return Err(OrchestratorError::SessionChanged);
        }
        Ok(action())
    }

    /// Gate for every backend call and channel send.
    pub fn require_ready(&self) -> Result<Principal, OrchestratorError> {
        let inner = lock_unpoisoned(&self.inner);
        match (&inner.state, &inner.principal) {
            (SessionState::Ready, Some(principal)) => Ok(principal.clone()),
            (state, _) => Err(OrchestratorError::SessionNotReady { state: *state }),
        }
    }

    /// Like [`Self::require_ready`], returning the epoch to guard later
    /// writes with.
    pub fn ready_epoch(&self) -> Result<u64, OrchestratorError> {
        let inner = lock_unpoisoned(&self.inner);
        match (&inner.state, &inner.principal) {
            (SessionState::Ready, Some(_)) => Ok(inner.epoch),
            (state, _) => Err(OrchestratorError::SessionNotReady { state: *state }),
        }
    }

    pub(crate) fn scoped_store(&self, owner: KeyOwner) -> ScopedStore {
        ScopedStore::new(Arc::clone(&self.store), owner)
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
