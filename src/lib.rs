//! Session and action orchestrator for an external follow-graph automation
//! agent.
//!
//! The orchestrator never performs follow-graph actions itself. It keeps the
//! identity credential fresh and propagated to the agent, encodes exactly one
//! well-formed action request at a time, tracks the agent's out-of-band run
//! status, and maintains a locally cached view of the derived dashboard data.
//!
//! # Environment
//! - `FOLLOWSYNC_API_BASE_URL`: backend base URL (default `http://127.0.0.1:8000`).
//! - `FOLLOWSYNC_CACHE_DIR`: durable cache directory; in-memory when unset.
//! - `FOLLOWSYNC_CHANNEL_TIMEOUT_MS`: per-message agent acknowledgement window.
//! - `FOLLOWSYNC_HTTP_TIMEOUT_SEC`: backend request timeout.
//! - `FOLLOWSYNC_REMEMBER_SESSION=1`: keep a stale session when refresh fails.
//! - `FOLLOWSYNC_LOG`: tracing filter, falling back to `RUST_LOG`.

use std::sync::{Mutex, MutexGuard};

pub mod config;
pub mod credential;
pub mod dashboard;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod notices;
pub mod orchestrator;
pub mod run_state;
pub mod run_status;
pub mod selector;
pub mod session;
pub mod token_relay;

pub use config::{ConfigError, EnvConfig};
pub use credential::{AuthEvent, Credential, CredentialSource, CredentialSourceError, Principal};
pub use dashboard::{DashboardManager, DashboardSnapshot, ListVerdict, Regeneration};
pub use dispatch::ActionDescriptor;
pub use error::OrchestratorError;
pub use notices::{Notice, NoticeLevel};
pub use orchestrator::{Collaborators, Orchestrator, OrchestratorSettings, SelectOutcome};
pub use run_state::{AgentStatus, RunState};
pub use run_status::StatusEffect;
pub use session::{SessionContext, SessionState, SignInAttempt};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
