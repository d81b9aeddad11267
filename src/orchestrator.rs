//! Facade that wires the components together for presentation code.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_channel::{ActionChannel, ChannelMessage, InboundHub, Operation, RunStatusUpdate};
use cache_store::KeyValueStore;
use dashboard_api::{normalize_base_url, BotStatusReport, DashboardBackend, FollowStats};

use crate::config::EnvConfig;
use crate::credential::{AuthEvent, CredentialSource};
use crate::dashboard::{DashboardManager, DashboardSnapshot, ListVerdict, Regeneration};
use crate::dispatch::{dispatch, send_with_timeout, ActionDescriptor};
use crate::error::OrchestratorError;
use crate::lock_unpoisoned;
use crate::notices::{Notice, NoticeBoard, NoticeLevel};
use crate::run_state::{RunBoard, RunState};
use crate::run_status::{RunStatusListener, StatusEffect};
use crate::selector::{ActionSelector, Selection};
use crate::session::{SessionContext, SessionState, SignInAttempt};
use crate::token_relay::TokenRelay;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub api_base_url: String,
    pub channel_timeout: Duration,
    pub remember_session: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_env_config(&EnvConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_env_config(config: &EnvConfig) -> Self {
        Self {
            api_base_url: config.api_base_url.clone(),
            channel_timeout: config.channel_timeout,
            remember_session: config.remember_session,
        }
    }
}

/// External collaborators the orchestrator is built from.
pub struct Collaborators {
    pub credentials: Arc<dyn CredentialSource>,
    pub channel: Arc<dyn ActionChannel>,
    pub backend: Arc<dyn DashboardBackend>,
    pub store: Arc<dyn KeyValueStore>,
    pub hub: InboundHub,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    Busy,
    Disarmed(Operation),
    Dispatched {
        operation: Operation,
        replaced: Option<Operation>,
    },
}

pub struct Orchestrator {
    settings: OrchestratorSettings,
    session: Arc<SessionContext>,
    relay: Arc<TokenRelay>,
    dashboard: DashboardManager,
    selector: ActionSelector,
    listener: RunStatusListener,
    board: Arc<Mutex<RunBoard>>,
    channel: Arc<dyn ActionChannel>,
    notices: NoticeBoard,
    everyone_follows_back: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        collaborators: Collaborators,
    ) -> Result<Self, OrchestratorError> {
        let api_base_url = normalize_base_url(&settings.api_base_url)?;
        let settings = OrchestratorSettings {
            api_base_url,
            ..settings
        };

        let session = Arc::new(SessionContext::new(collaborators.store));
        let relay = Arc::new(
            TokenRelay::new(
                Arc::clone(&session),
                collaborators.credentials,
                Arc::clone(&collaborators.channel),
                settings.channel_timeout,
            )
            .with_remember_session_default(settings.remember_session),
        );
        let dashboard = DashboardManager::new(
            Arc::clone(&session),
            Arc::clone(&relay),
            collaborators.backend,
        );
        let board = Arc::new(Mutex::new(RunBoard::new()));
        let selector = ActionSelector::new(Arc::clone(&board));
        let listener = RunStatusListener::new(
            collaborators.hub,
            Arc::clone(&collaborators.channel),
            Arc::clone(&board),
            settings.channel_timeout,
        );

        Ok(Self {
            settings,
            session,
            relay,
            dashboard,
            selector,
            listener,
            board,
            channel: collaborators.channel,
            notices: NoticeBoard::default(),
            everyone_follows_back: AtomicBool::new(false),
        })
    }

    pub async fn on_auth_event(&self, event: AuthEvent) -> Result<SessionState, OrchestratorError> {
        match event {
            AuthEvent::SignedIn(principal) => {
                tracing::info!(uid = %principal.uid, "signed in; authenticating");
                let attempt = self.session.begin_authentication(principal);
                match self.relay.on_session_ready(attempt.epoch).await {
                    Ok(credential) => {
                        if self.session.mark_ready(attempt.epoch) {
                            tracing::info!(
                                credential = %credential.fingerprint(),
                                "session ready"
                            );
                        }
                        Ok(self.session.state())
                    }
                    Err(OrchestratorError::SessionChanged) => Ok(self.session.state()),
                    Err(error) => Err(self.sign_in_failed(&attempt, error)),
                }
            }
            AuthEvent::SignedOut => {
                self.sign_out_locally();
                Ok(SessionState::Unauthenticated)
            }
        }
    }

    /// Starts listening for agent pushes and shows cached data, fetching
    /// once when nothing is cached.
    pub async fn mount(&self) -> Option<DashboardSnapshot> {
        self.listener.mount().await;

        let cached = self.dashboard.load_from_cache();
        if cached.is_some() || self.session.state() != SessionState::Ready {
            return cached;
        }
        self.refresh(false).await.ok()
    }

    pub fn unmount(&self) -> bool {
        self.listener.unmount()
    }

    /// Arms `operation` and dispatches it to the agent, toggles it off when
    /// already armed, or does nothing while the agent runs.
    pub async fn select_action(
        &self,
        operation: Operation,
    ) -> Result<SelectOutcome, OrchestratorError> {
        if let Err(error) = self.session.require_ready() {
            return Err(self.surface(error));
        }

        match self
            .selector
            .select(operation, |operation| self.dispatch_operation(operation))
        {
            Selection::Busy => {
                self.notices.push(
                    NoticeLevel::Info,
                    "The automation agent is busy. Wait for the current run to finish.",
                );
                Ok(SelectOutcome::Busy)
            }
            Selection::Disarmed(operation) => {
                self.clear_agent_selection().await;
                Ok(SelectOutcome::Disarmed(operation))
            }
            Selection::Armed {
                operation,
                replaced,
                triggered,
            } => match triggered.await {
                Ok(()) => Ok(SelectOutcome::Dispatched {
                    operation,
                    replaced,
                }),
                Err(error) => {
                    self.selector.disarm_if(operation);
                    Err(self.surface(error))
                }
            },
        }
    }

    async fn dispatch_operation(&self, operation: Operation) -> Result<(), OrchestratorError> {
        let epoch = self.session.ready_epoch()?;
        let result = self.dispatch_in(epoch, operation).await;
        match result {
            Err(_) if self.session.epoch() != epoch => Err(OrchestratorError::SessionChanged),
            other => other,
        }
    }

    async fn dispatch_in(&self, epoch: u64, operation: Operation) -> Result<(), OrchestratorError> {
        let payload = if operation.carries_payload() {
            Some(self.dashboard.submit_exclusions().await?)
        } else {
            None
        };

        let credential = self.relay.ensure_fresh_credential(false).await?;
        let mut descriptor =
            ActionDescriptor::new(operation, &self.settings.api_base_url, credential)?;
        if let Some(usernames) = payload {
            descriptor = descriptor.with_payload(usernames);
        }

        self.session.run_if_current(epoch, || ())?;
        dispatch(
            self.channel.as_ref(),
            &descriptor,
            self.settings.channel_timeout,
        )
        .await?;
        Ok(())
    }

    async fn clear_agent_selection(&self) {
        let message = ChannelMessage::ClearSelectedAction {};
        if let Err(error) =
            send_with_timeout(self.channel.as_ref(), &message, self.settings.channel_timeout).await
        {
            tracing::warn!(error = %error, "failed to clear agent selection");
        }
    }

    /// Drains queued agent pushes and applies them in arrival order. Returns
    /// the number of updates applied.
    pub async fn flush_pending_status_updates(&self) -> usize {
        let updates = self.listener.drain_pending();
        let drained = updates.len();
        for update in updates {
            self.handle_status_update(update).await;
        }
        drained
    }

    /// Applies one agent push. A finished run always triggers one forced
    /// refresh; an error is surfaced as a notice.
    pub async fn handle_status_update(&self, update: RunStatusUpdate) -> StatusEffect {
        let effect = self.listener.apply(&update);
        match &effect {
            StatusEffect::RefreshRequested(_) => {
                // Failures already reach the user as notices.
                let _ = self.refresh(true).await;
            }
            StatusEffect::SurfaceError(reason) => {
                self.notices.push(
                    NoticeLevel::Error,
                    format!("The automation agent reported an error: {reason}"),
                );
            }
            StatusEffect::None => {}
        }
        effect
    }

    pub async fn refresh(&self, force: bool) -> Result<DashboardSnapshot, OrchestratorError> {
        match self.dashboard.refresh(force).await {
            Ok(snapshot) => {
                if force {
                    self.note_verdict(snapshot.verdict());
                }
                Ok(snapshot)
            }
            Err(error) => Err(self.surface(error)),
        }
    }

    /// Manual "check data" action: always goes to the backend.
    pub async fn check_data(&self) -> Result<DashboardSnapshot, OrchestratorError> {
        self.refresh(true).await
    }

    pub fn exclude_user(&self, id: &str) -> Result<Option<DashboardSnapshot>, OrchestratorError> {
        self.dashboard
            .exclude_user(id)
            .map_err(|error| self.surface(error))
    }

    pub async fn regenerate_non_followers(&self) -> Result<Regeneration, OrchestratorError> {
        let regeneration = self
            .dashboard
            .regenerate_non_followers()
            .await
            .map_err(|error| self.surface(error))?;

        self.note_verdict(regeneration.verdict);
        if regeneration.verdict == ListVerdict::NoScanYet {
            self.notices.push(
                NoticeLevel::Info,
                "No scan has been performed yet. Run a follower scan first.",
            );
        }
        Ok(regeneration)
    }

    pub async fn check_new_data(&self) -> Result<bool, OrchestratorError> {
        self.dashboard
            .check_new_data()
            .await
            .map_err(|error| self.surface(error))
    }

    pub async fn follow_stats(&self) -> Result<FollowStats, OrchestratorError> {
        self.dashboard
            .follow_stats()
            .await
            .map_err(|error| self.surface(error))
    }

    pub async fn bot_status(&self) -> Result<BotStatusReport, OrchestratorError> {
        self.dashboard
            .bot_status()
            .await
            .map_err(|error| self.surface(error))
    }

    #[must_use]
    pub fn everyone_follows_back_pending(&self) -> bool {
        self.everyone_follows_back.load(Ordering::Acquire)
    }

    /// Dismisses the "everyone follows back" prompt. Returns whether one was
    /// pending.
    pub fn acknowledge_everyone_follows_back(&self) -> bool {
        self.everyone_follows_back.swap(false, Ordering::AcqRel)
    }

    #[must_use]
    pub fn run_state(&self) -> RunState {
        lock_unpoisoned(&self.board).view()
    }

    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<DashboardSnapshot> {
        self.dashboard.load_from_cache()
    }

    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.snapshot()
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        self.notices.take()
    }

    pub fn dismiss_notice(&self, index: usize) -> bool {
        self.notices.dismiss(index)
    }

    /// Whether the signed-in account has accepted the usage rules.
    #[must_use]
    pub fn rules_accepted(&self) -> bool {
        self.session
            .principal()
            .is_some_and(|principal| self.relay.rules_accepted(&principal.uid))
    }

    pub fn accept_rules(&self) -> Result<(), OrchestratorError> {
        let principal = self.session.require_ready()?;
        self.relay.accept_rules(&principal.uid)
    }

    #[must_use]
    pub fn remember_session(&self) -> bool {
        self.relay.remember_session()
    }

    pub fn set_remember_session(&self, remember: bool) -> Result<(), OrchestratorError> {
        self.relay.set_remember_session(remember)
    }

    fn note_verdict(&self, verdict: ListVerdict) {
        self.everyone_follows_back.store(
            verdict == ListVerdict::EveryoneFollowsBack,
            Ordering::Release,
        );
    }

    fn sign_out_locally(&self) {
        self.session.sign_out_with(|| {
            self.relay.on_sign_out();
            self.dashboard.clear();
        });
        lock_unpoisoned(&self.board).reset();
        self.everyone_follows_back.store(false, Ordering::Release);
        tracing::info!("signed out; local session state cleared");
    }

    /// Sign-in refresh failed. With remember-session set, a re-authenticated
    /// ready session goes back to ready; a first sign-in stays pending.
    /// Without it, the session is signed out.
    fn sign_in_failed(&self, attempt: &SignInAttempt, error: OrchestratorError) -> OrchestratorError {
        if !error.is_credential_problem() {
            return self.surface(error);
        }

        if !self.relay.remember_session() {
            self.sign_out_locally();
            self.notices.push(
                NoticeLevel::Error,
                "Sign-in could not be completed. Please sign in again.",
            );
        } else if self.session.restore_ready(attempt) {
            tracing::warn!(error = %error, "re-authentication failed; keeping the saved session");
            self.notices.push(
                NoticeLevel::Warning,
                "Could not refresh your sign-in. Continuing with the saved session.",
            );
        } else {
            tracing::warn!(error = %error, "sign-in refresh failed");
            self.notices.push(
                NoticeLevel::Warning,
                "Could not complete sign-in. Please try again.",
            );
        }
        error
    }

    /// Routes a user-facing failure to its notice and, for credential
    /// problems, to the sign-out policy. Returns the error unchanged.
    fn surface(&self, error: OrchestratorError) -> OrchestratorError {
        match &error {
            OrchestratorError::CredentialUnavailable(_) | OrchestratorError::Unauthorized(_) => {
                if self.relay.remember_session() {
                    self.notices.push(
                        NoticeLevel::Warning,
                        "Could not refresh your sign-in. Continuing with the saved session.",
                    );
                } else {
                    self.sign_out_locally();
                    self.notices.push(
                        NoticeLevel::Error,
                        "Your session has expired. Please sign in again.",
                    );
                }
            }
            OrchestratorError::SessionChanged => {
                tracing::debug!("dropped a result from an ended session");
            }
            OrchestratorError::SessionNotReady { .. } => {
                self.notices
                    .push(NoticeLevel::Info, "Sign in to continue.");
            }
            OrchestratorError::Channel(cause) => {
                self.notices.push(
                    NoticeLevel::Error,
                    format!("Could not configure the automation agent ({cause}). Please try again."),
                );
            }
            OrchestratorError::Backend(cause) => {
                self.notices.push(
                    NoticeLevel::Warning,
                    format!("Could not reach the server ({cause}). Showing saved data; try again."),
                );
            }
            OrchestratorError::Cache(cause) => {
                self.notices.push(
                    NoticeLevel::Error,
                    format!("Could not update local data: {cause}"),
                );
            }
            OrchestratorError::EmptyUnfollowList => {
                self.notices
                    .push(NoticeLevel::Info, "There is nobody left to unfollow.");
            }
        }
        error
    }
}
