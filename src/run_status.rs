//! Agent run status listener.
//!
//! Pushes are the primary signal. Mounting performs one reconciliation read
//! of the agent's persisted run flag to cover runs that started before this
//! listener existed; there is no polling.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_channel::{
    ActionChannel, InboundHub, ListenerKey, Operation, RunOutcome, RunStatus, RunStatusUpdate,
    Subscription,
};
use tokio::sync::mpsc::error::TryRecvError;

use crate::lock_unpoisoned;
use crate::run_state::{AgentStatus, RunBoard};

pub const RUN_STATUS_LISTENER: ListenerKey = ListenerKey::new("run-status");

/// Follow-up work requested by an applied status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEffect {
    None,
    /// A run finished; the dashboard must be force-refreshed.
    RefreshRequested(RunOutcome),
    /// A run failed; the reason must be surfaced.
    SurfaceError(String),
}

pub struct RunStatusListener {
    hub: InboundHub,
    channel: Arc<dyn ActionChannel>,
    board: Arc<Mutex<RunBoard>>,
    registration: Mutex<Option<Subscription>>,
    reconcile_timeout: Duration,
}

impl RunStatusListener {
    pub fn new(
        hub: InboundHub,
        channel: Arc<dyn ActionChannel>,
        board: Arc<Mutex<RunBoard>>,
        reconcile_timeout: Duration,
    ) -> Self {
        Self {
            hub,
            channel,
            board,
            registration: Mutex::new(None),
            reconcile_timeout,
        }
    }

    /// Registers for pushes, then reconciles against the persisted run flag.
    ///
    /// Registering first means a push racing the reconciliation read is
    /// buffered and applied after it. Mounting an already mounted listener
    /// keeps the existing registration.
    pub async fn mount(&self) {
        self.register();
        self.reconcile().await;
    }

    fn register(&self) {
        let mut registration = lock_unpoisoned(&self.registration);
        let live = registration
            .as_ref()
            .is_some_and(|subscription| self.hub.is_live(subscription.handle));
        if !live {
            *registration = Some(self.hub.subscribe(RUN_STATUS_LISTENER));
            tracing::debug!(listener = RUN_STATUS_LISTENER.name(), "registered for run status pushes");
        }
    }

    async fn reconcile(&self) {
        let lookup =
            tokio::time::timeout(self.reconcile_timeout, self.channel.persisted_run_flag()).await;
        let flag = match lookup {
            Ok(Ok(flag)) => flag,
            Ok(Err(error)) => {
                tracing::debug!(error = %error, "run flag reconciliation failed; assuming idle");
                Default::default()
            }
            Err(_) => {
                tracing::debug!("run flag reconciliation timed out; assuming idle");
                Default::default()
            }
        };

        let mut board = lock_unpoisoned(&self.board);
        if flag.is_running {
            let label = flag.selected_action_label;
            board.record_agent(AgentStatus::Running {
                operation: label.as_deref().and_then(Operation::from_label),
                label,
            });
        } else if board.agent_running() {
            board.record_agent(AgentStatus::Idle);
        }
    }

    /// Drops the push registration. Returns false when nothing was registered.
    pub fn unmount(&self) -> bool {
        let Some(subscription) = lock_unpoisoned(&self.registration).take() else {
            return false;
        };
        self.hub.unsubscribe(subscription.handle)
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        lock_unpoisoned(&self.registration)
            .as_ref()
            .is_some_and(|subscription| self.hub.is_live(subscription.handle))
    }

    /// Takes every queued push without applying it.
    pub fn drain_pending(&self) -> Vec<RunStatusUpdate> {
        let mut registration = lock_unpoisoned(&self.registration);
        let Some(subscription) = registration.as_mut() else {
            return Vec::new();
        };

        let mut drained = Vec::new();
        let mut evicted = false;
        loop {
            match subscription.receiver.try_recv() {
                Ok(update) => drained.push(update),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    evicted = true;
                    break;
                }
            }
        }
        // Evicted by another registration under the same key.
        if evicted {
            *registration = None;
        }
        drained
    }

    /// Applies one agent report to the board.
    pub fn apply(&self, update: &RunStatusUpdate) -> StatusEffect {
        let mut board = lock_unpoisoned(&self.board);
        match update.status {
            RunStatus::Running => {
                board.record_agent(AgentStatus::Running {
                    operation: update.operation(),
                    label: update.operation_label.clone(),
                });
                tracing::info!(label = ?update.operation_label, "agent run started");
                StatusEffect::None
            }
            RunStatus::Finished => {
                let outcome = update.run_outcome();
                board.record_agent(AgentStatus::Finished(outcome));
                tracing::info!(outcome = outcome.as_str(), "agent run finished");
                StatusEffect::RefreshRequested(outcome)
            }
            RunStatus::Error => {
                let reason = update.error_reason();
                board.record_agent(AgentStatus::Error(reason.clone()));
                tracing::warn!(reason = %reason, "agent run failed");
                StatusEffect::SurfaceError(reason)
            }
        }
    }
}
