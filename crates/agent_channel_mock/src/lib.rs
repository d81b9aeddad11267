//! Deterministic mock implementation of the `agent_channel` contract.
//!
//! This crate contains no transport logic. It records every delivered
//! message, mirrors the configuration a real agent would persist, and lets
//! tests script refusals, outages and out-of-band status pushes.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use agent_channel::{
    Ack, ActionChannel, ChannelError, ChannelMessage, InboundHub, PersistedRunFlag, RunOutcome,
    RunStatusUpdate,
};
use async_trait::async_trait;

/// Stable identifier reported by the mock agent in acknowledgements.
pub const MOCK_AGENT_ID: &str = "mock-agent";

/// Configuration the agent holds after receiving messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentConfiguration {
    pub credential: Option<String>,
    pub endpoint: Option<String>,
    pub selected_label: Option<String>,
    pub unfollow_list: Option<Vec<String>>,
}

#[derive(Debug, Default)]
struct MockState {
    delivered: Vec<ChannelMessage>,
    attempts: usize,
    scripted_failures: HashMap<&'static str, ChannelError>,
    unreachable: bool,
    persisted_lookup_error: Option<ChannelError>,
    is_running: bool,
    configuration: AgentConfiguration,
}

/// Scriptable stand-in for the external automation agent.
#[derive(Default)]
pub struct MockAgent {
    state: Mutex<MockState>,
    hub: InboundHub,
    send_delay: Option<Duration>,
}

impl MockAgent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock agent that pushes status updates through `hub`.
    #[must_use]
    pub fn with_hub(hub: InboundHub) -> Self {
        Self {
            hub,
            ..Self::default()
        }
    }

    /// Delays every acknowledgement, for exercising send timeouts.
    #[must_use]
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn hub(&self) -> &InboundHub {
        &self.hub
    }

    /// Fails the next send of `action` with `error`. The script is consumed once.
    pub fn fail_next(&self, action: &'static str, error: ChannelError) {
        lock_unpoisoned(&self.state)
            .scripted_failures
            .insert(action, error);
    }

    /// Simulates the agent being uninstalled or disabled.
    pub fn set_unreachable(&self, unreachable: bool) {
        lock_unpoisoned(&self.state).unreachable = unreachable;
    }

    /// Makes the next persisted-flag lookup fail.
    pub fn fail_persisted_lookup(&self, error: ChannelError) {
        lock_unpoisoned(&self.state).persisted_lookup_error = Some(error);
    }

    /// Seeds the agent's persisted run flag, as left behind by a run that
    /// survived a page reload.
    pub fn set_persisted_run(&self, is_running: bool, label: Option<&str>) {
        let mut state = lock_unpoisoned(&self.state);
        state.is_running = is_running;
        state.configuration.selected_label = label.map(str::to_string);
    }

    #[must_use]
    pub fn delivered(&self) -> Vec<ChannelMessage> {
        lock_unpoisoned(&self.state).delivered.clone()
    }

    #[must_use]
    pub fn delivered_actions(&self) -> Vec<&'static str> {
        lock_unpoisoned(&self.state)
            .delivered
            .iter()
            .map(ChannelMessage::action_name)
            .collect()
    }

    /// Number of send attempts, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        lock_unpoisoned(&self.state).attempts
    }

    #[must_use]
    pub fn configuration(&self) -> AgentConfiguration {
        lock_unpoisoned(&self.state).configuration.clone()
    }

    /// Starts a run for the currently selected action and pushes `running`.
    pub fn start_run(&self) -> usize {
        let label = {
            let mut state = lock_unpoisoned(&self.state);
            state.is_running = true;
            state
                .configuration
                .selected_label
                .clone()
                .unwrap_or_else(|| "unknown".to_string())
        };
        self.hub.publish(RunStatusUpdate::running(label))
    }

    /// Completes the current run and pushes `finished`.
    pub fn finish_run(&self, outcome: RunOutcome) -> usize {
        let label = self.end_run();
        let mut update = RunStatusUpdate::finished(outcome);
        if let Some(label) = label {
            update = update.with_operation_label(label);
        }
        self.hub.publish(update)
    }

    /// Aborts the current run and pushes `error`.
    pub fn fail_run(&self, reason: &str) -> usize {
        let label = self.end_run();
        let mut update = RunStatusUpdate::failed(reason);
        if let Some(label) = label {
            update = update.with_operation_label(label);
        }
        self.hub.publish(update)
    }

    fn end_run(&self) -> Option<String> {
        let mut state = lock_unpoisoned(&self.state);
        state.is_running = false;
        state.configuration.unfollow_list = None;
        state.configuration.selected_label.take()
    }

    fn apply(configuration: &mut AgentConfiguration, message: &ChannelMessage) {
        match message {
            ChannelMessage::SaveCredential { token } => {
                configuration.credential = Some(token.clone());
            }
            ChannelMessage::SetTargetEndpoint { endpoint } => {
                configuration.endpoint = Some(endpoint.clone());
            }
            ChannelMessage::SetSelectedAction { label } => {
                configuration.selected_label = Some(label.clone());
            }
            ChannelMessage::SetUnfollowList { usernames } => {
                configuration.unfollow_list = Some(usernames.clone());
            }
            ChannelMessage::ClearSelectedAction {} => {
                configuration.selected_label = None;
                configuration.unfollow_list = None;
            }
        }
    }
}

#[async_trait]
impl ActionChannel for MockAgent {
    async fn send(&self, message: &ChannelMessage) -> Result<Ack, ChannelError> {
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock_unpoisoned(&self.state);
        state.attempts += 1;

        if state.unreachable {
            return Err(ChannelError::unreachable("mock agent is not installed"));
        }

        if let Some(error) = state.scripted_failures.remove(message.action_name()) {
            return Err(error);
        }

        Self::apply(&mut state.configuration, message);
        state.delivered.push(message.clone());

        Ok(Ack::with_response(format!(
            "{MOCK_AGENT_ID}:{}",
            message.action_name()
        )))
    }

    async fn persisted_run_flag(&self) -> Result<PersistedRunFlag, ChannelError> {
        let mut state = lock_unpoisoned(&self.state);
        if let Some(error) = state.persisted_lookup_error.take() {
            return Err(error);
        }
        if state.unreachable {
            return Err(ChannelError::unreachable("mock agent is not installed"));
        }

        Ok(PersistedRunFlag {
            is_running: state.is_running,
            selected_action_label: state.configuration.selected_label.clone(),
        })
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
