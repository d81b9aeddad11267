//! Run state machine.
//!
//! Two writers share one [`RunBoard`]: the action selector owns the local
//! `armed` slot and the run status listener owns the agent-reported status.
//! [`RunBoard::view`] derives the single [`RunState`] presentation reads.

use agent_channel::{Operation, RunOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Armed(Operation),
    Running {
        operation: Option<Operation>,
        label: Option<String>,
    },
    Finished(RunOutcome),
    Error(String),
}

impl RunState {
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

/// Last status reported by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AgentStatus {
    #[default]
    Idle,
    Running {
        operation: Option<Operation>,
        label: Option<String>,
    },
    Finished(RunOutcome),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArmedSlot {
    operation: Operation,
    // Agent status generation observed when arming. Any later agent report
    // supersedes the local selection.
    generation: u64,
}

#[derive(Debug, Default)]
pub struct RunBoard {
    armed: Option<ArmedSlot>,
    agent: AgentStatus,
    agent_generation: u64,
}

impl RunBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn view(&self) -> RunState {
        if let AgentStatus::Running { operation, label } = &self.agent {
            return RunState::Running {
                operation: *operation,
                label: label.clone(),
            };
        }

        if let Some(operation) = self.armed() {
            return RunState::Armed(operation);
        }

        match &self.agent {
            AgentStatus::Idle | AgentStatus::Running { .. } => RunState::Idle,
            AgentStatus::Finished(outcome) => RunState::Finished(*outcome),
            AgentStatus::Error(reason) => RunState::Error(reason.clone()),
        }
    }

    #[must_use]
    pub fn agent_status(&self) -> &AgentStatus {
        &self.agent
    }

    #[must_use]
    pub fn agent_running(&self) -> bool {
        matches!(self.agent, AgentStatus::Running { .. })
    }

    /// The locally armed operation, if it has not been superseded.
    #[must_use]
    pub fn armed(&self) -> Option<Operation> {
        self.armed
            .filter(|slot| slot.generation == self.agent_generation)
            .map(|slot| slot.operation)
    }

    pub(crate) fn arm(&mut self, operation: Operation) -> Option<Operation> {
        let previous = self.armed();
        self.armed = Some(ArmedSlot {
            operation,
            generation: self.agent_generation,
        });
        previous
    }

    pub(crate) fn disarm(&mut self) -> Option<Operation> {
        let previous = self.armed();
        self.armed = None;
        previous
    }

    pub(crate) fn record_agent(&mut self, status: AgentStatus) {
        self.agent = status;
        self.agent_generation = self.agent_generation.wrapping_add(1);
    }

    pub(crate) fn reset(&mut self) {
        self.armed = None;
        self.record_agent(AgentStatus::Idle);
    }
}
