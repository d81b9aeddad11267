//! Mutual-exclusion gate for arming actions.

use std::sync::{Arc, Mutex};

use agent_channel::Operation;

use crate::lock_unpoisoned;
use crate::run_state::RunBoard;

/// Result of [`ActionSelector::select`].
#[derive(Debug)]
pub enum Selection<T> {
    /// The agent is running; nothing changed and the trigger was not invoked.
    Busy,
    /// The operation was already armed and has been toggled off.
    Disarmed(Operation),
    /// The operation is now armed and the trigger was invoked.
    Armed {
        operation: Operation,
        replaced: Option<Operation>,
        triggered: T,
    },
}

#[derive(Clone)]
pub struct ActionSelector {
    board: Arc<Mutex<RunBoard>>,
}

impl ActionSelector {
    pub fn new(board: Arc<Mutex<RunBoard>>) -> Self {
        Self { board }
    }

    /// Arms `operation`, toggles it off when it is already armed, or does
    /// nothing while the agent runs. `trigger` is invoked only when arming,
    /// after the board lock is released.
    pub fn select<T, F>(&self, operation: Operation, trigger: F) -> Selection<T>
    where
        F: FnOnce(Operation) -> T,
    {
        let replaced = {
            let mut board = lock_unpoisoned(&self.board);
            if board.agent_running() {
                return Selection::Busy;
            }
            if board.armed() == Some(operation) {
                board.disarm();
                return Selection::Disarmed(operation);
            }
            board.arm(operation)
        };

        Selection::Armed {
            operation,
            replaced,
            triggered: trigger(operation),
        }
    }

    /// Disarms `operation` if it is still the armed one. Used when its
    /// dispatch fails.
    pub fn disarm_if(&self, operation: Operation) -> bool {
        let mut board = lock_unpoisoned(&self.board);
        if board.armed() == Some(operation) {
            board.disarm();
            true
        } else {
            false
        }
    }

    pub fn disarm(&self) -> Option<Operation> {
        lock_unpoisoned(&self.board).disarm()
    }

    #[must_use]
    pub fn armed(&self) -> Option<Operation> {
        lock_unpoisoned(&self.board).armed()
    }
}
