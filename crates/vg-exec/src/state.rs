//! Coordinator state machine.

use crate::error::{ExecError, ExecResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinatorState {
    Idle,
    /// Dispatching one stage's commands.
    Preparing,
    /// Waiting for every addressed zone to confirm the stage.
    AwaitingZoneAck,
    Committed,
    /// Dwell after a stage so pressure and flow stabilize.
    Settling,
    LayerComplete,
    Paused,
    Fault,
    Cancelled,
    /// Terminal: valves closed and pressure vented after a safety event.
    SafeShutdown,
}

impl CoordinatorState {
    /// Whether `self -> to` is a legal transition.
    pub fn can_transition(self, to: CoordinatorState) -> bool {
        use CoordinatorState::*;
        if self == SafeShutdown {
            return false;
        }
        match to {
            SafeShutdown => true,
            Fault => self != Fault,
            // A commit in flight finishes its barrier first.
            Cancelled => !matches!(self, Committed | Fault | Cancelled),
            Preparing => matches!(
                self,
                Idle | Settling | LayerComplete | Paused | Cancelled
            ),
            AwaitingZoneAck => self == Preparing,
            Committed => self == AwaitingZoneAck,
            Settling => self == Committed,
            LayerComplete => self == Settling || self == Preparing,
            Paused => matches!(self, Idle | Settling | LayerComplete | Cancelled),
            Idle => matches!(self, Paused | Fault | Cancelled | LayerComplete),
        }
    }

    /// No layer is in flight.
    pub fn is_quiescent(self) -> bool {
        matches!(
            self,
            CoordinatorState::Idle | CoordinatorState::LayerComplete | CoordinatorState::Cancelled
        )
    }

    pub fn is_terminal(self) -> bool {
        self == CoordinatorState::SafeShutdown
    }
}

/// Current state plus transition validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateMachine {
    state: CoordinatorState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: CoordinatorState::Idle,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Move to `to`, returning the previous state.
    pub fn transition(&mut self, to: CoordinatorState) -> ExecResult<CoordinatorState> {
        if !self.state.can_transition(to) {
            return Err(ExecError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        let from = self.state;
        self.state = to;
        Ok(from)
    }
}
