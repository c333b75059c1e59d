//! Process-wide print state.
//!
//! A single `SystemState` is created at start-up and passed by reference to
//! whatever drives a print. Phases change only through `transition`, which
//! rejects moves the machine cannot make and keeps an audit trail.

use tracing::debug;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrintPhase {
    Idle,
    Homing,
    /// Heating and pressurizing the material supply.
    Heating,
    Routing,
    Committing,
    Settling,
    Paused,
    Faulted,
    ShuttingDown,
}

impl PrintPhase {
    /// Phases a pause may interrupt.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PrintPhase::Routing | PrintPhase::Committing | PrintPhase::Settling
        )
    }

    pub fn can_transition(self, to: PrintPhase) -> bool {
        use PrintPhase::*;
        match (self, to) {
            (ShuttingDown, _) => false,
            (_, ShuttingDown) => true,
            (Faulted, Faulted) => false,
            (_, Faulted) => true,
            (Idle, Homing) => true,
            (Homing, Heating) => true,
            (Heating, Routing) => true,
            (Routing, Committing) => true,
            (Committing, Settling) => true,
            (Settling, Routing) => true,
            // Next layer after a layer-local routing failure.
            (Routing, Routing) => true,
            (Routing | Settling | Heating, Idle) => true,
            (from, Paused) => from.is_active(),
            (Faulted, Idle) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: PrintPhase,
    pub to: PrintPhase,
    pub layer: Option<u32>,
}

/// Owned print state: current phase, active layer and the transitions taken.
#[derive(Debug, Clone)]
pub struct SystemState {
    phase: PrintPhase,
    layer: Option<u32>,
    paused_from: Option<PrintPhase>,
    history: Vec<PhaseChange>,
}

impl Default for SystemState {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemState {
    pub fn new() -> Self {
        Self {
            phase: PrintPhase::Idle,
            layer: None,
            paused_from: None,
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> PrintPhase {
        self.phase
    }

    pub fn active_layer(&self) -> Option<u32> {
        self.layer
    }

    pub fn history(&self) -> &[PhaseChange] {
        &self.history
    }

    pub fn set_layer(&mut self, layer: Option<u32>) {
        self.layer = layer;
    }

    pub fn transition(&mut self, to: PrintPhase) -> AppResult<()> {
        let from = self.phase;
        if !from.can_transition(to) {
            return Err(AppError::InvalidPhaseTransition { from, to });
        }
        debug!(?from, ?to, layer = ?self.layer, "print phase");
        self.history.push(PhaseChange {
            from,
            to,
            layer: self.layer,
        });
        self.phase = to;
        Ok(())
    }

    pub fn pause(&mut self) -> AppResult<()> {
        let from = self.phase;
        self.transition(PrintPhase::Paused)?;
        self.paused_from = Some(from);
        Ok(())
    }

    /// Return to the phase the pause interrupted.
    pub fn resume(&mut self) -> AppResult<()> {
        let Some(back) = self.paused_from.filter(|_| self.phase == PrintPhase::Paused) else {
            return Err(AppError::InvalidPhaseTransition {
                from: self.phase,
                to: PrintPhase::Routing,
            });
        };
        debug!(to = ?back, "print resumed");
        self.history.push(PhaseChange {
            from: PrintPhase::Paused,
            to: back,
            layer: self.layer,
        });
        self.phase = back;
        self.paused_from = None;
        Ok(())
    }

    /// Fresh state after shutdown; the audit trail is discarded.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
