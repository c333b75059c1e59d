//! Error types for layer execution.

use thiserror::Error;
use vg_core::ZoneId;
use vg_grid::MaterialId;

use crate::hw::{HwFault, SafetyViolation};
use crate::state::CoordinatorState;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecError {
    #[error("Layer {layer} stage {stage}: zones {zones:?} did not acknowledge")]
    ZoneAckTimeout {
        layer: u32,
        stage: u32,
        zones: Vec<ZoneId>,
    },

    #[error("Zone {zone}: {fault}")]
    HwFault { zone: ZoneId, fault: HwFault },

    #[error(transparent)]
    SafetyViolation(#[from] SafetyViolation),

    #[error("Pressure controller: {0}")]
    Pressure(HwFault),

    #[error("Channel {channel} pressure {measured_kpa:.1} kPa deviates from target {target_kpa:.1} kPa")]
    PressureDeviation {
        channel: MaterialId,
        target_kpa: f64,
        measured_kpa: f64,
    },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: CoordinatorState,
        to: CoordinatorState,
    },

    #[error("Coordinator is {state:?} and does not accept layers")]
    NotAccepting { state: CoordinatorState },

    #[error("Schedule addresses zone {zone} which has no controller")]
    UnknownZone { zone: ZoneId },

    #[error("Layer {layer} cancelled")]
    Cancelled { layer: u32 },

    #[error("Layer {layer} abandoned: {reason}")]
    Halted { layer: u32, reason: String },

    #[error("Emergency stop")]
    EmergencyStop,

    #[error("Coordinator is no longer running")]
    CoordinatorGone,

    #[error("Invalid coordinator configuration: {what}")]
    InvalidConfig { what: &'static str },

    #[error("Failed to start worker thread: {what}")]
    Spawn { what: String },
}

impl ExecError {
    /// Errors that put the coordinator into `SafeShutdown`.
    pub fn is_safety_critical(&self) -> bool {
        matches!(self, ExecError::SafetyViolation(_) | ExecError::EmergencyStop)
    }
}

pub type ExecResult<T> = Result<T, ExecError>;
