//! Hardware abstraction consumed by the coordinator and zone workers.

use thiserror::Error;
use vg_core::{NodeId, Pressure};
use vg_grid::{MaterialId, ValveMask};

/// Valve state read back from a node.
pub type ValveState = ValveMask;

/// Confirmation that a node accepted a valve mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub node: NodeId,
    pub mask: ValveMask,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "hardware fault at {}: {what}",
    .node.map_or_else(|| "controller".to_string(), |n| format!("node {n}"))
)]
pub struct HwFault {
    pub node: Option<NodeId>,
    pub what: String,
}

impl HwFault {
    pub fn new(what: impl Into<String>) -> Self {
        Self {
            node: None,
            what: what.into(),
        }
    }

    pub fn at(node: NodeId, what: impl Into<String>) -> Self {
        Self {
            node: Some(node),
            what: what.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Safety violation: {what}")]
pub struct SafetyViolation {
    pub what: String,
}

impl SafetyViolation {
    pub fn new(what: impl Into<String>) -> Self {
        Self { what: what.into() }
    }
}

/// Valve driver for the nodes of one zone.
pub trait ValveController: Send + Sync {
    /// Drive `node` to `mask` (all slots and the outlet).
    fn set_batch(&self, node: NodeId, mask: ValveMask) -> Result<Ack, HwFault>;

    fn read_back(&self, node: NodeId) -> Result<ValveState, HwFault>;

    /// Close every valve this controller drives.
    fn close_all(&self) -> Result<(), HwFault>;
}

/// Per-material supply pressure regulation.
pub trait PressureController: Send + Sync {
    fn set_target(&self, channel: MaterialId, value: Pressure) -> Result<(), HwFault>;

    fn read(&self, channel: MaterialId) -> Result<Pressure, HwFault>;

    /// Release pressure on every channel.
    fn vent_all(&self) -> Result<(), HwFault>;
}

/// Independent watchdog polled before every stage dispatch.
pub trait SafetyMonitor: Send + Sync {
    fn check(&self) -> Result<(), SafetyViolation>;

    /// Told about faults the coordinator detects itself.
    fn report_fault(&self, _what: &str) {}
}
