//! vg-exec: real-time execution of compiled layer schedules.
//!
//! One coordinator thread drives the layer state machine. Every zone owns a
//! worker thread holding its valve controller; the coordinator and the zones
//! talk only through channels. A stage's commands go to all addressed zones
//! at once, and the next stage is dispatched only after every one of them has
//! confirmed (or the layer has faulted).
//!
//! Emergency stop is a shared flag plus a wake-up message, so it preempts any
//! blocking wait and drives the coordinator to `SafeShutdown`.

pub mod barrier;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod hw;
pub mod sim;
pub mod state;
mod zone;

pub use barrier::AckBarrier;
pub use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorHandle, CoordinatorStatus, EmergencyStop,
    Hardware, LayerHandle, LayerReport, PressurePolicy,
};
pub use error::{ExecError, ExecResult};
pub use events::{DEFAULT_EVENT_CAPACITY, EventLog, ExecEvent, ExecEventKind};
pub use hw::{Ack, HwFault, PressureController, SafetyMonitor, SafetyViolation, ValveController, ValveState};
pub use sim::{SimPressureController, SimSafetyMonitor, SimValveController};
pub use state::CoordinatorState;
