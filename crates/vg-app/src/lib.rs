//! Print-job service layer for the valve grid.
//!
//! Ties the planning crates and the execution coordinator together for the
//! CLI: per-layer planning with feasibility refinement, schedule compilation,
//! plan files, and a print job that walks the process-wide print state.

pub mod error;
pub mod job;
pub mod phase;
pub mod plan_service;
pub mod progress;
pub mod sim_machine;

pub use error::{AppError, AppResult};
pub use job::{JobSummary, LayerOutcome, PrintJob};
pub use phase::{PhaseChange, PrintPhase, SystemState};
pub use plan_service::{
    PlanOptions, PlannedLayer, UnroutablePolicy, load_plan, plan_layer, plan_layers, save_plan,
};
pub use progress::{JobProgressEvent, JobStage, LayerProgress, ProgressCallback};
pub use sim_machine::{SimOptions, SimulatedMachine};
