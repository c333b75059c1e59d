//! Unified error type for the print-job service.

use thiserror::Error;

use crate::phase::PrintPhase;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] vg_config::ConfigFileError),

    #[error("Invalid target set: {0}")]
    Targets(#[from] vg_config::ValidationError),

    #[error("Routing error: {0}")]
    Route(#[from] vg_route::RouteError),

    #[error("{0}")]
    Feasibility(#[from] vg_feasibility::FeasibilityError),

    #[error("Layer {layer}: {count} unroutable targets, first {first}")]
    Unroutable {
        layer: u32,
        count: usize,
        first: String,
    },

    #[error("Schedule error: {0}")]
    Schedule(#[from] vg_schedule::ScheduleError),

    #[error("Execution error: {0}")]
    Exec(#[from] vg_exec::ExecError),

    #[error("Invalid print phase transition: {from:?} -> {to:?}")]
    InvalidPhaseTransition { from: PrintPhase, to: PrintPhase },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Routing-level failures that abort one layer without touching hardware.
    pub fn is_layer_local(&self) -> bool {
        use vg_feasibility::FeasibilityError;
        use vg_schedule::ScheduleError;
        matches!(
            self,
            AppError::Feasibility(FeasibilityError::RoutingInfeasible { .. })
                | AppError::Unroutable { .. }
                | AppError::Schedule(ScheduleError::SupplyBudgetExceeded { .. })
        )
    }

    /// Failures that leave the machine in safe shutdown.
    pub fn is_safety_critical(&self) -> bool {
        matches!(self, AppError::Exec(e) if e.is_safety_critical())
    }
}

/// Result type for vg-app operations.
pub type AppResult<T> = Result<T, AppError>;
