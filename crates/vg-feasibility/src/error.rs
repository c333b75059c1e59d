//! Error types for the feasibility stage.

use thiserror::Error;

use crate::report::Bottleneck;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeasibilityError {
    #[error("Invalid feasibility limit: {what}")]
    InvalidLimit { what: &'static str },

    #[error(
        "Layer {layer}: routing infeasible after {attempts} attempts ({} bottlenecks)",
        .bottlenecks.len()
    )]
    RoutingInfeasible {
        layer: u32,
        attempts: u32,
        /// Bottlenecks of the last attempt, most severe first.
        bottlenecks: Vec<Bottleneck>,
    },
}

pub type FeasibilityResult<T> = Result<T, FeasibilityError>;
