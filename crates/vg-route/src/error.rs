//! Error types for routing.

use thiserror::Error;

/// Errors raised by the routing planner itself.
///
/// Unreachable targets are not errors; they are reported inside the plan.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RouteError {
    #[error("Invalid routing option: {what}")]
    InvalidOption { what: &'static str },

    #[error("Routing plan violates an invariant: {what}")]
    PlanInvariant { what: String },
}

pub type RouteResult<T> = Result<T, RouteError>;
