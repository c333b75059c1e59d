//! Material routing planner for the valve grid.
//!
//! Each layer's target-point set is routed material by material: every target
//! is joined to an injection point of its material by the cheapest path in
//! newly opened valves, merging into trunks already opened for the same
//! material. Paths of one material form a forest rooted at injection points,
//! so every path is loop-free, and a slot group at a node carries at most one
//! material per layer, so no channel is shared between materials.
//!
//! Targets that cannot be reached under the capacity and material constraints
//! are reported as [`Unroutable`] instead of failing the layer.

pub mod error;
pub mod plan;
pub mod planner;
mod state;
pub mod target;
pub mod verify;

pub use error::{RouteError, RouteResult};
pub use plan::{EdgeUse, RoutedPath, RoutingPlan, Unroutable, UnroutableReason};
pub use planner::{RouteConstraints, RouteOptions, Router, RoutingPlanner};
pub use target::{Target, TargetSet};
