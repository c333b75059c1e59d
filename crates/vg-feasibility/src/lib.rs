//! vg-feasibility: physical feasibility of routing plans.
//!
//! The estimator checks a plan against supply capacity, a linear pressure-drop
//! model and per-node actuation limits. When a plan fails, the ranked
//! bottlenecks are fed back to the router as penalties and the layer is
//! re-planned, up to a bounded number of attempts.

pub mod error;
pub mod estimate;
pub mod limits;
pub mod refine;
pub mod report;

pub use error::{FeasibilityError, FeasibilityResult};
pub use estimate::FeasibilityEstimator;
pub use limits::FeasibilityLimits;
pub use refine::{AcceptedPlan, RefineOptions, route_until_feasible};
pub use report::{Bottleneck, BottleneckKind, BottleneckSite, FeasibilityReport};
