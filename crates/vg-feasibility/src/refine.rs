//! Bounded plan/estimate loop.

use tracing::{debug, warn};
use vg_grid::Grid;
use vg_route::{RouteConstraints, Router, RoutingPlan, TargetSet};

use crate::error::{FeasibilityError, FeasibilityResult};
use crate::estimate::FeasibilityEstimator;
use crate::report::{BottleneckSite, FeasibilityReport};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefineOptions {
    /// Re-plans allowed after the first attempt.
    pub max_retries: u32,
    /// Search cost added per unit of bottleneck severity.
    pub penalty_weight: f64,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            penalty_weight: 4.0,
        }
    }
}

/// A plan that passed the estimator.
#[derive(Debug, Clone)]
pub struct AcceptedPlan {
    pub plan: RoutingPlan,
    pub report: FeasibilityReport,
    pub attempts: u32,
}

/// Route `targets`, re-planning around bottlenecks until the estimate passes.
///
/// Fails with [`FeasibilityError::RoutingInfeasible`] once `max_retries`
/// re-plans have been spent.
pub fn route_until_feasible<R: Router + ?Sized>(
    router: &R,
    grid: &Grid,
    targets: &TargetSet,
    estimator: &FeasibilityEstimator,
    options: RefineOptions,
) -> FeasibilityResult<AcceptedPlan> {
    let mut constraints = RouteConstraints::default();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let plan = router.route(targets, &constraints);
        let report = estimator.estimate(grid, &plan);
        if report.feasible {
            debug!(layer = targets.layer, attempts, "feasible plan accepted");
            return Ok(AcceptedPlan {
                plan,
                report,
                attempts,
            });
        }

        if attempts > options.max_retries {
            warn!(
                layer = targets.layer,
                attempts,
                bottlenecks = report.bottlenecks.len(),
                "giving up on layer routing"
            );
            return Err(FeasibilityError::RoutingInfeasible {
                layer: targets.layer,
                attempts,
                bottlenecks: report.bottlenecks,
            });
        }

        for b in &report.bottlenecks {
            let weight = options.penalty_weight * b.severity.min(1e6);
            match b.site {
                BottleneckSite::Edge(e) => constraints.penalize_edge(e, weight),
                BottleneckSite::Node(n) => constraints.penalize_node(n, weight),
                BottleneckSite::Injection(i) => {
                    if let Some(p) = grid.injection_points().get(i) {
                        constraints.penalize_node(p.node, weight);
                    }
                }
            }
        }
        debug!(
            layer = targets.layer,
            attempts,
            bottlenecks = report.bottlenecks.len(),
            "re-planning around bottlenecks"
        );
    }
}
