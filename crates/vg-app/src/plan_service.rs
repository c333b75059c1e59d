//! Layer planning: route, estimate, compile.

use std::path::Path;

use tracing::{info, warn};
use vg_config::MachineConfig;
use vg_feasibility::{
    AcceptedPlan, FeasibilityEstimator, FeasibilityLimits, RefineOptions, route_until_feasible,
};
use vg_grid::Grid;
use vg_route::{RouteOptions, RoutingPlanner, TargetSet};
use vg_schedule::{CompileOptions, PlanFile, Schedule, ScheduleCompiler};

use crate::error::{AppError, AppResult};

/// What a print job does with targets the planner cannot reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnroutablePolicy {
    /// Any unroutable target aborts the layer.
    #[default]
    Fail,
    /// Execute the routable subset.
    Skip,
}

/// Everything the planning pipeline needs besides the grid.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlanOptions {
    pub route: RouteOptions,
    pub refine: RefineOptions,
    pub limits: FeasibilityLimits,
    pub compile: CompileOptions,
    pub unroutable: UnroutablePolicy,
}

impl PlanOptions {
    pub fn from_config(config: &MachineConfig) -> Self {
        Self {
            route: config.route_options(),
            refine: config.refine_options(),
            limits: config.feasibility_limits(),
            compile: config.compile_options(),
            unroutable: UnroutablePolicy::default(),
        }
    }

    pub fn with_unroutable(mut self, policy: UnroutablePolicy) -> Self {
        self.unroutable = policy;
        self
    }
}

/// A layer ready for execution.
#[derive(Debug, Clone)]
pub struct PlannedLayer {
    pub accepted: AcceptedPlan,
    pub schedule: Schedule,
}

impl PlannedLayer {
    pub fn layer(&self) -> u32 {
        self.schedule.layer
    }
}

pub fn plan_layer(grid: &Grid, targets: &TargetSet, options: &PlanOptions) -> AppResult<PlannedLayer> {
    let planner = RoutingPlanner::new(grid, options.route)?;
    let estimator = FeasibilityEstimator::new(options.limits)?;
    let accepted = route_until_feasible(&planner, grid, targets, &estimator, options.refine)?;
    accepted.plan.verify(grid)?;

    let plan = &accepted.plan;
    if let Some(first) = plan.unroutable.first() {
        match options.unroutable {
            UnroutablePolicy::Fail => {
                return Err(AppError::Unroutable {
                    layer: targets.layer,
                    count: plan.unroutable.len(),
                    first: first.to_string(),
                });
            }
            UnroutablePolicy::Skip => warn!(
                layer = targets.layer,
                skipped = plan.unroutable.len(),
                first = %first,
                "executing routable subset"
            ),
        }
    }

    let schedule = ScheduleCompiler::new(options.compile)?.compile(grid, plan)?;
    info!(
        layer = targets.layer,
        attempts = accepted.attempts,
        paths = plan.paths.len(),
        stages = schedule.stage_count(),
        "layer planned"
    );
    Ok(PlannedLayer { accepted, schedule })
}

/// Plan every layer into one plan file. Any failure aborts the whole file.
pub fn plan_layers(grid: &Grid, layers: &[TargetSet], options: &PlanOptions) -> AppResult<PlanFile> {
    let mut file = PlanFile::new(grid);
    for targets in layers {
        let planned = plan_layer(grid, targets, options)?;
        file.push(&planned.schedule);
    }
    Ok(file)
}

pub fn save_plan(path: &Path, file: &PlanFile) -> AppResult<()> {
    file.save(path)?;
    Ok(())
}

/// Load a plan file and rebuild its schedules for `grid`.
pub fn load_plan(path: &Path, grid: &Grid) -> AppResult<Vec<Schedule>> {
    let file = PlanFile::load(path)?;
    Ok(file.to_schedules(grid)?)
}
