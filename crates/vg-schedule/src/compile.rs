//! Routing plan to schedule.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;
use vg_core::timing::Timer;
use vg_core::{NodeId, Tolerances, le_with_tol};
use vg_grid::{Grid, MaterialId, ValveMask};
use vg_route::{EdgeUse, RoutingPlan};

use crate::error::{ScheduleError, ScheduleResult};
use crate::options::CompileOptions;
use crate::schedule::{Activation, Schedule, StageKind, StageDraft};

type MaskTable = BTreeMap<(NodeId, MaterialId), ValveMask>;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleCompiler {
    options: CompileOptions,
}

impl ScheduleCompiler {
    pub fn new(options: CompileOptions) -> ScheduleResult<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile `plan` into trunk stages, then branch stages, then one
    /// deposition stage, each split by zone and closed by a barrier.
    pub fn compile(&self, grid: &Grid, plan: &RoutingPlan) -> ScheduleResult<Schedule> {
        let timer = Timer::start("schedule_compile");
        self.check_supply(grid, plan)?;

        // Channels grouped by (kind, depth band).
        let mut bands: BTreeMap<(StageKind, u32), Vec<&EdgeUse>> = BTreeMap::new();
        for usage in plan.edge_usage.values() {
            let kind = if usage.is_trunk() {
                StageKind::Trunk
            } else {
                StageKind::Branch
            };
            let band = usage.depth / self.options.depth_per_stage;
            bands.entry((kind, band)).or_default().push(usage);
        }

        let layout = grid.slot_layout();
        let mut cumulative = MaskTable::new();
        let mut drafts = Vec::new();

        for ((kind, _), uses) in bands {
            let mut touched = BTreeSet::new();
            for usage in uses {
                let Some(edge) = grid.edge(usage.edge) else {
                    continue;
                };
                for end in [edge.a, edge.b] {
                    let slot = layout.slot(edge.group, edge.dir_at(end));
                    let mask = cumulative.entry((end, usage.material)).or_default();
                    *mask = mask.with_slot(slot);
                    touched.insert((end, usage.material));
                }
            }
            self.push_split(&mut drafts, kind, grid, &cumulative, touched);
        }

        let mut touched = BTreeSet::new();
        for path in &plan.paths {
            let key = (path.target_node, path.target.material);
            let mask = cumulative.entry(key).or_default();
            *mask = mask.with_deposit();
            touched.insert(key);
        }
        self.push_split(&mut drafts, StageKind::Deposit, grid, &cumulative, touched);

        let schedule = Schedule::assemble(plan.layer, drafts, grid)?;
        timer.stop_and_log();
        info!(
            layer = schedule.layer,
            stages = schedule.stage_count(),
            active_nodes = schedule.stats.active_nodes,
            open_valves = schedule.stats.open_valves,
            pattern = %schedule.stats.pattern_hash,
            "schedule compiled"
        );
        Ok(schedule)
    }

    /// Refuse plans whose injection draw exceeds configured supply.
    fn check_supply(&self, grid: &Grid, plan: &RoutingPlan) -> ScheduleResult<()> {
        let tol = Tolerances::default();
        for (injection, draw) in plan.supply_draw(grid).into_iter().enumerate() {
            let supply = grid.injection_points()[injection].supply;
            if !le_with_tol(draw, supply, tol) {
                return Err(ScheduleError::SupplyBudgetExceeded {
                    injection,
                    draw,
                    supply,
                });
            }
        }
        Ok(())
    }

    /// Append one stage, or several if it touches more nodes than allowed.
    fn push_split(
        &self,
        drafts: &mut Vec<StageDraft>,
        kind: StageKind,
        grid: &Grid,
        cumulative: &MaskTable,
        touched: BTreeSet<(NodeId, MaterialId)>,
    ) {
        if touched.is_empty() {
            return;
        }
        let activations: Vec<Activation> = touched
            .into_iter()
            .map(|(node, material)| Activation {
                node,
                coord: grid.coord(node),
                material,
                mask: cumulative
                    .get(&(node, material))
                    .copied()
                    .unwrap_or_default(),
            })
            .collect();

        let draft = |activations| StageDraft {
            kind,
            activations,
            valve_response: self.options.valve_response(),
            settle: self.options.settle,
        };
        let Some(limit) = self.options.max_nodes_per_stage else {
            drafts.push(draft(activations));
            return;
        };

        // Activations are sorted by node, so a chunk never splits one node.
        let mut chunk: Vec<Activation> = Vec::new();
        let mut nodes_in_chunk = 0;
        for a in activations {
            let new_node = chunk.last().is_none_or(|last| last.node != a.node);
            if new_node && nodes_in_chunk == limit {
                drafts.push(draft(std::mem::take(&mut chunk)));
                nodes_in_chunk = 0;
            }
            if new_node {
                nodes_in_chunk += 1;
            }
            chunk.push(a);
        }
        if !chunk.is_empty() {
            drafts.push(draft(chunk));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vg_grid::{GridBuilder, GridCoord};
    use vg_route::{RouteOptions, RoutingPlanner, TargetSet};

    fn line(supply: f64) -> (Grid, RoutingPlan) {
        let grid = GridBuilder::new(1, 4)
            .material(MaterialId(0))
            .injection_point(GridCoord::new(0, 0), MaterialId(0), supply)
            .build()
            .unwrap();
        let plan = RoutingPlanner::new(&grid, RouteOptions::default())
            .unwrap()
            .plan(
                &TargetSet::new(2)
                    .with(GridCoord::new(0, 3), MaterialId(0))
                    .with(GridCoord::new(0, 1), MaterialId(0)),
            );
        (grid, plan)
    }

    #[test]
    fn trunk_before_branch_before_deposit() {
        let (grid, plan) = line(8.0);
        let compiler = ScheduleCompiler::new(CompileOptions {
            depth_per_stage: 1,
            ..Default::default()
        })
        .unwrap();
        let schedule = compiler.compile(&grid, &plan).unwrap();
        let kinds: Vec<_> = schedule.stages.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Trunk,
                StageKind::Branch,
                StageKind::Branch,
                StageKind::Deposit
            ]
        );
        assert_eq!(schedule.layer, 2);
    }

    #[test]
    fn masks_are_cumulative() {
        let (grid, plan) = line(8.0);
        let schedule = ScheduleCompiler::default().compile(&grid, &plan).unwrap();
        let first = NodeId::from_index(1);
        let mut seen = ValveMask::CLOSED;
        for stage in &schedule.stages {
            for cmd in &stage.commands {
                for c in cmd.commits.iter().filter(|c| c.node == first) {
                    assert!(seen.missing_from(c.mask).is_closed());
                    seen = c.mask;
                }
            }
        }
        assert_eq!(schedule.final_masks[&first], seen);
        assert!(seen.deposits());
    }

    #[test]
    fn supply_budget_is_enforced() {
        let (grid, plan) = line(1.0);
        let err = ScheduleCompiler::default()
            .compile(&grid, &plan)
            .unwrap_err();
        assert!(matches!(err, ScheduleError::SupplyBudgetExceeded { .. }));
    }

    #[test]
    fn node_limit_splits_stages() {
        let (grid, plan) = line(8.0);
        let compiler = ScheduleCompiler::new(CompileOptions {
            max_nodes_per_stage: Some(1),
            ..Default::default()
        })
        .unwrap();
        let schedule = compiler.compile(&grid, &plan).unwrap();
        assert!(schedule.stages.iter().all(|s| s.node_count() <= 1));
        assert_eq!(schedule.stats.open_valves, 6);
    }
}
