//! Analytic feasibility estimate of a routing plan.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info};
use vg_core::{EdgeId, Tolerances, le_with_tol, pa, to_pa};
use vg_grid::Grid;
use vg_route::{RoutedPath, RoutingPlan};

use crate::error::FeasibilityResult;
use crate::limits::FeasibilityLimits;
use crate::report::{
    Bottleneck, BottleneckKind, BottleneckSite, FeasibilityReport, PathPressure, rank,
};

#[derive(Debug, Clone, Copy)]
pub struct FeasibilityEstimator {
    limits: FeasibilityLimits,
}

impl FeasibilityEstimator {
    pub fn new(limits: FeasibilityLimits) -> FeasibilityResult<Self> {
        limits.validate()?;
        Ok(Self { limits })
    }

    pub fn limits(&self) -> &FeasibilityLimits {
        &self.limits
    }

    /// Pressure drop in Pa from the injection point to the target of `path`.
    ///
    /// Each channel passes through two valves, one at either end.
    pub fn path_drop_pa(&self, grid: &Grid, plan: &RoutingPlan, path: &RoutedPath) -> f64 {
        let valve_loss = to_pa(self.limits.valve_loss);
        path.edges
            .iter()
            .filter_map(|e| Some((grid.edge(*e)?, plan.edge_usage.get(e)?)))
            .map(|(edge, usage)| {
                self.limits.channel_resistance_pa_per_unit_mm * edge.length_mm * usage.flow
                    + 2.0 * valve_loss
            })
            .sum()
    }

    /// Check `plan` against supply, pressure and actuation limits.
    pub fn estimate(&self, grid: &Grid, plan: &RoutingPlan) -> FeasibilityReport {
        let tol = Tolerances::default();
        let tolerance_pa = to_pa(self.limits.pressure_tolerance);
        let mut bottlenecks = Vec::new();

        // Supply per injection point.
        let supply_draw = plan.supply_draw(grid);
        let supply_capacity: Vec<f64> = grid.injection_points().iter().map(|p| p.supply).collect();
        for (i, (&draw, &cap)) in supply_draw.iter().zip(&supply_capacity).enumerate() {
            if !le_with_tol(draw, cap, tol) {
                bottlenecks.push(Bottleneck {
                    site: BottleneckSite::Injection(i),
                    kind: BottleneckKind::SupplyExceeded,
                    severity: draw / cap,
                });
            }
        }

        // Channel capacity.
        for usage in plan.edge_usage.values() {
            let cap = grid.edge(usage.edge).map_or(0.0, |e| e.capacity);
            if !le_with_tol(usage.flow, cap, tol) {
                bottlenecks.push(Bottleneck {
                    site: BottleneckSite::Edge(usage.edge),
                    kind: BottleneckKind::Capacity,
                    severity: if cap > 0.0 { usage.flow / cap } else { f64::INFINITY },
                });
            }
        }

        // Pressure along every path.
        let drops: Vec<(usize, f64)> = plan
            .paths
            .par_iter()
            .enumerate()
            .map(|(i, path)| (i, self.path_drop_pa(grid, plan, path)))
            .collect();

        let mut critical: Option<(usize, f64)> = None;
        let mut edge_severity: BTreeMap<EdgeId, f64> = BTreeMap::new();
        for &(i, drop) in &drops {
            if critical.is_none_or(|(_, d)| drop > d) {
                critical = Some((i, drop));
            }
            if drop > tolerance_pa {
                let severity = drop / tolerance_pa;
                for &e in &plan.paths[i].edges {
                    let s = edge_severity.entry(e).or_insert(0.0);
                    *s = s.max(severity);
                }
            }
        }
        bottlenecks.extend(edge_severity.into_iter().map(|(e, severity)| Bottleneck {
            site: BottleneckSite::Edge(e),
            kind: BottleneckKind::PressureDrop,
            severity,
        }));

        // Actuation per node.
        let masks = plan.node_masks();
        let max_open_valves = masks.values().map(|m| m.open_slots()).max().unwrap_or(0);
        if let Some(limit) = self.limits.max_open_valves_per_node {
            for (&node, mask) in &masks {
                let open = mask.open_slots();
                if open > limit {
                    bottlenecks.push(Bottleneck {
                        site: BottleneckSite::Node(node),
                        kind: BottleneckKind::ValveLimit,
                        severity: f64::from(open) / f64::from(limit),
                    });
                }
            }
        }

        rank(&mut bottlenecks);
        let feasible = bottlenecks.is_empty();
        let max_pressure_drop = pa(critical.map_or(0.0, |(_, d)| d));
        let critical_path = critical.map(|(i, d)| PathPressure {
            target: plan.paths[i].target,
            drop: pa(d),
        });

        if feasible {
            debug!(
                layer = plan.layer,
                max_drop_pa = to_pa(max_pressure_drop),
                max_open_valves,
                "plan feasible"
            );
        } else {
            info!(
                layer = plan.layer,
                bottlenecks = bottlenecks.len(),
                worst = %bottlenecks[0],
                "plan infeasible"
            );
        }

        FeasibilityReport {
            layer: plan.layer,
            feasible,
            supply_draw,
            supply_capacity,
            max_pressure_drop,
            critical_path,
            max_open_valves,
            bottlenecks,
        }
    }
}
