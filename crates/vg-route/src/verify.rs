//! Structural checks on a finished routing plan.

use std::collections::{BTreeMap, HashSet};

use vg_core::{EdgeId, Tolerances, le_with_tol};
use vg_grid::{Grid, MaterialId};

use crate::error::{RouteError, RouteResult};
use crate::plan::RoutingPlan;

fn violation(what: String) -> RouteError {
    RouteError::PlanInvariant { what }
}

impl RoutingPlan {
    /// Check the plan against `grid`.
    ///
    /// Every path must be a contiguous, loop-free chain of legal channels from
    /// an injection point of its material to its target. No channel may carry
    /// two materials and no channel may carry more than its capacity.
    pub fn verify(&self, grid: &Grid) -> RouteResult<()> {
        let tol = Tolerances::default();
        let mut channel_material: BTreeMap<EdgeId, MaterialId> = BTreeMap::new();
        let mut flow: BTreeMap<EdgeId, f64> = BTreeMap::new();

        for path in &self.paths {
            let material = path.target.material;
            let label = path.target.coord;

            let injection = grid
                .injection_points()
                .get(path.injection)
                .ok_or_else(|| violation(format!("{label}: injection {} unknown", path.injection)))?;
            if injection.material != material {
                return Err(violation(format!(
                    "{label}: fed by injection of {} instead of {material}",
                    injection.material
                )));
            }
            if path.nodes.len() != path.edges.len() + 1 {
                return Err(violation(format!("{label}: node/channel count mismatch")));
            }
            if path.nodes.first() != Some(&injection.node) {
                return Err(violation(format!("{label}: does not start at its injection point")));
            }
            if path.nodes.last() != Some(&path.target_node) {
                return Err(violation(format!("{label}: does not end at its target")));
            }

            let mut visited = HashSet::new();
            for &n in &path.nodes {
                if !visited.insert(n) {
                    return Err(violation(format!("{label}: revisits node {n}")));
                }
            }

            for (i, &e) in path.edges.iter().enumerate() {
                let edge = grid
                    .edge(e)
                    .ok_or_else(|| violation(format!("{label}: unknown channel {e}")))?;
                let (u, v) = (path.nodes[i], path.nodes[i + 1]);
                let joins = (edge.a == u && edge.b == v) || (edge.a == v && edge.b == u);
                if !joins {
                    return Err(violation(format!("{label}: channel {e} is not contiguous")));
                }
                if !edge.accepts(material) {
                    return Err(violation(format!(
                        "{label}: channel {e} is dedicated to another material"
                    )));
                }
                match channel_material.insert(e, material) {
                    Some(other) if other != material => {
                        return Err(violation(format!(
                            "channel {e} carries both {other} and {material}"
                        )));
                    }
                    _ => {}
                }
                *flow.entry(e).or_insert(0.0) += self.demand_per_target;
            }
        }

        for (&e, &f) in &flow {
            let capacity = grid.edge(e).map_or(0.0, |edge| edge.capacity);
            if !le_with_tol(f, capacity, tol) {
                return Err(violation(format!(
                    "channel {e} carries {f} over capacity {capacity}"
                )));
            }
        }
        Ok(())
    }
}
