//! Routing plan: per-target activation paths plus the valve state they imply.

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};
use vg_core::{EdgeId, NodeId};
use vg_grid::{Grid, MaterialId, ValveMask};

use crate::target::Target;

/// Why a target could not be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnroutableReason {
    /// The coordinate lies outside the grid.
    OutOfGrid,
    /// The material is not configured on this grid.
    UnknownMaterial,
    /// The same node was already requested with another material this layer.
    ConflictingTarget { other: MaterialId },
    /// No path exists under the current capacity and material constraints.
    Unreachable,
}

impl fmt::Display for UnroutableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnroutableReason::OutOfGrid => write!(f, "outside the grid"),
            UnroutableReason::UnknownMaterial => write!(f, "material not configured"),
            UnroutableReason::ConflictingTarget { other } => {
                write!(f, "node already targeted with {}", other)
            }
            UnroutableReason::Unreachable => write!(f, "no path under capacity/material constraints"),
        }
    }
}

/// A target the planner could not serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unroutable {
    pub target: Target,
    pub reason: UnroutableReason,
}

impl fmt::Display for Unroutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: Unroutable ({})", self.target.coord, self.reason)
    }
}

/// Activation path of one target: injection node first, target node last.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedPath {
    pub target: Target,
    pub target_node: NodeId,
    /// Index into `Grid::injection_points()`.
    pub injection: usize,
    /// Slot group the path runs in.
    pub group: u8,
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    /// Channels first opened for this target; zero when it rides an existing trunk.
    pub new_edges: usize,
}

impl RoutedPath {
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Usage of one channel in a plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeUse {
    pub edge: EdgeId,
    pub material: MaterialId,
    pub injection: usize,
    /// Sum of the demand of every target downstream of this channel.
    pub flow: f64,
    /// Channels between the injection point and this one.
    pub depth: u32,
    pub downstream_targets: u32,
}

impl EdgeUse {
    /// Shared by more than one target's path.
    pub fn is_trunk(&self) -> bool {
        self.downstream_targets > 1
    }
}

/// Material routing for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingPlan {
    pub layer: u32,
    pub demand_per_target: f64,
    /// Routed targets ordered by (material, coordinate).
    pub paths: Vec<RoutedPath>,
    /// Targets that could not be routed, ordered by coordinate.
    pub unroutable: Vec<Unroutable>,
    pub edge_usage: BTreeMap<EdgeId, EdgeUse>,
    /// Valve state per (node, material) touched by the plan.
    pub activations: BTreeMap<(NodeId, MaterialId), ValveMask>,
}

impl RoutingPlan {
    /// Every requested target was routed.
    pub fn is_complete(&self) -> bool {
        self.unroutable.is_empty()
    }

    pub fn path_for(&self, target: &Target) -> Option<&RoutedPath> {
        self.paths.iter().find(|p| p.target == *target)
    }

    pub fn materials(&self) -> BTreeSet<MaterialId> {
        self.paths.iter().map(|p| p.target.material).collect()
    }

    pub fn is_multi_material(&self) -> bool {
        self.materials().len() > 1
    }

    /// Combined valve mask per node across materials.
    pub fn node_masks(&self) -> BTreeMap<NodeId, ValveMask> {
        let mut out: BTreeMap<NodeId, ValveMask> = BTreeMap::new();
        for (&(node, _), &mask) in &self.activations {
            let entry = out.entry(node).or_default();
            *entry = entry.union(mask);
        }
        out
    }

    pub fn active_node_count(&self) -> usize {
        self.node_masks().len()
    }

    pub fn open_valve_count(&self) -> usize {
        self.node_masks()
            .values()
            .map(|m| m.open_slots() as usize)
            .sum()
    }

    /// Demand drawn from each injection point, indexed like `Grid::injection_points()`.
    pub fn supply_draw(&self, grid: &Grid) -> Vec<f64> {
        let mut draw = vec![0.0; grid.injection_points().len()];
        for path in &self.paths {
            draw[path.injection] += self.demand_per_target;
        }
        draw
    }

    /// Edge ids used by the plan, in ascending order.
    pub fn used_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edge_usage.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vg_grid::GridCoord;

    #[test]
    fn unroutable_display_names_coordinate() {
        let u = Unroutable {
            target: Target::new(GridCoord::new(3, 3), MaterialId(0)),
            reason: UnroutableReason::Unreachable,
        };
        assert!(u.to_string().starts_with("(3,3): Unroutable"));
    }

    #[test]
    fn node_masks_union_materials() {
        let n = NodeId::from_index(0);
        let mut plan = RoutingPlan {
            layer: 0,
            demand_per_target: 1.0,
            paths: vec![],
            unroutable: vec![],
            edge_usage: BTreeMap::new(),
            activations: BTreeMap::new(),
        };
        plan.activations
            .insert((n, MaterialId(0)), ValveMask::CLOSED.with_slot(0));
        plan.activations
            .insert((n, MaterialId(1)), ValveMask::CLOSED.with_slot(5));
        assert_eq!(plan.active_node_count(), 1);
        assert_eq!(plan.open_valve_count(), 2);
    }
}
