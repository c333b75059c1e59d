//! The routing planner.
//!
//! Targets are routed one material at a time, nearest to an injection point
//! first. Each target searches outwards (Dijkstra over ports, unit cost per
//! newly opened channel plus any penalties) until it reaches a port already
//! carrying its material or an injection point of its material. Ties resolve
//! towards existing trunks, then lower injection index, then lower port index,
//! so the same input always yields the same plan.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap, HashMap, VecDeque};

use tracing::{debug, info};
use vg_core::{EdgeId, NodeId};
use vg_grid::{Grid, MaterialId, ValveMask};

use crate::error::{RouteError, RouteResult};
use crate::plan::{EdgeUse, RoutedPath, RoutingPlan, Unroutable, UnroutableReason};
use crate::state::LayerState;
use crate::target::{Target, TargetSet};

/// Planner settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteOptions {
    /// Flow demanded by each target, in the same units as channel capacity.
    pub demand_per_target: f64,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            demand_per_target: 1.0,
        }
    }
}

/// Extra search cost attached to channels and nodes.
///
/// The feasibility refine loop uses this to steer the next routing attempt
/// away from bottlenecks. Penalties accumulate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteConstraints {
    edge_penalty: BTreeMap<EdgeId, f64>,
    node_penalty: BTreeMap<NodeId, f64>,
}

impl RouteConstraints {
    pub fn penalize_edge(&mut self, edge: EdgeId, weight: f64) {
        *self.edge_penalty.entry(edge).or_insert(0.0) += weight.max(0.0);
    }

    pub fn penalize_node(&mut self, node: NodeId, weight: f64) {
        *self.node_penalty.entry(node).or_insert(0.0) += weight.max(0.0);
    }

    pub fn edge_penalty(&self, edge: EdgeId) -> f64 {
        self.edge_penalty.get(&edge).copied().unwrap_or(0.0)
    }

    pub fn node_penalty(&self, node: NodeId) -> f64 {
        self.node_penalty.get(&node).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.edge_penalty.is_empty() && self.node_penalty.is_empty()
    }
}

/// Anything that turns a target set into a routing plan.
pub trait Router {
    fn route(&self, targets: &TargetSet, constraints: &RouteConstraints) -> RoutingPlan;
}

const RANK_TRUNK: u8 = 0;
const RANK_INJECTION: u8 = 1;
const RANK_OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    cost: f64,
    rank: u8,
    root: usize,
    port: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then(self.rank.cmp(&other.rank))
            .then(self.root.cmp(&other.root))
            .then(self.port.cmp(&other.port))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// How an unowned port relates to the material being routed.
enum PortClass {
    Open,
    Injection(usize),
    /// Injection node of another material on this group.
    Reserved,
}

/// Result of one search: where it joined the network and the new channels.
struct Junction {
    terminal: usize,
    rank: u8,
    root: usize,
    /// (parent port, child port, channel), from the junction towards the target.
    links: Vec<(usize, usize, EdgeId)>,
}

struct Routed {
    target: Target,
    node: NodeId,
    port: usize,
    new_edges: usize,
}

/// Deterministic trunk-merging router over one grid.
#[derive(Debug, Clone)]
pub struct RoutingPlanner<'g> {
    grid: &'g Grid,
    options: RouteOptions,
}

impl<'g> RoutingPlanner<'g> {
    pub fn new(grid: &'g Grid, options: RouteOptions) -> RouteResult<Self> {
        let d = options.demand_per_target;
        if !d.is_finite() || d <= 0.0 {
            return Err(RouteError::InvalidOption {
                what: "demand_per_target must be finite and > 0",
            });
        }
        Ok(Self { grid, options })
    }

    pub fn grid(&self) -> &'g Grid {
        self.grid
    }

    pub fn options(&self) -> RouteOptions {
        self.options
    }

    /// Route without penalties.
    pub fn plan(&self, targets: &TargetSet) -> RoutingPlan {
        self.route(targets, &RouteConstraints::default())
    }

    /// Split targets by material, rejecting the ones no search could serve.
    fn screen(
        &self,
        targets: &TargetSet,
    ) -> (BTreeMap<MaterialId, Vec<(Target, NodeId)>>, Vec<Unroutable>) {
        let mut by_material: BTreeMap<MaterialId, Vec<(Target, NodeId)>> = BTreeMap::new();
        let mut seen: HashMap<NodeId, MaterialId> = HashMap::new();
        let mut rejected = Vec::new();

        for &target in &targets.targets {
            let Some(node) = self.grid.node_at(target.coord) else {
                rejected.push(Unroutable {
                    target,
                    reason: UnroutableReason::OutOfGrid,
                });
                continue;
            };
            if !self.grid.has_material(target.material) {
                rejected.push(Unroutable {
                    target,
                    reason: UnroutableReason::UnknownMaterial,
                });
                continue;
            }
            match seen.get(&node) {
                Some(&m) if m == target.material => continue,
                Some(&other) => {
                    rejected.push(Unroutable {
                        target,
                        reason: UnroutableReason::ConflictingTarget { other },
                    });
                    continue;
                }
                None => {
                    seen.insert(node, target.material);
                }
            }
            by_material
                .entry(target.material)
                .or_default()
                .push((target, node));
        }
        (by_material, rejected)
    }

    /// Hop distance from the nearest injection point of `material`, over legal channels.
    fn hops_from_injection(&self, material: MaterialId) -> Vec<u32> {
        let mut hops = vec![u32::MAX; self.grid.node_count()];
        let mut queue = VecDeque::new();
        for p in self.grid.injection_points_for(material) {
            hops[p.node.idx()] = 0;
            queue.push_back(p.node);
        }
        while let Some(u) = queue.pop_front() {
            let next = hops[u.idx()] + 1;
            for (edge, v) in self.grid.neighbors(u) {
                if edge.accepts(material) && hops[v.idx()] == u32::MAX {
                    hops[v.idx()] = next;
                    queue.push_back(v);
                }
            }
        }
        hops
    }

    fn classify(&self, node: NodeId, group: u8, material: MaterialId) -> PortClass {
        if let Some(p) = self.grid.injection_at(node, material) {
            return PortClass::Injection(p.index);
        }
        let layout = self.grid.slot_layout();
        let reserved = self
            .grid
            .injection_points()
            .iter()
            .any(|p| p.node == node && layout.groups[group as usize].accepts(p.material));
        if reserved {
            PortClass::Reserved
        } else {
            PortClass::Open
        }
    }

    fn search(
        &self,
        state: &LayerState,
        node: NodeId,
        material: MaterialId,
        constraints: &RouteConstraints,
    ) -> Option<Junction> {
        let demand = self.options.demand_per_target;
        let grid = self.grid;
        let mut best: HashMap<usize, f64> = HashMap::new();
        let mut pred: HashMap<usize, (usize, EdgeId)> = HashMap::new();
        let mut heap = BinaryHeap::new();

        for group in grid.slot_layout().groups_for(material) {
            let port = state.port(node, group);
            if state.owner(port).is_some() {
                continue;
            }
            let (rank, root) = match self.classify(node, group, material) {
                PortClass::Open => (RANK_OPEN, usize::MAX),
                PortClass::Injection(i) => (RANK_INJECTION, i),
                PortClass::Reserved => continue,
            };
            best.insert(port, 0.0);
            heap.push(Reverse(Candidate {
                cost: 0.0,
                rank,
                root,
                port,
            }));
        }

        while let Some(Reverse(c)) = heap.pop() {
            if best.get(&c.port).is_some_and(|&b| c.cost > b) {
                continue;
            }
            if c.rank != RANK_OPEN {
                let mut links = Vec::new();
                let mut cur = c.port;
                while let Some(&(child, edge)) = pred.get(&cur) {
                    links.push((cur, child, edge));
                    cur = child;
                }
                return Some(Junction {
                    terminal: c.port,
                    rank: c.rank,
                    root: c.root,
                    links,
                });
            }

            let u = state.port_node(c.port);
            let group = state.port_group(c.port);
            for &e in grid.incident_edges(u) {
                let Some(edge) = grid.edge(e) else { continue };
                if edge.group != group
                    || !edge.accepts(material)
                    || state.edge_owner(e).is_some()
                    || !state.fits(demand, edge.capacity)
                {
                    continue;
                }
                let v = edge.other(u);
                let q = state.port(v, group);
                let (rank, root, extra) = match state.owner(q) {
                    Some(m) if m == material => {
                        if !state.chain_has_room(grid, q, demand) {
                            continue;
                        }
                        let Some(link) = state.link(q) else { continue };
                        let root_node = grid.injection_points()[link.root].node;
                        (RANK_TRUNK, link.root, constraints.node_penalty(root_node))
                    }
                    Some(_) => continue,
                    None => match self.classify(v, group, material) {
                        PortClass::Open => (RANK_OPEN, usize::MAX, 0.0),
                        PortClass::Injection(i) => (RANK_INJECTION, i, 0.0),
                        PortClass::Reserved => continue,
                    },
                };
                let cost =
                    c.cost + 1.0 + constraints.edge_penalty(e) + constraints.node_penalty(v) + extra;
                if best.get(&q).is_none_or(|&b| cost < b) {
                    best.insert(q, cost);
                    pred.insert(q, (c.port, e));
                    heap.push(Reverse(Candidate {
                        cost,
                        rank,
                        root,
                        port: q,
                    }));
                }
            }
        }
        None
    }

    /// Route one target into `state`. Leaves `state` untouched on failure.
    fn route_one(
        &self,
        state: &mut LayerState,
        node: NodeId,
        material: MaterialId,
        constraints: &RouteConstraints,
    ) -> Option<(usize, usize)> {
        let demand = self.options.demand_per_target;

        for group in self.grid.slot_layout().groups_for(material) {
            let port = state.port(node, group);
            if state.owner(port) == Some(material) && state.chain_has_room(self.grid, port, demand)
            {
                state.add_demand(port, demand);
                return Some((port, 0));
            }
        }

        let junction = self.search(state, node, material, constraints)?;
        if junction.rank == RANK_INJECTION {
            state.plant_root(junction.terminal, material, junction.root);
        }
        let mut port = junction.terminal;
        for &(parent, child, edge) in &junction.links {
            state.attach(child, parent, edge, material);
            port = child;
        }
        state.add_demand(port, demand);
        Some((port, junction.links.len()))
    }

    fn finalize(
        &self,
        layer: u32,
        state: &LayerState,
        routed: Vec<Routed>,
        mut unroutable: Vec<Unroutable>,
    ) -> RoutingPlan {
        let grid = self.grid;
        let layout = grid.slot_layout();
        let mut paths = Vec::with_capacity(routed.len());
        let mut edge_usage: BTreeMap<EdgeId, EdgeUse> = BTreeMap::new();
        let mut activations: BTreeMap<(NodeId, MaterialId), ValveMask> = BTreeMap::new();

        for r in routed {
            let Some((nodes, edges, root)) = state.path_to_root(r.port) else {
                continue;
            };
            let material = r.target.material;

            for (depth, &e) in edges.iter().enumerate() {
                let use_ = edge_usage.entry(e).or_insert(EdgeUse {
                    edge: e,
                    material,
                    injection: root,
                    flow: state.edge_flow(e),
                    depth: depth as u32,
                    downstream_targets: 0,
                });
                use_.downstream_targets += 1;

                if let Some(edge) = grid.edge(e) {
                    for end in [edge.a, edge.b] {
                        let slot = layout.slot(edge.group, edge.dir_at(end));
                        let mask = activations.entry((end, material)).or_default();
                        *mask = mask.with_slot(slot);
                    }
                }
            }
            let mask = activations.entry((r.node, material)).or_default();
            *mask = mask.with_deposit();

            paths.push(RoutedPath {
                target: r.target,
                target_node: r.node,
                injection: root,
                group: state.port_group(r.port),
                nodes,
                edges,
                new_edges: r.new_edges,
            });
        }

        paths.sort_by_key(|p| (p.target.material, p.target.coord));
        unroutable.sort_by_key(|u| (u.target.coord, u.target.material));

        RoutingPlan {
            layer,
            demand_per_target: self.options.demand_per_target,
            paths,
            unroutable,
            edge_usage,
            activations,
        }
    }
}

impl Router for RoutingPlanner<'_> {
    fn route(&self, targets: &TargetSet, constraints: &RouteConstraints) -> RoutingPlan {
        let (by_material, mut unroutable) = self.screen(targets);
        let mut state = LayerState::new(self.grid);
        let mut routed = Vec::new();

        for (material, mut items) in by_material {
            let hops = self.hops_from_injection(material);
            items.sort_by_key(|(t, n)| (hops[n.idx()], t.coord));

            for (target, node) in items {
                match self.route_one(&mut state, node, material, constraints) {
                    Some((port, new_edges)) => routed.push(Routed {
                        target,
                        node,
                        port,
                        new_edges,
                    }),
                    None => {
                        debug!(layer = targets.layer, coord = %target.coord, %material, "target unreachable");
                        unroutable.push(Unroutable {
                            target,
                            reason: UnroutableReason::Unreachable,
                        });
                    }
                }
            }
        }

        let plan = self.finalize(targets.layer, &state, routed, unroutable);
        info!(
            layer = plan.layer,
            routed = plan.paths.len(),
            unroutable = plan.unroutable.len(),
            channels = plan.edge_usage.len(),
            open_valves = plan.open_valve_count(),
            "routing plan ready"
        );
        plan
    }
}
