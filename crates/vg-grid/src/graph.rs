//! Core topology data structures.

use vg_core::{EdgeId, NodeId, ZoneId};

use crate::coord::{Direction, GridCoord};
use crate::slots::{MaterialId, SlotLayout};
use crate::zones::Zone;

/// A grid node. Its id is the row-major index of its coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub coord: GridCoord,
    pub zone: ZoneId,
}

/// A channel between two adjacent nodes through one slot group.
///
/// The channel uses slot `(group, dir)` at `a` and `(group, dir.opposite())` at `b`.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub a: NodeId,
    pub b: NodeId,
    /// Direction from `a` to `b`.
    pub dir: Direction,
    pub group: u8,
    /// Maximum sustainable flow (demand units).
    pub capacity: f64,
    /// Dedicated material, or `None` when the slot group is shared.
    pub material: Option<MaterialId>,
    pub length_mm: f64,
}

impl Edge {
    /// The endpoint that is not `node`.
    pub fn other(&self, node: NodeId) -> NodeId {
        if node == self.a { self.b } else { self.a }
    }

    /// Direction of the slot this edge occupies at `node`.
    pub fn dir_at(&self, node: NodeId) -> Direction {
        if node == self.a {
            self.dir
        } else {
            self.dir.opposite()
        }
    }

    pub fn accepts(&self, material: MaterialId) -> bool {
        self.material.is_none_or(|m| m == material)
    }
}

/// Sole network entry of one material at one node.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectionPoint {
    /// Position in `Grid::injection_points()`; the tie-break order between sources.
    pub index: usize,
    pub node: NodeId,
    pub coord: GridCoord,
    pub material: MaterialId,
    /// Supply capacity in demand units.
    pub supply: f64,
}

/// The valve network: a validated, immutable grid of nodes and channels.
///
/// Nodes, edges and zones live in flat arrays addressed by integer id. Node
/// adjacency is stored compactly: node i's channels are
/// `node_edges[node_edge_offsets[i]..node_edge_offsets[i + 1]]`.
/// Read-only after `GridBuilder::build`, so it is shared freely across threads.
#[derive(Debug, Clone)]
pub struct Grid {
    pub(crate) rows: u32,
    pub(crate) cols: u32,
    pub(crate) spacing_mm: f64,
    pub(crate) layout: SlotLayout,
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) node_edge_offsets: Vec<usize>,
    pub(crate) node_edges: Vec<EdgeId>,
    pub(crate) injection_points: Vec<InjectionPoint>,
    pub(crate) materials: Vec<MaterialId>,
    pub(crate) zones: Vec<Zone>,
}

impl Grid {
    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn spacing_mm(&self) -> f64 {
        self.spacing_mm
    }

    pub fn slot_layout(&self) -> &SlotLayout {
        &self.layout
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Total number of directional valves in the network.
    pub fn valve_count(&self) -> usize {
        self.nodes.len() * self.layout.slot_count()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn materials(&self) -> &[MaterialId] {
        &self.materials
    }

    pub fn has_material(&self, material: MaterialId) -> bool {
        self.materials.binary_search(&material).is_ok()
    }

    pub fn contains(&self, coord: GridCoord) -> bool {
        coord.row < self.rows && coord.col < self.cols
    }

    /// Node lookup by coordinate.
    pub fn node_at(&self, coord: GridCoord) -> Option<NodeId> {
        if !self.contains(coord) {
            return None;
        }
        Some(NodeId::from_index(coord.row * self.cols + coord.col))
    }

    /// Get a node by ID (returns None if ID out of bounds).
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.idx())
    }

    /// Coordinate of a node id produced by this grid.
    pub fn coord(&self, id: NodeId) -> GridCoord {
        let i = id.index();
        GridCoord::new(i / self.cols, i % self.cols)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.idx())
    }

    /// Channels incident to a node, sorted by edge id.
    pub fn incident_edges(&self, node: NodeId) -> &[EdgeId] {
        let idx = node.idx();
        if idx >= self.nodes.len() {
            return &[];
        }
        &self.node_edges[self.node_edge_offsets[idx]..self.node_edge_offsets[idx + 1]]
    }

    /// Neighbours of `node` with the channel that reaches them.
    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = (&Edge, NodeId)> + '_ {
        self.incident_edges(node).iter().map(move |&e| {
            let edge = &self.edges[e.idx()];
            (edge, edge.other(node))
        })
    }

    /// Channel between `a` and `b` in slot group `group`, if one exists.
    pub fn edge_between(&self, a: NodeId, b: NodeId, group: u8) -> Option<&Edge> {
        self.neighbors(a)
            .find(|(e, other)| *other == b && e.group == group)
            .map(|(e, _)| e)
    }

    pub fn zone_of(&self, node: NodeId) -> Option<ZoneId> {
        self.node(node).map(|n| n.zone)
    }

    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(id.idx())
    }

    pub fn zone_nodes(&self, zone: ZoneId) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().filter(move |n| n.zone == zone)
    }

    pub fn injection_points(&self) -> &[InjectionPoint] {
        &self.injection_points
    }

    pub fn injection_points_for(
        &self,
        material: MaterialId,
    ) -> impl Iterator<Item = &InjectionPoint> + '_ {
        self.injection_points
            .iter()
            .filter(move |p| p.material == material)
    }

    /// Injection point of `material` at `node`, if any.
    pub fn injection_at(&self, node: NodeId, material: MaterialId) -> Option<&InjectionPoint> {
        self.injection_points
            .iter()
            .find(|p| p.node == node && p.material == material)
    }
}
