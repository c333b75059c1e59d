//! Grid builder: collects configuration, validates it and freezes a `Grid`.

use std::collections::{BTreeMap, BTreeSet};
use vg_core::{EdgeId, NodeId};

use crate::coord::{Connectivity, GridCoord};
use crate::error::{ConfigError, ConfigResult};
use crate::graph::{Edge, Grid, Node};
use crate::slots::{MaterialId, SlotGroup, SlotLayout};
use crate::validate;
use crate::zones::ZoneLayout;

/// Channel capacity used when none is configured.
pub const DEFAULT_EDGE_CAPACITY: f64 = 1_000.0;

/// Builder for a valve grid.
///
/// Configure dimensions, slot layout, materials, injection points and zones,
/// then call `build()` to validate and freeze it into an immutable `Grid`.
#[derive(Debug, Clone)]
pub struct GridBuilder {
    rows: u32,
    cols: u32,
    spacing_mm: f64,
    connectivity: Connectivity,
    groups: Vec<SlotGroup>,
    edge_capacity: f64,
    capacity_overrides: Vec<(GridCoord, GridCoord, f64)>,
    zones: Option<ZoneLayout>,
    materials: BTreeSet<MaterialId>,
    injections: Vec<(GridCoord, MaterialId, f64)>,
}

impl GridBuilder {
    /// A `rows` x `cols` grid, 4-connected, one shared slot group, 1 mm spacing, one zone.
    pub fn new(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            spacing_mm: 1.0,
            connectivity: Connectivity::Four,
            groups: vec![SlotGroup::Shared],
            edge_capacity: DEFAULT_EDGE_CAPACITY,
            capacity_overrides: Vec::new(),
            zones: None,
            materials: BTreeSet::new(),
            injections: Vec::new(),
        }
    }

    pub fn spacing_mm(mut self, spacing_mm: f64) -> Self {
        self.spacing_mm = spacing_mm;
        self
    }

    pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn slot_groups(mut self, groups: Vec<SlotGroup>) -> Self {
        self.groups = groups;
        self
    }

    pub fn edge_capacity(mut self, capacity: f64) -> Self {
        self.edge_capacity = capacity;
        self
    }

    /// Override the capacity of every channel between two adjacent nodes.
    ///
    /// A capacity of zero removes the channel (blocked or absent).
    pub fn capacity_override(mut self, a: GridCoord, b: GridCoord, capacity: f64) -> Self {
        self.capacity_overrides.push((a, b, capacity));
        self
    }

    pub fn zones(mut self, layout: ZoneLayout) -> Self {
        self.zones = Some(layout);
        self
    }

    pub fn material(mut self, material: MaterialId) -> Self {
        self.materials.insert(material);
        self
    }

    pub fn materials(mut self, materials: impl IntoIterator<Item = MaterialId>) -> Self {
        self.materials.extend(materials);
        self
    }

    pub fn injection_point(mut self, coord: GridCoord, material: MaterialId, supply: f64) -> Self {
        self.injections.push((coord, material, supply));
        self
    }

    /// Build and validate the grid.
    pub fn build(self) -> ConfigResult<Grid> {
        validate::validate_dimensions(self.rows, self.cols, self.spacing_mm)?;

        let layout = SlotLayout::new(self.connectivity, self.groups);
        validate::validate_layout(&layout, &self.materials)?;
        validate::validate_edge_count(self.rows, self.cols, &layout)?;

        let zone_layout = self
            .zones
            .unwrap_or_else(|| ZoneLayout::single(self.rows, self.cols));
        zone_layout.validate()?;
        let zones = zone_layout.zones(self.rows, self.cols);

        let overrides = Self::normalize_overrides(
            &self.capacity_overrides,
            self.connectivity,
            self.rows,
            self.cols,
        )?;
        validate::validate_capacity(self.edge_capacity)?;

        let mut nodes = Vec::with_capacity((self.rows * self.cols) as usize);
        for row in 0..self.rows {
            for col in 0..self.cols {
                let coord = GridCoord::new(row, col);
                nodes.push(Node {
                    id: NodeId::from_usize(nodes.len()),
                    coord,
                    zone: zones[zone_layout.zone_index(coord, self.cols) as usize].id,
                });
            }
        }

        let edges = Self::build_edges(
            &nodes,
            &layout,
            self.rows,
            self.cols,
            self.spacing_mm,
            self.edge_capacity,
            &overrides,
        );
        let (node_edge_offsets, node_edges) = Self::build_adjacency(nodes.len(), &edges);

        let injection_points =
            validate::validate_injection(&self.injections, &self.materials, &layout, self.rows, self.cols)?;

        validate::validate_adjacency(&nodes, &edges, &node_edge_offsets, &node_edges)?;

        Ok(Grid {
            rows: self.rows,
            cols: self.cols,
            spacing_mm: self.spacing_mm,
            layout,
            nodes,
            edges,
            node_edge_offsets,
            node_edges,
            injection_points,
            materials: self.materials.into_iter().collect(),
            zones,
        })
    }

    /// Key overrides by the unordered coordinate pair, checking adjacency.
    fn normalize_overrides(
        overrides: &[(GridCoord, GridCoord, f64)],
        connectivity: Connectivity,
        rows: u32,
        cols: u32,
    ) -> ConfigResult<BTreeMap<(GridCoord, GridCoord), f64>> {
        let mut out = BTreeMap::new();
        for &(a, b, capacity) in overrides {
            validate::validate_capacity(capacity)?;
            let adjacent = connectivity
                .directions()
                .iter()
                .any(|&d| a.step(d, rows, cols) == Some(b));
            if !adjacent {
                return Err(ConfigError::CapacityOverrideNotAdjacent { a, b });
            }
            out.insert((a.min(b), a.max(b)), capacity);
        }
        Ok(out)
    }

    fn build_edges(
        nodes: &[Node],
        layout: &SlotLayout,
        rows: u32,
        cols: u32,
        spacing_mm: f64,
        default_capacity: f64,
        overrides: &BTreeMap<(GridCoord, GridCoord), f64>,
    ) -> Vec<Edge> {
        let mut edges = Vec::new();
        for node in nodes {
            for &dir in layout.connectivity.forward_directions() {
                let Some(other) = node.coord.step(dir, rows, cols) else {
                    continue;
                };
                let key = (node.coord.min(other), node.coord.max(other));
                let capacity = overrides.get(&key).copied().unwrap_or(default_capacity);
                if capacity == 0.0 {
                    continue;
                }
                let length_mm = if dir.is_diagonal() {
                    spacing_mm * std::f64::consts::SQRT_2
                } else {
                    spacing_mm
                };
                let b = NodeId::from_index(other.row * cols + other.col);
                for (g, group) in layout.groups.iter().enumerate() {
                    edges.push(Edge {
                        id: EdgeId::from_usize(edges.len()),
                        a: node.id,
                        b,
                        dir,
                        group: g as u8,
                        capacity,
                        material: group.dedicated_material(),
                        length_mm,
                    });
                }
            }
        }
        edges
    }

    /// Build compact adjacency lists: for each node, its incident edges sorted by id.
    fn build_adjacency(node_count: usize, edges: &[Edge]) -> (Vec<usize>, Vec<EdgeId>) {
        let mut per_node: Vec<Vec<EdgeId>> = vec![Vec::new(); node_count];
        for edge in edges {
            per_node[edge.a.idx()].push(edge.id);
            per_node[edge.b.idx()].push(edge.id);
        }

        let mut offsets = Vec::with_capacity(node_count + 1);
        let mut flat = Vec::with_capacity(edges.len() * 2);
        offsets.push(0);
        for mut list in per_node {
            list.sort();
            flat.extend_from_slice(&list);
            offsets.push(flat.len());
        }
        (offsets, flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Direction;

    fn single_material() -> GridBuilder {
        GridBuilder::new(4, 4)
            .material(MaterialId(0))
            .injection_point(GridCoord::new(0, 0), MaterialId(0), 16.0)
    }

    #[test]
    fn builder_basic_counts() {
        let grid = single_material().build().unwrap();
        assert_eq!(grid.node_count(), 16);
        // 4 rows x 3 horizontal + 3 x 4 vertical
        assert_eq!(grid.edge_count(), 24);
        assert_eq!(grid.valve_count(), 64);
        assert_eq!(grid.zones().len(), 1);
    }

    #[test]
    fn eight_connected_adds_diagonals() {
        let grid = single_material()
            .connectivity(Connectivity::Eight)
            .build()
            .unwrap();
        // 24 cardinal + 2 * 3 * 3 diagonal
        assert_eq!(grid.edge_count(), 42);
        let diag = grid.edges().iter().find(|e| e.dir == Direction::SE).unwrap();
        assert!((diag.length_mm - std::f64::consts::SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn slot_groups_multiply_channels() {
        let grid = single_material()
            .slot_groups(vec![SlotGroup::Shared, SlotGroup::Dedicated(MaterialId(0))])
            .build()
            .unwrap();
        assert_eq!(grid.edge_count(), 48);
        assert_eq!(grid.slot_layout().slot_count(), 8);
    }

    #[test]
    fn zero_capacity_override_removes_channel() {
        let grid = single_material()
            .capacity_override(GridCoord::new(0, 0), GridCoord::new(0, 1), 0.0)
            .build()
            .unwrap();
        assert_eq!(grid.edge_count(), 23);
        let a = grid.node_at(GridCoord::new(0, 0)).unwrap();
        let b = grid.node_at(GridCoord::new(0, 1)).unwrap();
        assert!(grid.edge_between(a, b, 0).is_none());
        assert_eq!(grid.incident_edges(a).len(), 1);
    }

    #[test]
    fn override_order_does_not_matter() {
        let grid = single_material()
            .capacity_override(GridCoord::new(1, 1), GridCoord::new(0, 1), 3.0)
            .build()
            .unwrap();
        let a = grid.node_at(GridCoord::new(0, 1)).unwrap();
        let b = grid.node_at(GridCoord::new(1, 1)).unwrap();
        assert_eq!(grid.edge_between(b, a, 0).unwrap().capacity, 3.0);
    }

    #[test]
    fn non_adjacent_override_rejected() {
        let err = single_material()
            .capacity_override(GridCoord::new(0, 0), GridCoord::new(2, 0), 1.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::CapacityOverrideNotAdjacent { .. }));
    }
}
