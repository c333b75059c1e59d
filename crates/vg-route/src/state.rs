//! Mutable per-layer routing state: ownership of node slot groups and channel flows.
//!
//! A port is one slot group at one node (`node * groups + group`). A port is
//! owned by at most one material per layer; owned ports of a material form a
//! forest whose links point towards the injection point at the root.

use vg_core::{EdgeId, NodeId, Tolerances, le_with_tol};
use vg_grid::{Grid, MaterialId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Link {
    /// Parent port and the channel leading to it; `None` at the injection point.
    pub up: Option<(usize, EdgeId)>,
    /// Injection point index of the tree.
    pub root: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct LayerState {
    groups: usize,
    owner: Vec<Option<MaterialId>>,
    links: Vec<Option<Link>>,
    edge_owner: Vec<Option<MaterialId>>,
    edge_flow: Vec<f64>,
    tol: Tolerances,
}

impl LayerState {
    pub fn new(grid: &Grid) -> Self {
        let groups = grid.slot_layout().group_count();
        let ports = grid.node_count() * groups;
        Self {
            groups,
            owner: vec![None; ports],
            links: vec![None; ports],
            edge_owner: vec![None; grid.edge_count()],
            edge_flow: vec![0.0; grid.edge_count()],
            tol: Tolerances::default(),
        }
    }

    pub fn port(&self, node: NodeId, group: u8) -> usize {
        node.idx() * self.groups + group as usize
    }

    pub fn port_node(&self, port: usize) -> NodeId {
        NodeId::from_usize(port / self.groups)
    }

    pub fn port_group(&self, port: usize) -> u8 {
        (port % self.groups) as u8
    }

    pub fn owner(&self, port: usize) -> Option<MaterialId> {
        self.owner[port]
    }

    pub fn link(&self, port: usize) -> Option<Link> {
        self.links[port]
    }

    pub fn edge_owner(&self, edge: EdgeId) -> Option<MaterialId> {
        self.edge_owner[edge.idx()]
    }

    pub fn edge_flow(&self, edge: EdgeId) -> f64 {
        self.edge_flow[edge.idx()]
    }

    pub fn fits(&self, flow: f64, capacity: f64) -> bool {
        le_with_tol(flow, capacity, self.tol)
    }

    /// Every channel from `port` up to its injection point can carry `demand` more.
    pub fn chain_has_room(&self, grid: &Grid, port: usize, demand: f64) -> bool {
        let mut cur = self.links[port];
        while let Some(Link {
            up: Some((parent, edge)),
            ..
        }) = cur
        {
            let capacity = grid.edge(edge).map_or(0.0, |e| e.capacity);
            if !self.fits(self.edge_flow[edge.idx()] + demand, capacity) {
                return false;
            }
            cur = self.links[parent];
        }
        true
    }

    pub fn plant_root(&mut self, port: usize, material: MaterialId, root: usize) {
        self.owner[port] = Some(material);
        self.links[port] = Some(Link { up: None, root });
    }

    /// Hang `child` below `parent` through `edge`. `parent` must already be owned.
    pub fn attach(&mut self, child: usize, parent: usize, edge: EdgeId, material: MaterialId) {
        let root = self.links[parent].map_or(usize::MAX, |l| l.root);
        debug_assert_ne!(root, usize::MAX, "parent port has no tree link");
        self.owner[child] = Some(material);
        self.links[child] = Some(Link {
            up: Some((parent, edge)),
            root,
        });
        self.edge_owner[edge.idx()] = Some(material);
    }

    /// Add `demand` to every channel between `port` and its injection point.
    pub fn add_demand(&mut self, port: usize, demand: f64) {
        let mut cur = self.links[port];
        while let Some(Link {
            up: Some((parent, edge)),
            ..
        }) = cur
        {
            self.edge_flow[edge.idx()] += demand;
            cur = self.links[parent];
        }
    }

    /// Nodes and channels from the injection point down to `port`, plus the root index.
    pub fn path_to_root(&self, port: usize) -> Option<(Vec<NodeId>, Vec<EdgeId>, usize)> {
        let root = self.links[port]?.root;
        let mut nodes = vec![self.port_node(port)];
        let mut edges = Vec::new();
        let mut cur = self.links[port];
        while let Some(Link {
            up: Some((parent, edge)),
            ..
        }) = cur
        {
            nodes.push(self.port_node(parent));
            edges.push(edge);
            cur = self.links[parent];
        }
        nodes.reverse();
        edges.reverse();
        Some((nodes, edges, root))
    }
}
