//! Per-layer target-point sets produced by the slicing stage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use vg_grid::{GridCoord, MaterialId};

/// One grid node requiring deposition of one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub coord: GridCoord,
    pub material: MaterialId,
}

impl Target {
    pub fn new(coord: GridCoord, material: MaterialId) -> Self {
        Self { coord, material }
    }
}

/// The targets of one layer. Read-only input to the planner.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetSet {
    pub layer: u32,
    pub targets: Vec<Target>,
}

impl TargetSet {
    pub fn new(layer: u32) -> Self {
        Self {
            layer,
            targets: Vec::new(),
        }
    }

    pub fn with(mut self, coord: GridCoord, material: MaterialId) -> Self {
        self.push(coord, material);
        self
    }

    pub fn push(&mut self, coord: GridCoord, material: MaterialId) {
        self.targets.push(Target::new(coord, material));
    }

    /// Every node of a `rows` x `cols` grid, one material.
    pub fn full_grid(layer: u32, rows: u32, cols: u32, material: MaterialId) -> Self {
        let mut set = Self::new(layer);
        for row in 0..rows {
            for col in 0..cols {
                set.push(GridCoord::new(row, col), material);
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn materials(&self) -> BTreeSet<MaterialId> {
        self.targets.iter().map(|t| t.material).collect()
    }
}
