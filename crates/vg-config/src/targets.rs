//! Per-layer target documents.

use serde::{Deserialize, Serialize};
use vg_grid::{Grid, GridCoord, MaterialId};
use vg_route::TargetSet;

use crate::validate::ValidationError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TargetDef {
    pub coord: GridCoord,
    pub material: u8,
}

/// Targets of one layer, listed or as a full-grid fill.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetSetDef {
    pub layer: u32,
    /// Deposit this material at every node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<u8>,
    #[serde(default)]
    pub targets: Vec<TargetDef>,
}

impl TargetSetDef {
    pub fn to_target_set(&self, grid: &Grid) -> Result<TargetSet, ValidationError> {
        if self.fill.is_some() && !self.targets.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "fill".to_string(),
                value: format!("{:?}", self.fill),
                reason: "cannot be combined with explicit targets".to_string(),
            });
        }
        if let Some(m) = self.fill {
            return Ok(TargetSet::full_grid(
                self.layer,
                grid.rows(),
                grid.cols(),
                MaterialId(m),
            ));
        }
        let mut set = TargetSet::new(self.layer);
        for t in &self.targets {
            set.push(t.coord, MaterialId(t.material));
        }
        Ok(set)
    }
}
