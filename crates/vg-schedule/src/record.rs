//! Plan exchange format: versioned, checksummed layer records.
//!
//! A layer record lists activation entries in stage order. Each stage record
//! names the first entry of its stage; the stage runs up to the next stage's
//! first entry. The checksum covers the activation entries only. Stage
//! timings are stored in nanoseconds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use vg_core::NodeId;
use vg_grid::{Grid, GridCoord, MAX_SLOTS, MaterialId, ValveMask};

use crate::error::{ScheduleError, ScheduleResult};
use crate::hash::activation_checksum;
use crate::schedule::{Activation, Schedule, StageKind, StageDraft};

pub const FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationEntry {
    pub coord: GridCoord,
    pub material: MaterialId,
    pub mask: ValveMask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub kind: StageKind,
    /// Index of the stage's first activation entry.
    pub start: usize,
    pub response_ns: u64,
    pub settle_ns: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub layer: u32,
    pub entries: Vec<ActivationEntry>,
    pub stages: Vec<StageRecord>,
    pub pattern_hash: String,
    pub checksum: String,
}

impl LayerRecord {
    pub fn from_schedule(schedule: &Schedule) -> Self {
        let mut entries = Vec::new();
        let mut stages = Vec::with_capacity(schedule.stages.len());
        for stage in &schedule.stages {
            stages.push(StageRecord {
                kind: stage.kind,
                start: entries.len(),
                response_ns: nanos(stage.timing.valve_response),
                settle_ns: nanos(stage.timing.settle),
            });
            entries.extend(stage.activations.iter().map(|a| ActivationEntry {
                coord: a.coord,
                material: a.material,
                mask: a.mask,
            }));
        }
        let checksum = activation_checksum(&entries);
        Self {
            layer: schedule.layer,
            entries,
            stages,
            pattern_hash: schedule.stats.pattern_hash.clone(),
            checksum,
        }
    }

    /// Check the checksum and stage boundaries.
    pub fn verify(&self) -> ScheduleResult<()> {
        let computed = activation_checksum(&self.entries);
        if computed != self.checksum {
            return Err(ScheduleError::ChecksumMismatch {
                layer: self.layer,
                expected: self.checksum.clone(),
                computed,
            });
        }
        let mut prev: Option<usize> = None;
        for s in &self.stages {
            let ordered = match prev {
                None => s.start == 0,
                Some(p) => s.start > p,
            };
            if !ordered || s.start >= self.entries.len() {
                return Err(ScheduleError::MalformedRecord {
                    what: format!("layer {}: stage boundary {} out of order", self.layer, s.start),
                });
            }
            prev = Some(s.start);
        }
        if self.stages.is_empty() && !self.entries.is_empty() {
            return Err(ScheduleError::MalformedRecord {
                what: format!("layer {}: entries without stages", self.layer),
            });
        }
        Ok(())
    }

    /// Rebuild an executable schedule on `grid`.
    pub fn to_schedule(&self, grid: &Grid) -> ScheduleResult<Schedule> {
        self.verify()?;
        let slots = grid.slot_layout().slot_count();
        let allowed = ((1u32 << slots) - 1) | (1u32 << MAX_SLOTS);

        let mut port_owner = BTreeMap::new();
        let mut drafts = Vec::with_capacity(self.stages.len());
        for (i, s) in self.stages.iter().enumerate() {
            let end = self
                .stages
                .get(i + 1)
                .map_or(self.entries.len(), |next| next.start);
            let mut activations = Vec::with_capacity(end - s.start);
            for e in &self.entries[s.start..end] {
                let node = grid
                    .node_at(e.coord)
                    .ok_or(ScheduleError::UnknownCoord { coord: e.coord })?;
                if e.mask.0 & !allowed != 0 {
                    return Err(ScheduleError::InvalidMask {
                        coord: e.coord,
                        mask: e.mask,
                    });
                }
                check_channels(grid, node, e, &mut port_owner)?;
                activations.push(Activation {
                    node,
                    coord: e.coord,
                    material: e.material,
                    mask: e.mask,
                });
            }
            drafts.push(StageDraft {
                kind: s.kind,
                activations,
                valve_response: Duration::from_nanos(s.response_ns),
                settle: Duration::from_nanos(s.settle_ns),
            });
        }
        Schedule::assemble(self.layer, drafts, grid)
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Every open channel slot of `entry` must lead to a channel of the grid in a
/// group that carries the entry's material. A slot group at a node carries at
/// most one material per layer.
fn check_channels(
    grid: &Grid,
    node: NodeId,
    entry: &ActivationEntry,
    port_owner: &mut BTreeMap<(NodeId, u8), MaterialId>,
) -> ScheduleResult<()> {
    let layout = grid.slot_layout();
    let dirs = layout.connectivity.directions();
    let illegal = |reason: &'static str| ScheduleError::IllegalActivation {
        coord: entry.coord,
        material: entry.material,
        reason,
    };
    for slot in (0..layout.slot_count() as u8).filter(|&s| entry.mask.is_slot_open(s)) {
        let group = slot / dirs.len() as u8;
        let dir = dirs[usize::from(slot) % dirs.len()];
        if !layout.groups[usize::from(group)].accepts(entry.material) {
            return Err(illegal("slot group is dedicated to another material"));
        }
        let edge = entry
            .coord
            .step(dir, grid.rows(), grid.cols())
            .and_then(|c| grid.node_at(c))
            .and_then(|other| grid.edge_between(node, other, group))
            .ok_or_else(|| illegal("open slot has no channel"))?;
        if !edge.accepts(entry.material) {
            return Err(illegal("channel is dedicated to another material"));
        }
        let owner = *port_owner.entry((node, group)).or_insert(entry.material);
        if owner != entry.material {
            return Err(illegal("slot group already carries another material"));
        }
    }
    Ok(())
}

/// A sequence of layer records for one grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFile {
    pub format_version: u32,
    pub created_at: String,
    pub rows: u32,
    pub cols: u32,
    pub layers: Vec<LayerRecord>,
}

impl PlanFile {
    pub fn new(grid: &Grid) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            created_at: chrono::Utc::now().to_rfc3339(),
            rows: grid.rows(),
            cols: grid.cols(),
            layers: Vec::new(),
        }
    }

    pub fn push(&mut self, schedule: &Schedule) {
        self.layers.push(LayerRecord::from_schedule(schedule));
    }

    pub fn layer(&self, layer: u32) -> Option<&LayerRecord> {
        self.layers.iter().find(|r| r.layer == layer)
    }

    /// Version and per-layer checksums.
    pub fn verify(&self) -> ScheduleResult<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(ScheduleError::UnsupportedVersion {
                found: self.format_version,
                expected: FORMAT_VERSION,
            });
        }
        self.layers.iter().try_for_each(LayerRecord::verify)
    }

    /// Records must have been produced for a grid of the same shape.
    pub fn check_grid(&self, grid: &Grid) -> ScheduleResult<()> {
        if self.rows != grid.rows() || self.cols != grid.cols() {
            return Err(ScheduleError::MalformedRecord {
                what: format!(
                    "plan is for a {}x{} grid, configured grid is {}x{}",
                    self.rows,
                    self.cols,
                    grid.rows(),
                    grid.cols()
                ),
            });
        }
        Ok(())
    }

    pub fn to_schedules(&self, grid: &Grid) -> ScheduleResult<Vec<Schedule>> {
        self.check_grid(grid)?;
        self.layers.iter().map(|r| r.to_schedule(grid)).collect()
    }

    pub fn to_json(&self) -> ScheduleResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode and verify.
    pub fn from_json(input: &str) -> ScheduleResult<Self> {
        let file: PlanFile = serde_json::from_str(input)?;
        file.verify()?;
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> ScheduleResult<()> {
        std::fs::write(path, self.to_json()?)?;
        debug!(path = %path.display(), layers = self.layers.len(), "plan file written");
        Ok(())
    }

    pub fn load(path: &Path) -> ScheduleResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
