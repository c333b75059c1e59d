//! Compiled schedule: stages of per-zone commands separated by barriers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use vg_core::{NodeId, ZoneId};
use vg_grid::{Grid, GridCoord, MaterialId, ValveMask};

use crate::error::{ScheduleError, ScheduleResult};
use crate::hash::pattern_hash;

/// What a stage opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Channels shared by several targets.
    Trunk,
    /// Channels leading to a single target.
    Branch,
    /// Deposition outlets.
    Deposit,
}

/// Cumulative valve state of one material at one node after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    pub node: NodeId,
    pub coord: GridCoord,
    pub material: MaterialId,
    pub mask: ValveMask,
}

/// Target valve state for one node, across all materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeCommit {
    pub node: NodeId,
    pub coord: GridCoord,
    pub mask: ValveMask,
}

/// Valve states one zone must commit for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionCommand {
    pub layer: u32,
    pub stage: u32,
    pub zone: ZoneId,
    pub commits: Vec<NodeCommit>,
}

/// Zones whose confirmation gates the next stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barrier {
    pub stage: u32,
    pub zones: Vec<ZoneId>,
}

impl Barrier {
    pub fn requires(&self, zone: ZoneId) -> bool {
        self.zones.binary_search(&zone).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    /// Expected start relative to the layer start.
    pub offset: Duration,
    /// Expected valve response; sizes the barrier timeout.
    pub valve_response: Duration,
    pub settle: Duration,
}

impl StageTiming {
    pub fn expected_end(&self) -> Duration {
        self.offset + self.valve_response + self.settle
    }
}

/// Stage contents before zone partitioning.
#[derive(Debug, Clone)]
pub(crate) struct StageDraft {
    pub kind: StageKind,
    pub activations: Vec<Activation>,
    pub valve_response: Duration,
    pub settle: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub index: u32,
    pub kind: StageKind,
    pub activations: Vec<Activation>,
    /// One command per addressed zone, ordered by zone id.
    pub commands: Vec<ExecutionCommand>,
    pub barrier: Barrier,
    pub timing: StageTiming,
}

impl Stage {
    pub fn command_for(&self, zone: ZoneId) -> Option<&ExecutionCommand> {
        self.commands.iter().find(|c| c.zone == zone)
    }

    pub fn node_count(&self) -> usize {
        self.commands.iter().map(|c| c.commits.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleStats {
    pub active_nodes: usize,
    pub open_valves: usize,
    pub multi_material: bool,
    /// Content hash of the final valve pattern.
    pub pattern_hash: String,
    pub expected_duration: Duration,
}

/// Executable schedule for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub layer: u32,
    pub stages: Vec<Stage>,
    /// Node masks once every stage has committed.
    pub final_masks: BTreeMap<NodeId, ValveMask>,
    pub stats: ScheduleStats,
}

impl Schedule {
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn barrier_count(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Every zone addressed by any stage.
    pub fn zones(&self) -> Vec<ZoneId> {
        let mut zones: Vec<ZoneId> = self
            .stages
            .iter()
            .flat_map(|s| s.barrier.zones.iter().copied())
            .collect();
        zones.sort();
        zones.dedup();
        zones
    }

    /// Partition stage activations by zone and derive cumulative node commits.
    pub(crate) fn assemble(
        layer: u32,
        drafts: Vec<StageDraft>,
        grid: &Grid,
    ) -> ScheduleResult<Schedule> {
        let mut node_masks: BTreeMap<NodeId, ValveMask> = BTreeMap::new();
        let mut stages = Vec::with_capacity(drafts.len());
        let mut offset = Duration::ZERO;

        for (index, draft) in drafts.into_iter().enumerate() {
            let index = index as u32;
            let StageDraft {
                kind,
                activations,
                valve_response,
                settle,
            } = draft;
            let mut by_zone: BTreeMap<ZoneId, Vec<NodeId>> = BTreeMap::new();
            for a in &activations {
                let zone = grid
                    .zone_of(a.node)
                    .ok_or(ScheduleError::UnknownCoord { coord: a.coord })?;
                let entry = node_masks.entry(a.node).or_default();
                *entry = entry.union(a.mask);
                by_zone.entry(zone).or_default().push(a.node);
            }

            let commands: Vec<ExecutionCommand> = by_zone
                .into_iter()
                .map(|(zone, mut nodes)| {
                    nodes.sort();
                    nodes.dedup();
                    let commits = nodes
                        .into_iter()
                        .map(|node| NodeCommit {
                            node,
                            coord: grid.coord(node),
                            mask: node_masks.get(&node).copied().unwrap_or_default(),
                        })
                        .collect();
                    ExecutionCommand {
                        layer,
                        stage: index,
                        zone,
                        commits,
                    }
                })
                .collect();

            let barrier = Barrier {
                stage: index,
                zones: commands.iter().map(|c| c.zone).collect(),
            };
            let timing = StageTiming {
                offset,
                valve_response,
                settle,
            };
            offset = timing.expected_end();
            stages.push(Stage {
                index,
                kind,
                activations,
                commands,
                barrier,
                timing,
            });
        }

        let multi_material = {
            let mut materials: Vec<MaterialId> = stages
                .iter()
                .flat_map(|s| s.activations.iter().map(|a| a.material))
                .collect();
            materials.sort();
            materials.dedup();
            materials.len() > 1
        };
        let stats = ScheduleStats {
            active_nodes: node_masks.len(),
            open_valves: node_masks.values().map(|m| m.open_slots() as usize).sum(),
            multi_material,
            pattern_hash: pattern_hash(&node_masks),
            expected_duration: offset,
        };

        Ok(Schedule {
            layer,
            stages,
            final_masks: node_masks,
            stats,
        })
    }
}
