//! Machine configuration schema.

use serde::{Deserialize, Serialize};
use vg_grid::GridCoord;
use vg_schedule::ValveTechnology;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineConfig {
    pub version: u32,
    pub name: String,
    pub grid: GridDef,
    pub materials: Vec<MaterialDef>,
    pub injection_points: Vec<InjectionPointDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<ZoneDef>,
    #[serde(default)]
    pub valves: ValveDef,
    #[serde(default)]
    pub routing: RoutingDef,
    #[serde(default)]
    pub feasibility: FeasibilityDef,
    #[serde(default)]
    pub execution: ExecutionDef,
    #[serde(default)]
    pub safety: SafetyDef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridDef {
    pub rows: u32,
    pub cols: u32,
    #[serde(default = "default_spacing_mm")]
    pub spacing_mm: f64,
    /// 4 or 8 neighbours per node.
    #[serde(default = "default_connectivity")]
    pub connectivity: u8,
    /// Defaults to a single shared group.
    #[serde(default)]
    pub slot_groups: Vec<SlotGroupDef>,
    #[serde(default = "default_edge_capacity")]
    pub edge_capacity: f64,
    #[serde(default)]
    pub capacity_overrides: Vec<CapacityOverrideDef>,
}

fn default_spacing_mm() -> f64 {
    1.0
}

fn default_connectivity() -> u8 {
    4
}

fn default_edge_capacity() -> f64 {
    8.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotGroupDef {
    Shared,
    Dedicated { material: u8 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CapacityOverrideDef {
    pub a: GridCoord,
    pub b: GridCoord,
    pub capacity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaterialDef {
    pub id: u8,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct InjectionPointDef {
    pub coord: GridCoord,
    pub material: u8,
    /// Targets this point can feed per layer.
    pub supply: f64,
}

/// Rectangular zone tiles; omitted means one zone for the whole grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ZoneDef {
    pub tile_rows: u32,
    pub tile_cols: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ValveDef {
    #[serde(default)]
    pub technology: ValveTechnology,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoutingDef {
    pub demand_per_target: f64,
    pub max_retries: u32,
    pub penalty_weight: f64,
}

impl Default for RoutingDef {
    fn default() -> Self {
        Self {
            demand_per_target: 1.0,
            max_retries: 3,
            penalty_weight: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeasibilityDef {
    pub channel_resistance_pa_per_mm: f64,
    pub valve_loss_kpa: f64,
    pub pressure_tolerance_kpa: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_open_valves_per_node: Option<u32>,
}

impl Default for FeasibilityDef {
    fn default() -> Self {
        Self {
            channel_resistance_pa_per_mm: 50.0,
            valve_loss_kpa: 1.0,
            pressure_tolerance_kpa: 250.0,
            max_open_valves_per_node: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionDef {
    pub ack_margin_ms: u64,
    pub retry_extension: f64,
    pub settle_ms: u64,
    pub depth_per_stage: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_nodes_per_stage: Option<usize>,
    /// Coordinator events kept in memory.
    pub event_log_capacity: usize,
}

impl Default for ExecutionDef {
    fn default() -> Self {
        Self {
            ack_margin_ms: 50,
            retry_extension: 2.0,
            settle_ms: 20,
            depth_per_stage: 2,
            max_nodes_per_stage: None,
            event_log_capacity: 16_384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SafetyDef {
    pub max_pressure_kpa: f64,
    pub pressure_fault_threshold_kpa: f64,
    /// Supply pressure per material; empty disables pressure control.
    pub channel_targets_kpa: Vec<ChannelTargetDef>,
}

impl Default for SafetyDef {
    fn default() -> Self {
        Self {
            max_pressure_kpa: 600.0,
            pressure_fault_threshold_kpa: 25.0,
            channel_targets_kpa: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ChannelTargetDef {
    pub material: u8,
    pub kpa: f64,
}
