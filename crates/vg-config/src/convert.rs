//! Conversion from configuration into the runtime option structs.

use std::time::Duration;

use tracing::debug;
use vg_core::kpa;
use vg_exec::{CoordinatorConfig, PressurePolicy};
use vg_feasibility::{FeasibilityLimits, RefineOptions};
use vg_grid::{Connectivity, Grid, GridBuilder, MaterialId, SlotGroup, ZoneLayout};
use vg_route::RouteOptions;
use vg_schedule::CompileOptions;

use crate::ConfigFileResult;
use crate::schema::{MachineConfig, SlotGroupDef};

impl MachineConfig {
    /// Build and validate the grid topology.
    pub fn build_grid(&self) -> ConfigFileResult<Grid> {
        let g = &self.grid;
        let connectivity = if g.connectivity == 8 {
            Connectivity::Eight
        } else {
            Connectivity::Four
        };
        let groups = if g.slot_groups.is_empty() {
            vec![SlotGroup::Shared]
        } else {
            g.slot_groups
                .iter()
                .map(|def| match *def {
                    SlotGroupDef::Shared => SlotGroup::Shared,
                    SlotGroupDef::Dedicated { material } => {
                        SlotGroup::Dedicated(MaterialId(material))
                    }
                })
                .collect()
        };

        let mut builder = GridBuilder::new(g.rows, g.cols)
            .spacing_mm(g.spacing_mm)
            .connectivity(connectivity)
            .slot_groups(groups)
            .edge_capacity(g.edge_capacity)
            .materials(self.materials.iter().map(|m| MaterialId(m.id)));
        for o in &g.capacity_overrides {
            builder = builder.capacity_override(o.a, o.b, o.capacity);
        }
        if let Some(z) = self.zones {
            builder = builder.zones(ZoneLayout::new(z.tile_rows, z.tile_cols));
        }
        for ip in &self.injection_points {
            builder = builder.injection_point(ip.coord, MaterialId(ip.material), ip.supply);
        }

        let grid = builder.build()?;
        debug!(
            name = %self.name,
            nodes = grid.node_count(),
            edges = grid.edge_count(),
            zones = grid.zones().len(),
            "grid built from configuration"
        );
        Ok(grid)
    }

    pub fn route_options(&self) -> RouteOptions {
        RouteOptions {
            demand_per_target: self.routing.demand_per_target,
        }
    }

    pub fn refine_options(&self) -> RefineOptions {
        RefineOptions {
            max_retries: self.routing.max_retries,
            penalty_weight: self.routing.penalty_weight,
        }
    }

    pub fn feasibility_limits(&self) -> FeasibilityLimits {
        let f = &self.feasibility;
        FeasibilityLimits {
            channel_resistance_pa_per_unit_mm: f.channel_resistance_pa_per_mm,
            valve_loss: kpa(f.valve_loss_kpa),
            pressure_tolerance: kpa(f.pressure_tolerance_kpa),
            max_open_valves_per_node: f.max_open_valves_per_node,
        }
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            technology: self.valves.technology,
            response_override: self
                .valves
                .response_time_ms
                .map(|ms| Duration::from_secs_f64(ms / 1e3)),
            settle: Duration::from_millis(self.execution.settle_ms),
            depth_per_stage: self.execution.depth_per_stage,
            max_nodes_per_stage: self.execution.max_nodes_per_stage,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let safety = &self.safety;
        let pressure = (!safety.channel_targets_kpa.is_empty()).then(|| PressurePolicy {
            targets: safety
                .channel_targets_kpa
                .iter()
                .map(|t| (MaterialId(t.material), kpa(t.kpa)))
                .collect(),
            fault_threshold: kpa(safety.pressure_fault_threshold_kpa),
            max_pressure: kpa(safety.max_pressure_kpa),
        });
        CoordinatorConfig {
            ack_margin: Duration::from_millis(self.execution.ack_margin_ms),
            retry_extension: self.execution.retry_extension,
            pressure,
            event_capacity: self.execution.event_log_capacity,
        }
    }
}
