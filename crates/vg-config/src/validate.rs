//! Configuration validation.
//!
//! Checks what the schema alone cannot: declared references, value ranges and
//! the version. Topology consistency (injection placement, slot legality) is
//! left to the grid builder.

use std::collections::HashSet;

use crate::schema::{MachineConfig, SlotGroupDef};

pub const LATEST_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn positive(field: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(field, value, "must be positive and finite"));
    }
    Ok(())
}

fn non_negative(field: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(field, value, "must be non-negative and finite"));
    }
    Ok(())
}

pub fn validate_config(config: &MachineConfig) -> Result<(), ValidationError> {
    if config.version == 0 || config.version > LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: config.version,
        });
    }

    let grid = &config.grid;
    if grid.rows == 0 {
        return Err(invalid("grid.rows", grid.rows, "must be non-zero"));
    }
    if grid.cols == 0 {
        return Err(invalid("grid.cols", grid.cols, "must be non-zero"));
    }
    if !matches!(grid.connectivity, 4 | 8) {
        return Err(invalid("grid.connectivity", grid.connectivity, "must be 4 or 8"));
    }
    positive("grid.spacing_mm", grid.spacing_mm)?;
    non_negative("grid.edge_capacity", grid.edge_capacity)?;
    for o in &grid.capacity_overrides {
        non_negative("grid.capacity_overrides.capacity", o.capacity)?;
    }

    let mut materials = HashSet::new();
    for m in &config.materials {
        if !materials.insert(m.id) {
            return Err(ValidationError::DuplicateId {
                id: m.id.to_string(),
                context: "materials".to_string(),
            });
        }
    }
    let known = |id: u8, context: &str| {
        if materials.contains(&id) {
            Ok(())
        } else {
            Err(ValidationError::MissingReference {
                id: id.to_string(),
                context: context.to_string(),
            })
        }
    };

    for group in &grid.slot_groups {
        if let SlotGroupDef::Dedicated { material } = group {
            known(*material, "grid.slot_groups")?;
        }
    }
    for ip in &config.injection_points {
        known(ip.material, "injection_points")?;
        positive("injection_points.supply", ip.supply)?;
    }
    for t in &config.safety.channel_targets_kpa {
        known(t.material, "safety.channel_targets_kpa")?;
        positive("safety.channel_targets_kpa.kpa", t.kpa)?;
        if t.kpa > config.safety.max_pressure_kpa {
            return Err(invalid(
                "safety.channel_targets_kpa.kpa",
                t.kpa,
                "exceeds safety.max_pressure_kpa",
            ));
        }
    }

    if let Some(z) = &config.zones {
        if z.tile_rows == 0 || z.tile_cols == 0 {
            return Err(invalid(
                "zones",
                format!("{}x{}", z.tile_rows, z.tile_cols),
                "tile size must be non-zero",
            ));
        }
    }

    if let Some(ms) = config.valves.response_time_ms {
        positive("valves.response_time_ms", ms)?;
    }

    let r = &config.routing;
    positive("routing.demand_per_target", r.demand_per_target)?;
    non_negative("routing.penalty_weight", r.penalty_weight)?;

    let f = &config.feasibility;
    non_negative("feasibility.channel_resistance_pa_per_mm", f.channel_resistance_pa_per_mm)?;
    non_negative("feasibility.valve_loss_kpa", f.valve_loss_kpa)?;
    positive("feasibility.pressure_tolerance_kpa", f.pressure_tolerance_kpa)?;

    let e = &config.execution;
    if !e.retry_extension.is_finite() || e.retry_extension < 1.0 {
        return Err(invalid("execution.retry_extension", e.retry_extension, "must be >= 1"));
    }
    if e.depth_per_stage == 0 {
        return Err(invalid("execution.depth_per_stage", e.depth_per_stage, "must be non-zero"));
    }
    if e.max_nodes_per_stage == Some(0) {
        return Err(invalid("execution.max_nodes_per_stage", 0, "must be non-zero"));
    }
    if e.event_log_capacity == 0 {
        return Err(invalid("execution.event_log_capacity", 0, "must be non-zero"));
    }

    positive("safety.max_pressure_kpa", config.safety.max_pressure_kpa)?;
    positive(
        "safety.pressure_fault_threshold_kpa",
        config.safety.pressure_fault_threshold_kpa,
    )?;

    Ok(())
}
