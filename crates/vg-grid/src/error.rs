//! Topology configuration errors.

use thiserror::Error;

use crate::coord::GridCoord;
use crate::slots::MaterialId;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Inconsistent grid configuration. Fatal, raised only while building a `Grid`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Grid dimension {what} must be non-zero")]
    ZeroDimension { what: &'static str },

    #[error("Grid of {rows}x{cols} nodes exceeds the addressable node/channel count")]
    GridTooLarge { rows: u32, cols: u32 },

    #[error("Grid spacing must be positive and finite (got {value})")]
    InvalidSpacing { value: f64 },

    #[error("Valve layout has no slots")]
    NoValveSlots,

    #[error("Valve layout has {count} slots per node (maximum {max})")]
    TooManySlots { count: usize, max: usize },

    #[error("Channel capacity must be non-negative and finite (got {value})")]
    InvalidCapacity { value: f64 },

    #[error("Capacity override between {a} and {b} does not name adjacent nodes")]
    CapacityOverrideNotAdjacent { a: GridCoord, b: GridCoord },

    #[error("Invalid zone layout: {what}")]
    InvalidZoneLayout { what: &'static str },

    #[error("Material {material} referenced by {context} is not declared")]
    UnknownMaterial {
        material: MaterialId,
        context: &'static str,
    },

    #[error("Material {material} has no injection point")]
    MissingInjectionPoint { material: MaterialId },

    #[error("Injection point {coord} lies outside the grid")]
    InjectionOutOfBounds { coord: GridCoord },

    #[error("No valve slot group at {coord} can carry material {material}")]
    InjectionNotCarried {
        material: MaterialId,
        coord: GridCoord,
    },

    #[error("Injection points at {coord} feed different materials through the same slot group")]
    InjectionConflict { coord: GridCoord },

    #[error("Injection point {coord} has invalid supply capacity {value}")]
    InvalidSupply { coord: GridCoord, value: f64 },

    #[error("Inconsistent topology: {what}")]
    Inconsistent { what: String },
}
