//! Error types for schedule compilation and plan exchange.

use thiserror::Error;
use vg_grid::{GridCoord, MaterialId, ValveMask};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Invalid compile option: {what}")]
    InvalidOption { what: &'static str },

    #[error("Injection point {injection} would supply {draw} units, budget is {supply}")]
    SupplyBudgetExceeded {
        injection: usize,
        draw: f64,
        supply: f64,
    },

    #[error("Coordinate {coord} is not on the grid")]
    UnknownCoord { coord: GridCoord },

    #[error("Mask {mask} at {coord} uses slots the grid does not have")]
    InvalidMask { coord: GridCoord, mask: ValveMask },

    #[error("Material {material} at {coord}: {reason}")]
    IllegalActivation {
        coord: GridCoord,
        material: MaterialId,
        reason: &'static str,
    },

    #[error("Unsupported plan format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Layer {layer}: checksum mismatch (expected {expected}, computed {computed})")]
    ChecksumMismatch {
        layer: u32,
        expected: String,
        computed: String,
    },

    #[error("Malformed layer record: {what}")]
    MalformedRecord { what: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
