//! vg-core: stable foundation for the valve-grid workspace.
//!
//! Contains:
//! - ids (compact ids for nodes, edges and zones)
//! - error (shared error type)
//! - numeric (Real + tolerances + float helpers)
//! - units (uom SI pressure helpers)
//! - timing (wall-clock timers reported through tracing)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;
pub mod units;

pub use error::{VgError, VgResult};
pub use ids::*;
pub use numeric::*;
pub use units::*;
