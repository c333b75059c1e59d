//! vg-grid: topology model for the valve network.
//!
//! Provides:
//! - Grid coordinates, directions and per-node valve slot layout
//! - Edges (channels) with capacity and material legality
//! - Injection points and the zone partition
//! - A builder that validates configuration and freezes an immutable `Grid`
//!
//! # Example
//!
//! ```
//! use vg_grid::{GridBuilder, GridCoord, MaterialId};
//!
//! let grid = GridBuilder::new(4, 4)
//!     .material(MaterialId(0))
//!     .injection_point(GridCoord::new(0, 0), MaterialId(0), 16.0)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(grid.node_count(), 16);
//! assert_eq!(grid.edge_count(), 24);
//! ```

pub mod builder;
pub mod coord;
pub mod error;
pub mod graph;
pub mod slots;
pub(crate) mod validate;
pub mod zones;

// Re-exports for ergonomics
pub use builder::GridBuilder;
pub use coord::{Connectivity, Direction, GridCoord};
pub use error::{ConfigError, ConfigResult};
pub use graph::{Edge, Grid, InjectionPoint, Node};
pub use slots::{MaterialId, SlotGroup, SlotLayout, ValveMask, MAX_SLOTS};
pub use zones::{Zone, ZoneLayout};
