//! Zone partition: rectangular tiles, each driven by one zone controller.

use serde::{Deserialize, Serialize};
use vg_core::ZoneId;

use crate::coord::GridCoord;
use crate::error::{ConfigError, ConfigResult};

/// Tile size of the zone partition.
///
/// Tiles cover the grid row-major from (0,0); the last row/column of tiles may be
/// smaller. Every node belongs to exactly one zone and every zone is contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneLayout {
    pub tile_rows: u32,
    pub tile_cols: u32,
}

impl ZoneLayout {
    pub fn new(tile_rows: u32, tile_cols: u32) -> Self {
        Self {
            tile_rows,
            tile_cols,
        }
    }

    /// One zone covering the whole grid.
    pub fn single(rows: u32, cols: u32) -> Self {
        Self::new(rows.max(1), cols.max(1))
    }

    pub(crate) fn validate(&self) -> ConfigResult<()> {
        if self.tile_rows == 0 {
            return Err(ConfigError::InvalidZoneLayout {
                what: "tile_rows must be non-zero",
            });
        }
        if self.tile_cols == 0 {
            return Err(ConfigError::InvalidZoneLayout {
                what: "tile_cols must be non-zero",
            });
        }
        Ok(())
    }

    pub(crate) fn tiles_across(&self, cols: u32) -> u32 {
        cols.div_ceil(self.tile_cols)
    }

    pub(crate) fn tiles_down(&self, rows: u32) -> u32 {
        rows.div_ceil(self.tile_rows)
    }

    pub(crate) fn zone_index(&self, coord: GridCoord, cols: u32) -> u32 {
        (coord.row / self.tile_rows) * self.tiles_across(cols) + coord.col / self.tile_cols
    }

    /// Materialize the zone table for a `rows` x `cols` grid.
    pub(crate) fn zones(&self, rows: u32, cols: u32) -> Vec<Zone> {
        let across = self.tiles_across(cols);
        let down = self.tiles_down(rows);
        let mut zones = Vec::with_capacity((across * down) as usize);
        for tr in 0..down {
            for tc in 0..across {
                let origin = GridCoord::new(tr * self.tile_rows, tc * self.tile_cols);
                zones.push(Zone {
                    id: ZoneId::from_index(tr * across + tc),
                    origin,
                    rows: self.tile_rows.min(rows - origin.row),
                    cols: self.tile_cols.min(cols - origin.col),
                });
            }
        }
        zones
    }
}

/// One contiguous rectangular region of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    pub id: ZoneId,
    pub origin: GridCoord,
    pub rows: u32,
    pub cols: u32,
}

impl Zone {
    pub fn contains(&self, coord: GridCoord) -> bool {
        coord.row >= self.origin.row
            && coord.row < self.origin.row + self.rows
            && coord.col >= self.origin.col
            && coord.col < self.origin.col + self.cols
    }

    pub fn node_count(&self) -> usize {
        (self.rows * self.cols) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_cover_ragged_grid() {
        let layout = ZoneLayout::new(2, 3);
        let zones = layout.zones(5, 7);
        assert_eq!(zones.len(), 9);
        let total: usize = zones.iter().map(|z| z.node_count()).sum();
        assert_eq!(total, 35);

        for row in 0..5 {
            for col in 0..7 {
                let c = GridCoord::new(row, col);
                let owners: Vec<_> = zones.iter().filter(|z| z.contains(c)).collect();
                assert_eq!(owners.len(), 1);
                assert_eq!(owners[0].id.index(), layout.zone_index(c, 7));
            }
        }
    }

    #[test]
    fn zero_tile_rejected() {
        assert!(ZoneLayout::new(0, 2).validate().is_err());
        assert!(ZoneLayout::new(2, 0).validate().is_err());
    }
}
