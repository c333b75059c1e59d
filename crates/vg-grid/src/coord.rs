//! Grid coordinates and neighbour directions.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Integer (row, column) address of a grid node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCoord {
    pub row: u32,
    pub col: u32,
}

impl GridCoord {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    pub fn manhattan(&self, other: &GridCoord) -> u32 {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    /// Neighbour in `dir`, if it stays inside a `rows` x `cols` grid.
    pub fn step(&self, dir: Direction, rows: u32, cols: u32) -> Option<GridCoord> {
        let (dr, dc) = dir.offset();
        let row = i64::from(self.row) + dr;
        let col = i64::from(self.col) + dc;
        if row < 0 || col < 0 || row >= i64::from(rows) || col >= i64::from(cols) {
            return None;
        }
        Some(GridCoord::new(row as u32, col as u32))
    }
}

impl fmt::Display for GridCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// Direction of a valve slot relative to its node. Rows grow southwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    N,
    E,
    S,
    W,
    NE,
    SE,
    SW,
    NW,
}

impl Direction {
    /// Slot order: cardinals first so a 4-connected layout is a prefix of the 8-connected one.
    pub const ALL: [Direction; 8] = [
        Direction::N,
        Direction::E,
        Direction::S,
        Direction::W,
        Direction::NE,
        Direction::SE,
        Direction::SW,
        Direction::NW,
    ];

    /// (row delta, column delta)
    pub fn offset(self) -> (i64, i64) {
        match self {
            Direction::N => (-1, 0),
            Direction::E => (0, 1),
            Direction::S => (1, 0),
            Direction::W => (0, -1),
            Direction::NE => (-1, 1),
            Direction::SE => (1, 1),
            Direction::SW => (1, -1),
            Direction::NW => (-1, -1),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::N => Direction::S,
            Direction::E => Direction::W,
            Direction::S => Direction::N,
            Direction::W => Direction::E,
            Direction::NE => Direction::SW,
            Direction::SE => Direction::NW,
            Direction::SW => Direction::NE,
            Direction::NW => Direction::SE,
        }
    }

    /// Position of this direction inside a slot group.
    pub fn slot_offset(self) -> u8 {
        match self {
            Direction::N => 0,
            Direction::E => 1,
            Direction::S => 2,
            Direction::W => 3,
            Direction::NE => 4,
            Direction::SE => 5,
            Direction::SW => 6,
            Direction::NW => 7,
        }
    }

    pub fn is_diagonal(self) -> bool {
        self.slot_offset() >= 4
    }
}

/// Neighbour connectivity of every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connectivity {
    Four,
    Eight,
}

impl Connectivity {
    pub fn directions(self) -> &'static [Direction] {
        match self {
            Connectivity::Four => &Direction::ALL[..4],
            Connectivity::Eight => &Direction::ALL[..],
        }
    }

    /// Directions that create each undirected channel exactly once.
    pub(crate) fn forward_directions(self) -> &'static [Direction] {
        const FOUR: [Direction; 2] = [Direction::E, Direction::S];
        const EIGHT: [Direction; 4] = [Direction::E, Direction::S, Direction::SE, Direction::SW];
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }

    pub fn count(self) -> usize {
        self.directions().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_involution() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
            let (r, c) = d.offset();
            let (or, oc) = d.opposite().offset();
            assert_eq!((r + or, c + oc), (0, 0));
        }
    }

    #[test]
    fn step_respects_bounds() {
        let c = GridCoord::new(0, 0);
        assert_eq!(c.step(Direction::N, 4, 4), None);
        assert_eq!(c.step(Direction::E, 4, 4), Some(GridCoord::new(0, 1)));
        assert_eq!(c.step(Direction::SE, 4, 4), Some(GridCoord::new(1, 1)));
        assert_eq!(GridCoord::new(3, 3).step(Direction::S, 4, 4), None);
    }

    #[test]
    fn four_is_prefix_of_eight() {
        assert_eq!(
            Connectivity::Four.directions(),
            &Connectivity::Eight.directions()[..4]
        );
        assert_eq!(Connectivity::Eight.count(), 8);
    }
}
