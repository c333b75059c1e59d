//! Per-node valve slot layout, material channels and valve bitmasks.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::coord::{Connectivity, Direction};

/// Largest number of directional slots per node; bit 31 of a mask is the deposition outlet.
pub const MAX_SLOTS: usize = 31;

/// Material channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(pub u8);

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}", self.0)
    }
}

/// Material assignment of one slot group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotGroup {
    /// Always carries the given material.
    Dedicated(MaterialId),
    /// Carries any material, one at a time.
    Shared,
}

impl SlotGroup {
    pub fn accepts(&self, material: MaterialId) -> bool {
        match self {
            SlotGroup::Dedicated(m) => *m == material,
            SlotGroup::Shared => true,
        }
    }

    pub fn dedicated_material(&self) -> Option<MaterialId> {
        match self {
            SlotGroup::Dedicated(m) => Some(*m),
            SlotGroup::Shared => None,
        }
    }
}

/// Slot layout shared by every node: one slot per direction per group.
///
/// Fixed at configuration time; slot `g * directions + d` is direction `d` of group `g`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLayout {
    pub connectivity: Connectivity,
    pub groups: Vec<SlotGroup>,
}

impl SlotLayout {
    pub fn new(connectivity: Connectivity, groups: Vec<SlotGroup>) -> Self {
        Self {
            connectivity,
            groups,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.connectivity.count() * self.groups.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Slot index of direction `dir` in group `group`.
    pub fn slot(&self, group: u8, dir: Direction) -> u8 {
        group * self.connectivity.count() as u8 + dir.slot_offset()
    }

    /// Groups able to carry `material`, in index order.
    pub fn groups_for(&self, material: MaterialId) -> impl Iterator<Item = u8> + '_ {
        self.groups
            .iter()
            .enumerate()
            .filter(move |(_, g)| g.accepts(material))
            .map(|(i, _)| i as u8)
    }
}

/// Open/closed state of every slot at one node, plus the deposition outlet.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValveMask(pub u32);

impl ValveMask {
    pub const CLOSED: ValveMask = ValveMask(0);
    const DEPOSIT_BIT: u32 = 1 << 31;

    pub fn with_slot(self, slot: u8) -> Self {
        debug_assert!((slot as usize) < MAX_SLOTS);
        ValveMask(self.0 | (1 << slot))
    }

    pub fn with_deposit(self) -> Self {
        ValveMask(self.0 | Self::DEPOSIT_BIT)
    }

    pub fn union(self, other: ValveMask) -> Self {
        ValveMask(self.0 | other.0)
    }

    pub fn is_slot_open(&self, slot: u8) -> bool {
        self.0 & (1 << slot) != 0
    }

    pub fn deposits(&self) -> bool {
        self.0 & Self::DEPOSIT_BIT != 0
    }

    /// Number of open directional slots (the deposition outlet is not counted).
    pub fn open_slots(&self) -> u32 {
        (self.0 & !Self::DEPOSIT_BIT).count_ones()
    }

    pub fn is_closed(&self) -> bool {
        self.0 == 0
    }

    /// Bits set here that are not set in `other`.
    pub fn missing_from(&self, other: ValveMask) -> ValveMask {
        ValveMask(self.0 & !other.0)
    }
}

impl fmt::Debug for ValveMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValveMask({:#010x})", self.0)
    }
}

impl fmt::Display for ValveMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
