use core::fmt;
use core::num::NonZeroU32;

/// Compact, stable identifier for arena-stored grid objects.
///
/// - `u32` keeps the flat node/edge arrays small
/// - `NonZero` enables `Option<Id>` to be pointer-optimized
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Id(NonZeroU32);

impl Id {
    /// Largest 0-based index an `Id` can hold.
    pub const MAX_INDEX: u32 = u32::MAX - 1;

    /// Create an Id from a 0-based index by storing index+1.
    ///
    /// Panics if `index > Id::MAX_INDEX`; arenas bound their size at build time.
    pub fn from_index(index: u32) -> Self {
        Self::try_from_index(index).expect("index within Id::MAX_INDEX")
    }

    /// `None` if `index` is beyond `Id::MAX_INDEX`.
    pub fn try_from_index(index: u32) -> Option<Self> {
        index.checked_add(1).and_then(NonZeroU32::new).map(Self)
    }

    /// Create an Id from a `usize` arena index.
    pub fn from_usize(index: usize) -> Self {
        Self::from_index(index as u32)
    }

    /// Recover the 0-based index.
    pub fn index(self) -> u32 {
        self.0.get() - 1
    }

    /// Recover the 0-based index as `usize` for slice access.
    pub fn idx(self) -> usize {
        self.index() as usize
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.index())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Domain ID aliases.
pub type NodeId = Id;
pub type EdgeId = Id;
pub type ZoneId = Id;
