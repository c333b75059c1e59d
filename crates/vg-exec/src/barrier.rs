//! Acknowledgment aggregation for one stage.

use std::collections::BTreeSet;
use vg_core::ZoneId;

/// Rendezvous of the zones addressed by one stage.
///
/// Complete once every expected zone has arrived. Arrivals from zones the
/// stage did not address are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckBarrier {
    stage: u32,
    expected: BTreeSet<ZoneId>,
    arrived: BTreeSet<ZoneId>,
}

impl AckBarrier {
    pub fn new(stage: u32, zones: impl IntoIterator<Item = ZoneId>) -> Self {
        Self {
            stage,
            expected: zones.into_iter().collect(),
            arrived: BTreeSet::new(),
        }
    }

    pub fn stage(&self) -> u32 {
        self.stage
    }

    /// Record `zone`; returns true when this is its first counted arrival.
    pub fn arrive(&mut self, zone: ZoneId) -> bool {
        self.expected.contains(&zone) && self.arrived.insert(zone)
    }

    pub fn is_complete(&self) -> bool {
        self.arrived.len() == self.expected.len()
    }

    pub fn remaining(&self) -> usize {
        self.expected.len() - self.arrived.len()
    }

    pub fn missing(&self) -> Vec<ZoneId> {
        self.expected.difference(&self.arrived).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn z(i: u32) -> ZoneId {
        ZoneId::from_index(i)
    }

    #[test]
    fn empty_barrier_is_complete() {
        assert!(AckBarrier::new(0, []).is_complete());
    }

    #[test]
    fn duplicates_and_strangers_do_not_count() {
        let mut b = AckBarrier::new(3, [z(0), z(1)]);
        assert!(b.arrive(z(0)));
        assert!(!b.arrive(z(0)));
        assert!(!b.arrive(z(7)));
        assert!(!b.is_complete());
        assert_eq!(b.missing(), vec![z(1)]);
        assert!(b.arrive(z(1)));
        assert!(b.is_complete());
    }

    proptest! {
        #[test]
        fn completes_exactly_when_all_expected_arrive(
            expected in prop::collection::btree_set(0u32..16, 0..8),
            arrivals in prop::collection::vec(0u32..16, 0..32),
        ) {
            let mut b = AckBarrier::new(0, expected.iter().map(|&i| z(i)));
            for &a in &arrivals {
                b.arrive(z(a));
            }
            let all = expected.iter().all(|e| arrivals.contains(e));
            prop_assert_eq!(b.is_complete(), all);
            prop_assert_eq!(b.remaining(), b.missing().len());
        }
    }
}
