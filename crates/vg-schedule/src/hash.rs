//! Content hashes over valve patterns.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use vg_core::NodeId;
use vg_grid::ValveMask;

use crate::record::ActivationEntry;

/// Short identifier of a final valve pattern; equal patterns hash equal.
pub fn pattern_hash(masks: &BTreeMap<NodeId, ValveMask>) -> String {
    let mut hasher = Sha256::new();
    for (node, mask) in masks {
        hasher.update(node.index().to_le_bytes());
        hasher.update(mask.0.to_le_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// SHA-256 over a record's activation entries, in order.
pub fn activation_checksum(entries: &[ActivationEntry]) -> String {
    let mut hasher = Sha256::new();
    for e in entries {
        hasher.update(e.coord.row.to_le_bytes());
        hasher.update(e.coord.col.to_le_bytes());
        hasher.update([e.material.0]);
        hasher.update(e.mask.0.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}
