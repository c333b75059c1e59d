//! Topology validation logic.

use std::collections::BTreeSet;
use vg_core::{EdgeId, Id, NodeId};

use crate::coord::GridCoord;
use crate::error::{ConfigError, ConfigResult};
use crate::graph::{Edge, InjectionPoint, Node};
use crate::slots::{MaterialId, SlotLayout, MAX_SLOTS};

pub(crate) fn validate_dimensions(rows: u32, cols: u32, spacing_mm: f64) -> ConfigResult<()> {
    if rows == 0 {
        return Err(ConfigError::ZeroDimension { what: "rows" });
    }
    if cols == 0 {
        return Err(ConfigError::ZeroDimension { what: "cols" });
    }
    if !spacing_mm.is_finite() || spacing_mm <= 0.0 {
        return Err(ConfigError::InvalidSpacing { value: spacing_mm });
    }
    // Every node index must fit a `NodeId`.
    match rows.checked_mul(cols) {
        Some(nodes) if nodes - 1 <= Id::MAX_INDEX => Ok(()),
        _ => Err(ConfigError::GridTooLarge { rows, cols }),
    }
}

/// Upper bound on channels must fit an `EdgeId`.
pub(crate) fn validate_edge_count(rows: u32, cols: u32, layout: &SlotLayout) -> ConfigResult<()> {
    let bound = u64::from(rows)
        * u64::from(cols)
        * layout.connectivity.forward_directions().len() as u64
        * layout.group_count() as u64;
    if bound > u64::from(Id::MAX_INDEX) + 1 {
        return Err(ConfigError::GridTooLarge { rows, cols });
    }
    Ok(())
}

pub(crate) fn validate_layout(
    layout: &SlotLayout,
    materials: &BTreeSet<MaterialId>,
) -> ConfigResult<()> {
    let count = layout.slot_count();
    if count == 0 {
        return Err(ConfigError::NoValveSlots);
    }
    if count > MAX_SLOTS {
        return Err(ConfigError::TooManySlots {
            count,
            max: MAX_SLOTS,
        });
    }
    for group in &layout.groups {
        if let Some(material) = group.dedicated_material() {
            if !materials.contains(&material) {
                return Err(ConfigError::UnknownMaterial {
                    material,
                    context: "slot group",
                });
            }
        }
    }
    Ok(())
}

pub(crate) fn validate_capacity(capacity: f64) -> ConfigResult<()> {
    if !capacity.is_finite() || capacity < 0.0 {
        return Err(ConfigError::InvalidCapacity { value: capacity });
    }
    Ok(())
}

/// Check injection points and resolve them onto node ids.
pub(crate) fn validate_injection(
    injections: &[(GridCoord, MaterialId, f64)],
    materials: &BTreeSet<MaterialId>,
    layout: &SlotLayout,
    rows: u32,
    cols: u32,
) -> ConfigResult<Vec<InjectionPoint>> {
    let mut points = Vec::with_capacity(injections.len());
    for &(coord, material, supply) in injections {
        if coord.row >= rows || coord.col >= cols {
            return Err(ConfigError::InjectionOutOfBounds { coord });
        }
        if !materials.contains(&material) {
            return Err(ConfigError::UnknownMaterial {
                material,
                context: "injection point",
            });
        }
        if layout.groups_for(material).next().is_none() {
            return Err(ConfigError::InjectionNotCarried { material, coord });
        }
        if !supply.is_finite() || supply <= 0.0 {
            return Err(ConfigError::InvalidSupply {
                coord,
                value: supply,
            });
        }
        points.push(InjectionPoint {
            index: points.len(),
            node: NodeId::from_index(coord.row * cols + coord.col),
            coord,
            material,
            supply,
        });
    }

    // Two materials fed at one node must not share a slot group.
    for (i, p) in points.iter().enumerate() {
        for q in &points[i + 1..] {
            if p.node == q.node && p.material != q.material {
                let shared = layout
                    .groups_for(p.material)
                    .any(|g| layout.groups[g as usize].accepts(q.material));
                if shared {
                    return Err(ConfigError::InjectionConflict { coord: p.coord });
                }
            }
        }
    }

    for &material in materials {
        if !points.iter().any(|p| p.material == material) {
            return Err(ConfigError::MissingInjectionPoint { material });
        }
    }
    Ok(points)
}

/// Validate that adjacency lists agree with edge endpoints.
pub(crate) fn validate_adjacency(
    nodes: &[Node],
    edges: &[Edge],
    offsets: &[usize],
    node_edges: &[EdgeId],
) -> ConfigResult<()> {
    if offsets.len() != nodes.len() + 1 {
        return Err(ConfigError::Inconsistent {
            what: format!(
                "adjacency offsets length {} for {} nodes",
                offsets.len(),
                nodes.len()
            ),
        });
    }
    for (i, node) in nodes.iter().enumerate() {
        if node.id.idx() != i {
            return Err(ConfigError::Inconsistent {
                what: format!("node {} stored at index {}", node.id, i),
            });
        }
        for &e in &node_edges[offsets[i]..offsets[i + 1]] {
            let edge = edges.get(e.idx()).ok_or_else(|| ConfigError::Inconsistent {
                what: format!("edge {} referenced by node {} does not exist", e, node.id),
            })?;
            if edge.a != node.id && edge.b != node.id {
                return Err(ConfigError::Inconsistent {
                    what: format!("edge {} in node {}'s list does not touch it", e, node.id),
                });
            }
        }
    }
    Ok(())
}
