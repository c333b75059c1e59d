//! Integration tests for vg-grid.

use proptest::prelude::*;
use vg_grid::{
    ConfigError, Connectivity, GridBuilder, GridCoord, MaterialId, SlotGroup, ZoneLayout,
};

fn base(rows: u32, cols: u32) -> GridBuilder {
    GridBuilder::new(rows, cols)
        .material(MaterialId(0))
        .injection_point(GridCoord::new(0, 0), MaterialId(0), 10.0)
}

#[test]
fn neighbor_enumeration_carries_slot_identity() {
    let grid = base(3, 3).build().unwrap();
    let center = grid.node_at(GridCoord::new(1, 1)).unwrap();

    let mut seen: Vec<_> = grid
        .neighbors(center)
        .map(|(edge, other)| {
            let slot = grid.slot_layout().slot(edge.group, edge.dir_at(center));
            (grid.coord(other), slot)
        })
        .collect();
    seen.sort();

    assert_eq!(
        seen,
        vec![
            (GridCoord::new(0, 1), 0), // N
            (GridCoord::new(1, 0), 3), // W
            (GridCoord::new(1, 2), 1), // E
            (GridCoord::new(2, 1), 2), // S
        ]
    );
}

#[test]
fn dedicated_groups_restrict_materials() {
    let grid = GridBuilder::new(2, 2)
        .materials([MaterialId(0), MaterialId(1)])
        .slot_groups(vec![
            SlotGroup::Dedicated(MaterialId(0)),
            SlotGroup::Dedicated(MaterialId(1)),
        ])
        .injection_point(GridCoord::new(0, 0), MaterialId(0), 4.0)
        .injection_point(GridCoord::new(1, 1), MaterialId(1), 4.0)
        .build()
        .unwrap();

    for edge in grid.edges() {
        let expected = MaterialId(edge.group);
        assert!(edge.accepts(expected));
        assert!(!edge.accepts(MaterialId(1 - edge.group)));
    }
    assert_eq!(grid.injection_points_for(MaterialId(1)).count(), 1);
}

#[test]
fn zones_partition_every_node() {
    let grid = base(6, 5).zones(ZoneLayout::new(3, 2)).build().unwrap();
    assert_eq!(grid.zones().len(), 6);
    let total: usize = grid.zones().iter().map(|z| grid.zone_nodes(z.id).count()).sum();
    assert_eq!(total, grid.node_count());
    for node in grid.nodes() {
        let zone = grid.zone(node.zone).unwrap();
        assert!(zone.contains(node.coord));
    }
}

#[test]
fn inconsistent_configuration_is_config_error() {
    assert!(matches!(
        base(4, 4).spacing_mm(-2.0).build(),
        Err(ConfigError::InvalidSpacing { .. })
    ));
    assert!(matches!(
        base(4, 4).slot_groups(vec![]).build(),
        Err(ConfigError::NoValveSlots)
    ));
    assert!(matches!(
        GridBuilder::new(0, 4).build(),
        Err(ConfigError::ZeroDimension { what: "rows" })
    ));
    assert!(matches!(
        base(4, 4).edge_capacity(-1.0).build(),
        Err(ConfigError::InvalidCapacity { .. })
    ));
    assert!(matches!(
        base(4, 4)
            .injection_point(GridCoord::new(9, 9), MaterialId(0), 1.0)
            .build(),
        Err(ConfigError::InjectionOutOfBounds { .. })
    ));
    assert!(matches!(
        base(4, 4).zones(ZoneLayout::new(0, 1)).build(),
        Err(ConfigError::InvalidZoneLayout { .. })
    ));
    assert!(matches!(
        base(4, 4)
            .slot_groups(vec![SlotGroup::Dedicated(MaterialId(5))])
            .build(),
        Err(ConfigError::UnknownMaterial { .. })
    ));
}

#[test]
fn oversized_grid_is_rejected_before_allocation() {
    // Node count overflows u32.
    assert_eq!(
        base(70_000, 70_000).build().unwrap_err(),
        ConfigError::GridTooLarge {
            rows: 70_000,
            cols: 70_000
        }
    );
    // Nodes fit a NodeId, channels would not fit an EdgeId.
    assert!(matches!(
        base(60_000, 60_000).build(),
        Err(ConfigError::GridTooLarge { .. })
    ));
    assert!(matches!(
        base(u32::MAX, 2).build(),
        Err(ConfigError::GridTooLarge { .. })
    ));
}

proptest! {
    #[test]
    fn adjacency_is_symmetric(rows in 1u32..7, cols in 1u32..7, eight in any::<bool>()) {
        let conn = if eight { Connectivity::Eight } else { Connectivity::Four };
        let grid = base(rows, cols).connectivity(conn).build().unwrap();
        for edge in grid.edges() {
            prop_assert!(grid.incident_edges(edge.a).contains(&edge.id));
            prop_assert!(grid.incident_edges(edge.b).contains(&edge.id));
            let ca = grid.coord(edge.a);
            let cb = grid.coord(edge.b);
            prop_assert_eq!(ca.step(edge.dir, rows, cols), Some(cb));
        }
    }
}
