//! Schedule compilation on zoned grids and the plan exchange format.

use std::collections::BTreeSet;
use std::time::Duration;
use vg_grid::{Grid, GridBuilder, GridCoord, MaterialId, SlotGroup, ZoneLayout};
use vg_route::{RouteOptions, RoutingPlan, RoutingPlanner, TargetSet};
use vg_schedule::hash::activation_checksum;
use vg_schedule::{
    ActivationEntry, CompileOptions, FORMAT_VERSION, PlanFile, ScheduleCompiler, ScheduleError,
    StageKind,
};

const M0: MaterialId = MaterialId(0);
const M1: MaterialId = MaterialId(1);

fn zoned_full_grid() -> (Grid, RoutingPlan) {
    let grid = GridBuilder::new(4, 4)
        .material(M0)
        .injection_point(GridCoord::new(0, 0), M0, 16.0)
        .edge_capacity(16.0)
        .zones(ZoneLayout::new(2, 2))
        .build()
        .unwrap();
    let plan = RoutingPlanner::new(&grid, RouteOptions::default())
        .unwrap()
        .plan(&TargetSet::full_grid(0, 4, 4, M0));
    (grid, plan)
}

#[test]
fn full_grid_compiles_into_barriered_stages() {
    let (grid, plan) = zoned_full_grid();
    let schedule = ScheduleCompiler::default().compile(&grid, &plan).unwrap();

    assert!(schedule.barrier_count() >= 1);
    assert_eq!(schedule.stages.last().map(|s| s.kind), Some(StageKind::Deposit));
    assert_eq!(schedule.zones().len(), 4);
    assert_eq!(schedule.stats.active_nodes, 16);
    assert_eq!(schedule.stats.open_valves, 30);
    assert!(!schedule.stats.multi_material);

    for stage in &schedule.stages {
        // Barrier names exactly the zones the stage addresses.
        let addressed: Vec<_> = stage.commands.iter().map(|c| c.zone).collect();
        assert_eq!(addressed, stage.barrier.zones);
        for cmd in &stage.commands {
            for commit in &cmd.commits {
                assert_eq!(grid.zone_of(commit.node), Some(cmd.zone));
            }
        }
    }

    // The deposit stage opens every outlet.
    let last = schedule.stages.last().unwrap();
    assert_eq!(last.node_count(), 16);
    assert!(schedule.final_masks.values().all(|m| m.deposits()));
}

#[test]
fn trunks_commit_before_leaves() {
    let (grid, plan) = zoned_full_grid();
    let schedule = ScheduleCompiler::default().compile(&grid, &plan).unwrap();
    let kinds: Vec<_> = schedule.stages.iter().map(|s| s.kind).collect();
    let mut sorted = kinds.clone();
    sorted.sort();
    assert_eq!(kinds, sorted);
    assert!(kinds.contains(&StageKind::Trunk));
}

#[test]
fn stage_offsets_accumulate_response_and_settle() {
    let (grid, plan) = zoned_full_grid();
    let opts = CompileOptions::default();
    let schedule = ScheduleCompiler::new(opts).unwrap().compile(&grid, &plan).unwrap();
    let per_stage = opts.valve_response() + opts.settle;
    for (i, stage) in schedule.stages.iter().enumerate() {
        assert_eq!(stage.timing.offset, per_stage * i as u32);
    }
    assert_eq!(
        schedule.stats.expected_duration,
        per_stage * schedule.stage_count() as u32
    );
}

#[test]
fn layer_record_rebuilds_the_same_schedule() {
    let (grid, plan) = zoned_full_grid();
    let schedule = ScheduleCompiler::default().compile(&grid, &plan).unwrap();

    let mut file = PlanFile::new(&grid);
    file.push(&schedule);
    let json = file.to_json().unwrap();
    let decoded = PlanFile::from_json(&json).unwrap();

    assert_eq!(decoded.format_version, FORMAT_VERSION);
    let rebuilt = decoded.to_schedules(&grid).unwrap();
    assert_eq!(rebuilt.len(), 1);
    assert_eq!(rebuilt[0], schedule);
}

#[test]
fn tampered_record_is_rejected() {
    let (grid, plan) = zoned_full_grid();
    let schedule = ScheduleCompiler::default().compile(&grid, &plan).unwrap();
    let mut file = PlanFile::new(&grid);
    file.push(&schedule);
    file.layers[0].entries[0].mask.0 ^= 1;

    let json = file.to_json().unwrap();
    let err = PlanFile::from_json(&json).unwrap_err();
    assert!(matches!(err, ScheduleError::ChecksumMismatch { layer: 0, .. }));
}

#[test]
fn sub_millisecond_timing_survives_the_plan_file() {
    let (grid, plan) = zoned_full_grid();
    let schedule = ScheduleCompiler::new(CompileOptions {
        response_override: Some(Duration::from_micros(300)),
        settle: Duration::from_micros(1_250),
        ..Default::default()
    })
    .unwrap()
    .compile(&grid, &plan)
    .unwrap();

    let mut file = PlanFile::new(&grid);
    file.push(&schedule);
    let decoded = PlanFile::from_json(&file.to_json().unwrap()).unwrap();
    let rebuilt = decoded.to_schedules(&grid).unwrap().remove(0);

    for stage in &rebuilt.stages {
        assert_eq!(stage.timing.valve_response, Duration::from_micros(300));
        assert_eq!(stage.timing.settle, Duration::from_micros(1_250));
    }
    assert_eq!(rebuilt.stats.expected_duration, schedule.stats.expected_duration);
    assert_eq!(rebuilt, schedule);
}

#[test]
fn resealed_record_with_dangling_slot_is_rejected() {
    let (grid, plan) = zoned_full_grid();
    let schedule = ScheduleCompiler::default().compile(&grid, &plan).unwrap();
    let mut file = PlanFile::new(&grid);
    file.push(&schedule);

    // Slot 0 points north, off the top edge of the grid.
    let record = &mut file.layers[0];
    let entry = record
        .entries
        .iter_mut()
        .find(|e| e.coord.row == 0)
        .unwrap();
    entry.mask = entry.mask.with_slot(0);
    record.checksum = activation_checksum(&record.entries);

    let decoded = PlanFile::from_json(&file.to_json().unwrap()).unwrap();
    let err = decoded.to_schedules(&grid).unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::IllegalActivation { coord, .. } if coord.row == 0
    ));
}

#[test]
fn resealed_record_mixing_materials_in_one_group_is_rejected() {
    let (grid, plan) = zoned_full_grid();
    let schedule = ScheduleCompiler::default().compile(&grid, &plan).unwrap();
    let mut file = PlanFile::new(&grid);
    file.push(&schedule);

    let record = &mut file.layers[0];
    let first = record.entries[0];
    assert!(first.mask.open_slots() > 0);
    record.entries.push(ActivationEntry {
        material: M1,
        ..first
    });
    record.checksum = activation_checksum(&record.entries);

    let err = file.to_schedules(&grid).unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::IllegalActivation { material, .. } if material == M1
    ));
}

#[test]
fn record_for_other_slot_layout_is_rejected() {
    let (grid, plan) = zoned_full_grid();
    let schedule = ScheduleCompiler::default().compile(&grid, &plan).unwrap();
    let mut file = PlanFile::new(&grid);
    file.push(&schedule);

    // Same shape, but slot group 0 is reserved for another material.
    let other = GridBuilder::new(4, 4)
        .slot_groups(vec![SlotGroup::Dedicated(M1), SlotGroup::Shared])
        .materials([M0, M1])
        .injection_point(GridCoord::new(0, 0), M0, 16.0)
        .injection_point(GridCoord::new(3, 3), M1, 16.0)
        .edge_capacity(16.0)
        .zones(ZoneLayout::new(2, 2))
        .build()
        .unwrap();
    let err = file.to_schedules(&other).unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::IllegalActivation { material, .. } if material == M0
    ));
}

#[test]
fn unknown_version_is_rejected() {
    let (grid, _) = zoned_full_grid();
    let mut file = PlanFile::new(&grid);
    file.format_version = FORMAT_VERSION + 1;
    let err = PlanFile::from_json(&file.to_json().unwrap()).unwrap_err();
    assert!(matches!(err, ScheduleError::UnsupportedVersion { .. }));
}

#[test]
fn record_for_other_grid_shape_is_rejected() {
    let (grid, plan) = zoned_full_grid();
    let schedule = ScheduleCompiler::default().compile(&grid, &plan).unwrap();
    let mut file = PlanFile::new(&grid);
    file.push(&schedule);

    let small = GridBuilder::new(2, 2)
        .material(M0)
        .injection_point(GridCoord::new(0, 0), M0, 4.0)
        .build()
        .unwrap();
    assert!(file.to_schedules(&small).is_err());
}

#[test]
fn pattern_hash_tracks_final_pattern() {
    let (grid, plan) = zoned_full_grid();
    let a = ScheduleCompiler::default().compile(&grid, &plan).unwrap();
    let b = ScheduleCompiler::new(CompileOptions {
        depth_per_stage: 1,
        ..Default::default()
    })
    .unwrap()
    .compile(&grid, &plan)
    .unwrap();
    // Different staging, same final pattern.
    assert_ne!(a.stage_count(), b.stage_count());
    assert_eq!(a.stats.pattern_hash, b.stats.pattern_hash);

    let zones: BTreeSet<_> = a.zones().into_iter().collect();
    assert_eq!(zones.len(), 4);
}
