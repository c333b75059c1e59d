use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use vg_app::{
    AppError, JobProgressEvent, JobStage, LayerOutcome, PlanOptions, PrintJob, PrintPhase,
    SimOptions, SimulatedMachine, SystemState, UnroutablePolicy, load_plan, plan_layers,
    save_plan,
};
use vg_config::MachineConfig;
use vg_core::ZoneId;
use vg_exec::{CoordinatorState, ExecError};
use vg_grid::{GridCoord, MaterialId};
use vg_route::TargetSet;

fn demos() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos")
}

fn bench() -> MachineConfig {
    vg_config::load(&demos().join("machine.yaml")).unwrap()
}

fn fill(layer: u32) -> TargetSet {
    TargetSet::full_grid(layer, 4, 4, MaterialId(0))
}

#[test]
fn job_prints_every_layer() {
    let config = bench();
    let grid = config.build_grid().unwrap();
    let machine =
        SimulatedMachine::start(&grid, config.coordinator_config(), SimOptions::default()).unwrap();
    let job = PrintJob::new(&grid, &machine.coordinator, PlanOptions::from_config(&config));

    let mut state = SystemState::new();
    let mut events: Vec<JobProgressEvent> = Vec::new();
    let mut record = |e: JobProgressEvent| events.push(e);
    let summary = job
        .run(&mut state, &[fill(0), fill(1)], Some(&mut record))
        .unwrap();

    assert_eq!(summary.printed(), 2);
    assert_eq!(summary.aborted(), 0);
    assert_eq!(state.phase(), PrintPhase::Idle);
    assert_eq!(state.active_layer(), None);
    assert!(
        state
            .history()
            .iter()
            .any(|c| c.to == PrintPhase::Committing && c.layer == Some(1))
    );

    let done = events
        .iter()
        .filter(|e| e.stage == JobStage::LayerDone)
        .count();
    assert_eq!(done, 2);
    assert_eq!(events.last().map(|e| &e.stage), Some(&JobStage::Completed));
    assert_eq!(machine.coordinator.status(), CoordinatorState::LayerComplete);
    assert_eq!(machine.open_nodes(), 16);
}

#[test]
fn unroutable_targets_follow_policy() {
    let config = bench();
    let grid = config.build_grid().unwrap();
    let machine =
        SimulatedMachine::start(&grid, config.coordinator_config(), SimOptions::default()).unwrap();
    let layer = TargetSet::new(0)
        .with(GridCoord::new(2, 2), MaterialId(0))
        .with(GridCoord::new(9, 9), MaterialId(0));

    let strict = PrintJob::new(&grid, &machine.coordinator, PlanOptions::from_config(&config));
    let mut state = SystemState::new();
    let summary = strict.run(&mut state, &[layer.clone()], None).unwrap();
    assert_eq!(summary.aborted(), 1);
    assert!(matches!(&summary.layers[0], LayerOutcome::Aborted { reason, .. } if reason.contains("(9,9)")));
    assert_eq!(state.phase(), PrintPhase::Idle);

    let lenient = PrintJob::new(
        &grid,
        &machine.coordinator,
        PlanOptions::from_config(&config).with_unroutable(UnroutablePolicy::Skip),
    );
    let summary = lenient.run(&mut state, &[layer], None).unwrap();
    assert!(matches!(
        summary.layers[0],
        LayerOutcome::Printed {
            skipped_targets: 1,
            ..
        }
    ));
}

#[test]
fn infeasible_layer_is_aborted_without_hardware() {
    let mut config = bench();
    config.injection_points[0].supply = 4.0;
    let grid = config.build_grid().unwrap();
    let machine =
        SimulatedMachine::start(&grid, config.coordinator_config(), SimOptions::default()).unwrap();
    let job = PrintJob::new(&grid, &machine.coordinator, PlanOptions::from_config(&config));

    let mut state = SystemState::new();
    let summary = job.run(&mut state, &[fill(0)], None).unwrap();
    assert_eq!(summary.aborted(), 1);
    assert!(matches!(&summary.layers[0], LayerOutcome::Aborted { reason, .. } if reason.contains("infeasible")));
    assert!(machine.coordinator.events().is_empty());
    assert_eq!(machine.open_nodes(), 0);
}

#[test]
fn zone_timeout_halts_the_job() {
    let config = bench();
    let grid = config.build_grid().unwrap();
    let machine = SimulatedMachine::start(
        &grid,
        config.coordinator_config(),
        SimOptions {
            drop_zone: Some(ZoneId::from_index(1)),
            ..Default::default()
        },
    )
    .unwrap();
    let job = PrintJob::new(&grid, &machine.coordinator, PlanOptions::from_config(&config));

    let mut state = SystemState::new();
    let err = job.run(&mut state, &[fill(0), fill(1)], None).unwrap_err();
    assert!(matches!(err, AppError::Exec(ExecError::ZoneAckTimeout { layer: 0, .. })));
    assert!(!err.is_layer_local());
    assert_eq!(state.phase(), PrintPhase::Faulted);
    assert_eq!(state.active_layer(), Some(0));
    assert_eq!(machine.coordinator.status(), CoordinatorState::Fault);
}

#[test]
fn safety_trip_shuts_down() {
    let config = bench();
    let grid = config.build_grid().unwrap();
    let machine =
        SimulatedMachine::start(&grid, config.coordinator_config(), SimOptions::default()).unwrap();
    let job = PrintJob::new(&grid, &machine.coordinator, PlanOptions::from_config(&config));
    let mut state = SystemState::new();

    let err = thread::scope(|s| {
        s.spawn(|| {
            let settling = machine
                .coordinator
                .wait_until(Duration::from_secs(10), |st| st == CoordinatorState::Settling);
            assert!(settling);
            machine.safety.trip();
        });
        job.run(&mut state, &[fill(0)], None).unwrap_err()
    });

    assert!(err.is_safety_critical());
    assert_eq!(state.phase(), PrintPhase::ShuttingDown);
    assert_eq!(machine.coordinator.status(), CoordinatorState::SafeShutdown);
    assert!(machine.pressure.is_vented());
}

#[test]
fn plan_file_replays() {
    let config = bench();
    let grid = config.build_grid().unwrap();
    let options = PlanOptions::from_config(&config);
    let file = plan_layers(&grid, &[fill(0), fill(1)], &options).unwrap();
    assert_eq!(file.layers.len(), 2);

    let path = std::env::temp_dir().join("vg_app_plan_replay.json");
    save_plan(&path, &file).unwrap();
    let schedules = load_plan(&path, &grid).unwrap();
    assert_eq!(schedules.len(), 2);

    let machine =
        SimulatedMachine::start(&grid, config.coordinator_config(), SimOptions::default()).unwrap();
    let job = PrintJob::new(&grid, &machine.coordinator, options);
    let mut state = SystemState::new();
    let summary = job.run_schedules(&mut state, schedules, None).unwrap();
    assert_eq!(summary.printed(), 2);
    assert_eq!(state.phase(), PrintPhase::Idle);
}
