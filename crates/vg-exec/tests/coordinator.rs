//! Coordinator behaviour against simulated zone hardware.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vg_core::{NodeId, ZoneId, kpa};
use vg_exec::{
    Coordinator, CoordinatorConfig, CoordinatorHandle, CoordinatorState, ExecError,
    ExecEventKind, Hardware, PressurePolicy, SimPressureController, SimSafetyMonitor,
    SimValveController,
};
use vg_grid::{Grid, GridBuilder, GridCoord, MaterialId, ZoneLayout};
use vg_route::{RouteOptions, RoutingPlanner, TargetSet};
use vg_schedule::{CompileOptions, Schedule, ScheduleCompiler};

const M0: MaterialId = MaterialId(0);
const WAIT: Duration = Duration::from_secs(10);

fn grid() -> Grid {
    GridBuilder::new(4, 4)
        .material(M0)
        .injection_point(GridCoord::new(0, 0), M0, 16.0)
        .edge_capacity(16.0)
        .zones(ZoneLayout::new(2, 2))
        .build()
        .unwrap()
}

fn schedule(grid: &Grid, settle: Duration) -> Schedule {
    let plan = RoutingPlanner::new(grid, RouteOptions::default())
        .unwrap()
        .plan(&TargetSet::full_grid(0, 4, 4, M0));
    ScheduleCompiler::new(CompileOptions {
        settle,
        depth_per_stage: 1,
        ..Default::default()
    })
    .unwrap()
    .compile(grid, &plan)
    .unwrap()
}

struct Rig {
    zones: Vec<(ZoneId, Arc<SimValveController>)>,
    safety: Arc<SimSafetyMonitor>,
    pressure: Arc<SimPressureController>,
    handle: CoordinatorHandle,
}

impl Rig {
    fn start(
        grid: &Grid,
        config: CoordinatorConfig,
        valves: impl Fn(ZoneId) -> SimValveController,
        pressure: SimPressureController,
    ) -> Rig {
        let safety = Arc::new(SimSafetyMonitor::new());
        let pressure = Arc::new(pressure);
        let mut hardware = Hardware::new(safety.clone()).with_pressure(pressure.clone());
        let mut zones = Vec::new();
        for zone in grid.zones() {
            let sim = Arc::new(valves(zone.id));
            hardware = hardware.with_zone(zone.id, sim.clone());
            zones.push((zone.id, sim));
        }
        let handle = Coordinator::spawn(hardware, config).unwrap();
        Rig {
            zones,
            safety,
            pressure,
            handle,
        }
    }

    fn simple(grid: &Grid) -> Rig {
        Rig::start(
            grid,
            CoordinatorConfig::default(),
            |_| SimValveController::new(),
            SimPressureController::new(),
        )
    }

    fn valves(&self, node: NodeId, grid: &Grid) -> &SimValveController {
        let zone = grid.zone_of(node).unwrap();
        &self.zones.iter().find(|(z, _)| *z == zone).unwrap().1
    }

    fn all_closed_eventually(&self) -> bool {
        for _ in 0..2000 {
            if self.zones.iter().all(|(_, sim)| sim.open_nodes() == 0) {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn seq_of(&self, pred: impl Fn(&ExecEventKind) -> bool) -> Vec<u64> {
        self.handle
            .events()
            .filter(pred)
            .into_iter()
            .map(|e| e.seq)
            .collect()
    }
}

fn first_stage_of(schedule: &Schedule, zone: ZoneId) -> u32 {
    schedule
        .stages
        .iter()
        .find(|s| s.barrier.requires(zone))
        .map(|s| s.index)
        .unwrap()
}

#[test]
fn layer_runs_to_completion() {
    let grid = grid();
    let schedule = schedule(&grid, Duration::from_millis(2));
    let rig = Rig::simple(&grid);

    let report = rig
        .handle
        .submit_layer(schedule.clone())
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(report.stages, schedule.stage_count());
    assert_eq!(report.retries, 0);
    assert_eq!(report.pattern_hash, schedule.stats.pattern_hash);
    assert_eq!(rig.handle.status(), CoordinatorState::LayerComplete);

    for (&node, &mask) in &schedule.final_masks {
        assert_eq!(rig.valves(node, &grid).mask(node), mask);
    }

    let committed = rig.seq_of(|k| {
        matches!(k, ExecEventKind::StateChanged { to: CoordinatorState::Committed, .. })
    });
    let settling = rig.seq_of(|k| {
        matches!(k, ExecEventKind::StateChanged { to: CoordinatorState::Settling, .. })
    });
    let complete = rig.seq_of(|k| {
        matches!(k, ExecEventKind::StateChanged { to: CoordinatorState::LayerComplete, .. })
    });
    assert_eq!(committed.len(), schedule.stage_count());
    assert_eq!(settling.len(), schedule.stage_count());
    assert_eq!(complete.len(), 1);
    for (c, s) in committed.iter().zip(&settling) {
        assert!(c < s);
    }
    assert!(settling.last().unwrap() < &complete[0]);
}

#[test]
fn next_stage_waits_for_every_zone() {
    let grid = grid();
    let schedule = schedule(&grid, Duration::from_millis(1));
    let slow = ZoneId::from_index(3);
    let rig = Rig::start(
        &grid,
        CoordinatorConfig {
            ack_margin: Duration::from_millis(500),
            ..Default::default()
        },
        |zone| {
            let sim = SimValveController::new();
            if zone == slow {
                sim.with_latency(Duration::from_millis(5))
            } else {
                sim
            }
        },
        SimPressureController::new(),
    );

    rig.handle.submit_layer(schedule.clone()).unwrap().wait().unwrap();

    for stage in 0..schedule.stage_count() as u32 {
        let acks = rig.seq_of(
            |k| matches!(k, ExecEventKind::ZoneAcked { stage: s, .. } if *s == stage),
        );
        let next = rig.seq_of(
            |k| matches!(k, ExecEventKind::CommandSent { stage: s, .. } if *s == stage + 1),
        );
        assert_eq!(acks.len(), schedule.stages[stage as usize].barrier.zones.len());
        if let (Some(last_ack), Some(first_next)) = (acks.iter().max(), next.iter().min()) {
            assert!(last_ack < first_next, "stage {stage} released early");
        }
    }
}

#[test]
fn stalled_zone_faults_the_layer_after_one_retry() {
    let grid = grid();
    let schedule = schedule(&grid, Duration::from_millis(1));
    let stalled = ZoneId::from_index(2);
    let stage = first_stage_of(&schedule, stalled);
    let rig = Rig::start(
        &grid,
        CoordinatorConfig {
            ack_margin: Duration::from_millis(100),
            retry_extension: 2.0,
            ..Default::default()
        },
        |zone| {
            let sim = SimValveController::new();
            if zone == stalled {
                sim.stall_first(1, Duration::from_secs(1))
            } else {
                sim
            }
        },
        SimPressureController::new(),
    );

    let err = rig.handle.submit_layer(schedule).unwrap().wait().unwrap_err();
    assert_eq!(
        err,
        ExecError::ZoneAckTimeout {
            layer: 0,
            stage,
            zones: vec![stalled],
        }
    );
    assert_eq!(rig.handle.status(), CoordinatorState::Fault);

    let timeouts = rig.handle.events().filter(|k| matches!(k, ExecEventKind::AckTimeout { .. }));
    assert_eq!(timeouts.len(), 2);
    let retried = rig.seq_of(|k| {
        matches!(k, ExecEventKind::CommandSent { zone, attempt: 2, .. } if *zone == stalled)
    });
    assert_eq!(retried.len(), 1);

    // Nothing beyond the failed stage was dispatched, to any zone.
    let later = rig.seq_of(|k| matches!(k, ExecEventKind::CommandSent { stage: s, .. } if *s > stage));
    assert!(later.is_empty());
    assert!(!rig.safety.reported().is_empty());
    assert!(rig.all_closed_eventually());
}

#[test]
fn slow_ack_recovers_on_retry() {
    let grid = grid();
    let schedule = schedule(&grid, Duration::from_millis(1));
    let slow = ZoneId::from_index(1);
    let rig = Rig::start(
        &grid,
        CoordinatorConfig {
            ack_margin: Duration::from_millis(100),
            retry_extension: 4.0,
            ..Default::default()
        },
        |zone| {
            let sim = SimValveController::new();
            if zone == slow {
                sim.stall_first(1, Duration::from_millis(200))
            } else {
                sim
            }
        },
        SimPressureController::new(),
    );

    let report = rig.handle.submit_layer(schedule).unwrap().wait().unwrap();
    assert_eq!(report.retries, 1);
    assert_eq!(rig.handle.status(), CoordinatorState::LayerComplete);
}

#[test]
fn driver_fault_is_contained_and_reset_recovers() {
    let grid = grid();
    let schedule = schedule(&grid, Duration::from_millis(1));
    let injection = grid.node_at(GridCoord::new(0, 0)).unwrap();
    let zone = grid.zone_of(injection).unwrap();
    let rig = Rig::start(
        &grid,
        CoordinatorConfig::default(),
        |z| {
            let sim = SimValveController::new();
            if z == zone { sim.fault_at(injection) } else { sim }
        },
        SimPressureController::new(),
    );

    let queued_behind = {
        let first = rig.handle.submit_layer(schedule.clone()).unwrap();
        let mut next = schedule.clone();
        next.layer = 1;
        let second = rig.handle.submit_layer(next).unwrap();
        let err = first.wait().unwrap_err();
        assert!(matches!(err, ExecError::HwFault { zone: z, .. } if z == zone));
        second.wait().unwrap_err()
    };
    // Depending on arrival order the queued layer is halted or refused.
    assert!(matches!(
        queued_behind,
        ExecError::Halted { layer: 1, .. } | ExecError::NotAccepting { .. }
    ));
    assert_eq!(rig.handle.status(), CoordinatorState::Fault);

    // Faulted coordinators refuse work until reset.
    let refused = rig.handle.submit_layer(schedule.clone()).unwrap().wait();
    assert!(matches!(refused, Err(ExecError::NotAccepting { state: CoordinatorState::Fault })));

    rig.handle.reset_fault().unwrap();
    assert_eq!(rig.handle.status(), CoordinatorState::Idle);
    assert!(matches!(
        rig.handle.reset_fault(),
        Err(ExecError::InvalidTransition { .. })
    ));
}

#[test]
fn read_back_mismatch_faults() {
    let grid = grid();
    let schedule = schedule(&grid, Duration::from_millis(1));
    let rig = Rig::start(
        &grid,
        CoordinatorConfig::default(),
        |_| SimValveController::new().corrupt_readback(),
        SimPressureController::new(),
    );
    let err = rig.handle.submit_layer(schedule).unwrap().wait().unwrap_err();
    match err {
        ExecError::HwFault { fault, .. } => assert!(fault.what.contains("read back")),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(rig.handle.status(), CoordinatorState::Fault);
}

#[test]
fn emergency_stop_closes_and_vents() {
    let grid = grid();
    let schedule = schedule(&grid, Duration::from_millis(100));
    let rig = Rig::start(
        &grid,
        CoordinatorConfig {
            pressure: Some(PressurePolicy {
                targets: vec![(M0, kpa(200.0))],
                fault_threshold: kpa(10.0),
                max_pressure: kpa(500.0),
            }),
            ..Default::default()
        },
        |_| SimValveController::new(),
        SimPressureController::new(),
    );

    let layer = rig.handle.submit_layer(schedule.clone()).unwrap();
    assert!(rig.handle.wait_until(WAIT, |s| s == CoordinatorState::Settling));
    let stop = rig.handle.estop_signal();
    stop.trigger();
    assert!(stop.is_triggered());

    assert_eq!(layer.wait().unwrap_err(), ExecError::EmergencyStop);
    assert_eq!(rig.handle.status(), CoordinatorState::SafeShutdown);
    assert!(rig.pressure.is_vented());
    assert!(rig.all_closed_eventually());
    assert_eq!(
        rig.handle
            .events()
            .filter(|k| matches!(k, ExecEventKind::EmergencyStop))
            .len(),
        1
    );

    let refused = rig.handle.submit_layer(schedule).unwrap().wait();
    assert!(matches!(
        refused,
        Err(ExecError::NotAccepting { state: CoordinatorState::SafeShutdown })
    ));
}

#[test]
fn safety_trip_forces_safe_shutdown() {
    let grid = grid();
    let schedule = schedule(&grid, Duration::from_millis(50));
    let rig = Rig::simple(&grid);

    let layer = rig.handle.submit_layer(schedule).unwrap();
    assert!(rig.handle.wait_until(WAIT, |s| s == CoordinatorState::Settling));
    rig.safety.trip();

    assert!(matches!(layer.wait(), Err(ExecError::SafetyViolation(_))));
    assert_eq!(rig.handle.status(), CoordinatorState::SafeShutdown);
    assert_eq!(
        rig.handle
            .events()
            .filter(|k| matches!(k, ExecEventKind::SafetyTripped { .. }))
            .len(),
        1
    );
    assert!(rig.all_closed_eventually());
}

#[test]
fn cancel_stops_at_stage_boundary() {
    let grid = grid();
    let schedule = schedule(&grid, Duration::from_millis(50));
    let rig = Rig::simple(&grid);

    let layer = rig.handle.submit_layer(schedule.clone()).unwrap();
    assert!(rig.handle.wait_until(WAIT, |s| s == CoordinatorState::Settling));
    rig.handle.cancel().unwrap();

    assert_eq!(layer.wait().unwrap_err(), ExecError::Cancelled { layer: 0 });
    assert_eq!(rig.handle.status(), CoordinatorState::Cancelled);
    let cancelled = rig.seq_of(|k| matches!(k, ExecEventKind::LayerCancelled { .. }));
    assert_eq!(cancelled.len(), 1);
    let sent_after = rig.seq_of(|k| matches!(k, ExecEventKind::CommandSent { .. }));
    assert!(sent_after.iter().all(|s| *s < cancelled[0]));
    assert!(rig.all_closed_eventually());

    // A cancelled coordinator takes the next layer.
    let mut next = schedule;
    next.layer = 1;
    let report = rig.handle.submit_layer(next).unwrap().wait().unwrap();
    assert_eq!(report.layer, 1);
}

#[test]
fn pause_holds_between_stages() {
    let grid = grid();
    let schedule = schedule(&grid, Duration::from_millis(20));
    let rig = Rig::simple(&grid);

    let layer = rig.handle.submit_layer(schedule).unwrap();
    assert!(rig.handle.wait_until(WAIT, |s| s == CoordinatorState::Settling));
    rig.handle.pause().unwrap();
    assert!(rig.handle.wait_until(WAIT, |s| s == CoordinatorState::Paused));

    let sent = rig.handle.events().filter(|k| matches!(k, ExecEventKind::CommandSent { .. })).len();
    thread::sleep(Duration::from_millis(80));
    let still = rig.handle.events().filter(|k| matches!(k, ExecEventKind::CommandSent { .. })).len();
    assert_eq!(sent, still);
    assert!(layer.wait_timeout(Duration::from_millis(1)).is_none());

    rig.handle.resume().unwrap();
    assert!(layer.wait_timeout(WAIT).unwrap().is_ok());
    assert_eq!(rig.handle.status(), CoordinatorState::LayerComplete);
}

#[test]
fn layers_run_in_submission_order() {
    let grid = grid();
    let base = schedule(&grid, Duration::from_millis(1));
    let rig = Rig::simple(&grid);

    let handles: Vec<_> = (0..3)
        .map(|layer| {
            let mut s = base.clone();
            s.layer = layer;
            rig.handle.submit_layer(s).unwrap()
        })
        .collect();
    for (i, h) in handles.into_iter().enumerate() {
        assert_eq!(h.wait().unwrap().layer, i as u32);
    }
    let started: Vec<u32> = rig
        .handle
        .events()
        .filter(|k| matches!(k, ExecEventKind::LayerStarted { .. }))
        .into_iter()
        .filter_map(|e| match e.kind {
            ExecEventKind::LayerStarted { layer, .. } => Some(layer),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![0, 1, 2]);
}

#[test]
fn event_log_stays_bounded_over_many_layers() {
    let grid = grid();
    let base = schedule(&grid, Duration::ZERO);
    let rig = Rig::start(
        &grid,
        CoordinatorConfig {
            event_capacity: 64,
            ..Default::default()
        },
        |_| SimValveController::new(),
        SimPressureController::new(),
    );

    for layer in 0..40 {
        let mut s = base.clone();
        s.layer = layer;
        rig.handle.submit_layer(s).unwrap().wait().unwrap();
        assert!(rig.handle.events().len() <= 64);
    }
    let events = rig.handle.events().snapshot();
    assert_eq!(events.len(), 64);
    assert!(rig.handle.events().total_recorded() > 40 * base.stage_count() as u64);
    assert!(events.windows(2).all(|w| w[1].seq == w[0].seq + 1));
    assert_eq!(
        events.last().map(|e| &e.kind),
        Some(&ExecEventKind::LayerCompleted { layer: 39 })
    );
}

#[test]
fn unknown_zone_is_rejected() {
    let grid = grid();
    let schedule = schedule(&grid, Duration::from_millis(1));
    let safety = Arc::new(SimSafetyMonitor::new());
    let hardware = Hardware::new(safety)
        .with_zone(ZoneId::from_index(0), Arc::new(SimValveController::new()));
    let handle = Coordinator::spawn(hardware, CoordinatorConfig::default()).unwrap();

    let err = handle.submit_layer(schedule).unwrap().wait().unwrap_err();
    assert!(matches!(err, ExecError::UnknownZone { .. }));
    assert_eq!(handle.status(), CoordinatorState::Idle);
    handle.shutdown();
}

#[test]
fn pressure_deviation_faults() {
    let grid = grid();
    let schedule = schedule(&grid, Duration::from_millis(1));
    let rig = Rig::start(
        &grid,
        CoordinatorConfig {
            pressure: Some(PressurePolicy {
                targets: vec![(M0, kpa(200.0))],
                fault_threshold: kpa(10.0),
                max_pressure: kpa(500.0),
            }),
            ..Default::default()
        },
        |_| SimValveController::new(),
        SimPressureController::new().with_offset(kpa(25.0)),
    );

    let err = rig.handle.submit_layer(schedule).unwrap().wait().unwrap_err();
    assert!(matches!(err, ExecError::PressureDeviation { channel, .. } if channel == M0));
    assert_eq!(rig.handle.status(), CoordinatorState::Fault);
    assert!(rig.pressure.target(M0).is_some());
}

#[test]
fn invalid_config_is_rejected() {
    let safety = Arc::new(SimSafetyMonitor::new());
    let config = CoordinatorConfig {
        retry_extension: 0.5,
        ..Default::default()
    };
    assert!(matches!(
        Coordinator::spawn(Hardware::new(safety), config),
        Err(ExecError::InvalidConfig { .. })
    ));
}
