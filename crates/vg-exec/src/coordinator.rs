//! The execution coordinator thread and its handle.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vg_core::{Pressure, ZoneId, to_pa};
use vg_grid::MaterialId;
use vg_schedule::{Schedule, Stage};

use crate::barrier::AckBarrier;
use crate::error::{ExecError, ExecResult};
use crate::events::{DEFAULT_EVENT_CAPACITY, EventLog, ExecEventKind};
use crate::hw::{HwFault, PressureController, SafetyMonitor, SafetyViolation, ValveController};
use crate::state::{CoordinatorState, StateMachine};
use crate::zone::{ZoneMsg, ZoneWorker};

/// Supply pressure targets applied at layer start and verified after every settle.
#[derive(Debug, Clone, PartialEq)]
pub struct PressurePolicy {
    pub targets: Vec<(MaterialId, Pressure)>,
    /// Allowed |measured - target| before the layer faults.
    pub fault_threshold: Pressure,
    /// Readings above this are a safety violation.
    pub max_pressure: Pressure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Added to the stage's expected valve response to form the ack window.
    pub ack_margin: Duration,
    /// Window multiplier for the single retry of a timed-out stage.
    pub retry_extension: f64,
    pub pressure: Option<PressurePolicy>,
    /// Most recent events the coordinator's log retains.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ack_margin: Duration::from_millis(50),
            retry_extension: 2.0,
            pressure: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> ExecResult<()> {
        if !self.retry_extension.is_finite() || self.retry_extension < 1.0 {
            return Err(ExecError::InvalidConfig {
                what: "retry_extension must be finite and >= 1",
            });
        }
        if self.event_capacity == 0 {
            return Err(ExecError::InvalidConfig {
                what: "event_capacity must be >= 1",
            });
        }
        if let Some(p) = &self.pressure {
            if to_pa(p.fault_threshold) <= 0.0 || to_pa(p.max_pressure) <= 0.0 {
                return Err(ExecError::InvalidConfig {
                    what: "pressure thresholds must be > 0",
                });
            }
        }
        Ok(())
    }
}

/// Controllers the coordinator drives.
#[derive(Clone)]
pub struct Hardware {
    pub zones: BTreeMap<ZoneId, Arc<dyn ValveController>>,
    pub pressure: Option<Arc<dyn PressureController>>,
    pub safety: Arc<dyn SafetyMonitor>,
}

impl Hardware {
    pub fn new(safety: Arc<dyn SafetyMonitor>) -> Self {
        Self {
            zones: BTreeMap::new(),
            pressure: None,
            safety,
        }
    }

    pub fn with_zone(mut self, zone: ZoneId, controller: Arc<dyn ValveController>) -> Self {
        self.zones.insert(zone, controller);
        self
    }

    pub fn with_pressure(mut self, pressure: Arc<dyn PressureController>) -> Self {
        self.pressure = Some(pressure);
        self
    }
}

/// Outcome of a completed layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerReport {
    pub id: Uuid,
    pub layer: u32,
    pub stages: usize,
    /// Stage barriers that needed their one retry.
    pub retries: u32,
    pub elapsed: Duration,
    pub pattern_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorStatus {
    pub state: CoordinatorState,
    pub layer: Option<u32>,
    pub stage: Option<u32>,
    pub queued: usize,
}

pub(crate) enum Inbox {
    Submit {
        id: Uuid,
        schedule: Box<Schedule>,
        reply: Sender<ExecResult<LayerReport>>,
    },
    Pause,
    Resume,
    Cancel,
    ResetFault {
        reply: Sender<ExecResult<()>>,
    },
    /// Emergency stop raised; the flag carries the signal.
    Wake,
    Shutdown,
    ZoneAck {
        zone: ZoneId,
        run: u64,
        stage: u32,
    },
    ZoneFault {
        zone: ZoneId,
        run: u64,
        stage: u32,
        fault: HwFault,
    },
}

/// Emergency-stop line into a coordinator. Clones trigger the same stop.
#[derive(Clone)]
pub struct EmergencyStop {
    flag: Arc<AtomicBool>,
    tx: Sender<Inbox>,
}

impl EmergencyStop {
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.tx.send(Inbox::Wake);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Completion handle of one submitted layer.
pub struct LayerHandle {
    id: Uuid,
    layer: u32,
    rx: Receiver<ExecResult<LayerReport>>,
}

impl LayerHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn layer(&self) -> u32 {
        self.layer
    }

    /// Block until the layer completes, fails or is cancelled.
    pub fn wait(self) -> ExecResult<LayerReport> {
        self.rx.recv().unwrap_or(Err(ExecError::CoordinatorGone))
    }

    /// `None` if the layer is still running after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExecResult<LayerReport>> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(ExecError::CoordinatorGone)),
        }
    }
}

fn lock(status: &Mutex<CoordinatorStatus>) -> MutexGuard<'_, CoordinatorStatus> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Client side of a running coordinator.
pub struct CoordinatorHandle {
    tx: Sender<Inbox>,
    status: Arc<Mutex<CoordinatorStatus>>,
    estop: EmergencyStop,
    events: EventLog,
    thread: Option<JoinHandle<()>>,
}

impl CoordinatorHandle {
    fn send(&self, msg: Inbox) -> ExecResult<()> {
        self.tx.send(msg).map_err(|_| ExecError::CoordinatorGone)
    }

    /// Queue a layer; layers run strictly in submission order.
    pub fn submit_layer(&self, schedule: Schedule) -> ExecResult<LayerHandle> {
        let (reply, rx) = channel();
        let id = Uuid::new_v4();
        let layer = schedule.layer;
        self.send(Inbox::Submit {
            id,
            schedule: Box::new(schedule),
            reply,
        })?;
        Ok(LayerHandle { id, layer, rx })
    }

    /// Hold at the next stage boundary.
    pub fn pause(&self) -> ExecResult<()> {
        self.send(Inbox::Pause)
    }

    pub fn resume(&self) -> ExecResult<()> {
        self.send(Inbox::Resume)
    }

    /// Cancel the running layer once its current barrier resolves, and drop queued layers.
    pub fn cancel(&self) -> ExecResult<()> {
        self.send(Inbox::Cancel)
    }

    pub fn emergency_stop(&self) {
        self.estop.trigger();
    }

    pub fn estop_signal(&self) -> EmergencyStop {
        self.estop.clone()
    }

    /// Operator recovery from `Fault` back to `Idle`.
    pub fn reset_fault(&self) -> ExecResult<()> {
        let (reply, rx) = channel();
        self.send(Inbox::ResetFault { reply })?;
        rx.recv().unwrap_or(Err(ExecError::CoordinatorGone))
    }

    pub fn status(&self) -> CoordinatorState {
        lock(&self.status).state
    }

    pub fn snapshot(&self) -> CoordinatorStatus {
        lock(&self.status).clone()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Poll `status()` until `pred` holds or `timeout` passes.
    pub fn wait_until(
        &self,
        timeout: Duration,
        pred: impl Fn(CoordinatorState) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if pred(self.status()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Stop the coordinator and its zone workers.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.tx.send(Inbox::Shutdown);
            let _ = thread.join();
        }
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Job {
    id: Uuid,
    schedule: Box<Schedule>,
    reply: Sender<ExecResult<LayerReport>>,
}

/// The coordinator thread.
pub struct Coordinator {
    machine: StateMachine,
    status: Arc<Mutex<CoordinatorStatus>>,
    events: EventLog,
    estop: Arc<AtomicBool>,
    inbox: Receiver<Inbox>,
    zones: BTreeMap<ZoneId, ZoneWorker>,
    pressure: Option<Arc<dyn PressureController>>,
    safety: Arc<dyn SafetyMonitor>,
    config: CoordinatorConfig,
    queue: VecDeque<Job>,
    paused: bool,
    cancel_requested: bool,
    shutdown_requested: bool,
    run_seq: u64,
    current: Option<(u32, u32)>,
}

impl Coordinator {
    /// Start zone workers and the coordinator thread.
    pub fn spawn(hardware: Hardware, config: CoordinatorConfig) -> ExecResult<CoordinatorHandle> {
        config.validate()?;
        let (tx, rx) = channel();
        let mut zones = BTreeMap::new();
        for (zone, controller) in hardware.zones {
            zones.insert(zone, ZoneWorker::spawn(zone, controller, tx.clone())?);
        }

        let status = Arc::new(Mutex::new(CoordinatorStatus {
            state: CoordinatorState::Idle,
            layer: None,
            stage: None,
            queued: 0,
        }));
        let events = EventLog::with_capacity(config.event_capacity);
        let flag = Arc::new(AtomicBool::new(false));
        let coordinator = Coordinator {
            machine: StateMachine::new(),
            status: Arc::clone(&status),
            events: events.clone(),
            estop: Arc::clone(&flag),
            inbox: rx,
            zones,
            pressure: hardware.pressure,
            safety: hardware.safety,
            config,
            queue: VecDeque::new(),
            paused: false,
            cancel_requested: false,
            shutdown_requested: false,
            run_seq: 0,
            current: None,
        };
        let thread = thread::Builder::new()
            .name("vg-coordinator".to_string())
            .spawn(move || coordinator.run())
            .map_err(|e| ExecError::Spawn {
                what: e.to_string(),
            })?;

        Ok(CoordinatorHandle {
            estop: EmergencyStop {
                flag,
                tx: tx.clone(),
            },
            tx,
            status,
            events,
            thread: Some(thread),
        })
    }

    fn run(mut self) {
        info!(zones = self.zones.len(), "coordinator started");
        loop {
            if self.estop_raised() {
                self.safe_shutdown("emergency stop");
            }
            if self.shutdown_requested {
                break;
            }
            if self.paused && self.machine.state().is_quiescent() {
                let _ = self.set_state(CoordinatorState::Paused);
            }
            if !self.paused && self.machine.state().is_quiescent() {
                if let Some(job) = self.queue.pop_front() {
                    self.publish();
                    self.execute(job);
                    continue;
                }
            }
            match self.inbox.recv() {
                Ok(msg) => {
                    if let Some(stale) = self.on_control(msg) {
                        self.note_stale(&stale);
                    }
                }
                Err(_) => break,
            }
        }
        for worker in self.zones.values_mut() {
            debug!(zone = %worker.zone, "stopping zone worker");
            worker.stop();
        }
        info!(state = ?self.machine.state(), "coordinator stopped");
    }

    fn estop_raised(&self) -> bool {
        self.estop.load(Ordering::SeqCst)
    }

    fn check_estop(&self) -> ExecResult<()> {
        if self.estop_raised() {
            Err(ExecError::EmergencyStop)
        } else {
            Ok(())
        }
    }

    fn publish(&self) {
        let mut status = lock(&self.status);
        status.state = self.machine.state();
        status.layer = self.current.map(|(layer, _)| layer);
        status.stage = self.current.map(|(_, stage)| stage);
        status.queued = self.queue.len();
    }

    fn set_state(&mut self, to: CoordinatorState) -> ExecResult<()> {
        let from = self.machine.transition(to)?;
        debug!(?from, ?to, "state change");
        self.events.record(ExecEventKind::StateChanged { from, to });
        self.publish();
        Ok(())
    }

    /// Handle a control message. Zone traffic is handed back to the caller.
    fn on_control(&mut self, msg: Inbox) -> Option<Inbox> {
        match msg {
            Inbox::Submit {
                id,
                schedule,
                reply,
            } => self.enqueue(Job {
                id,
                schedule,
                reply,
            }),
            Inbox::Pause => {
                self.paused = true;
                if self.machine.state().is_quiescent() {
                    let _ = self.set_state(CoordinatorState::Paused);
                }
            }
            Inbox::Resume => {
                self.paused = false;
                if self.machine.state() == CoordinatorState::Paused && self.current.is_none() {
                    let _ = self.set_state(CoordinatorState::Idle);
                }
            }
            Inbox::Cancel => {
                if self.current.is_some() {
                    self.cancel_requested = true;
                }
                self.drain_queue(|job| ExecError::Cancelled {
                    layer: job.schedule.layer,
                });
            }
            Inbox::ResetFault { reply } => {
                let state = self.machine.state();
                let outcome = if state == CoordinatorState::Fault {
                    info!("fault reset by operator");
                    self.set_state(CoordinatorState::Idle)
                } else {
                    Err(ExecError::InvalidTransition {
                        from: state,
                        to: CoordinatorState::Idle,
                    })
                };
                let _ = reply.send(outcome);
            }
            Inbox::Wake => {}
            Inbox::Shutdown => {
                self.shutdown_requested = true;
                if self.current.is_some() {
                    self.cancel_requested = true;
                }
            }
            zone @ (Inbox::ZoneAck { .. } | Inbox::ZoneFault { .. }) => return Some(zone),
        }
        None
    }

    fn enqueue(&mut self, job: Job) {
        let state = self.machine.state();
        if matches!(state, CoordinatorState::Fault | CoordinatorState::SafeShutdown)
            || self.shutdown_requested
        {
            let _ = job.reply.send(Err(ExecError::NotAccepting { state }));
            return;
        }
        if let Some(zone) = job
            .schedule
            .zones()
            .into_iter()
            .find(|z| !self.zones.contains_key(z))
        {
            let _ = job.reply.send(Err(ExecError::UnknownZone { zone }));
            return;
        }
        let layer = job.schedule.layer;
        self.events.record(ExecEventKind::LayerAccepted { layer });
        debug!(layer, id = %job.id, "layer queued");
        self.queue.push_back(job);
        self.publish();
    }

    fn drain_queue(&mut self, reason: impl Fn(&Job) -> ExecError) {
        for job in self.queue.drain(..) {
            let _ = job.reply.send(Err(reason(&job)));
        }
        self.publish();
    }

    fn note_stale(&self, msg: &Inbox) {
        if let Inbox::ZoneAck { zone, run, stage } | Inbox::ZoneFault { zone, run, stage, .. } =
            msg
        {
            debug!(%zone, run, stage, "ignoring stale zone report");
        }
    }

    fn broadcast_close(&mut self) {
        for worker in self.zones.values() {
            worker.send(ZoneMsg::CloseAll);
        }
        self.events.record(ExecEventKind::ValvesClosed);
    }

    fn execute(&mut self, job: Job) {
        self.run_seq += 1;
        self.cancel_requested = false;
        let layer = job.schedule.layer;
        let started = Instant::now();
        info!(layer, stages = job.schedule.stage_count(), id = %job.id, "layer started");
        self.events.record(ExecEventKind::LayerStarted {
            layer,
            stages: job.schedule.stage_count(),
        });

        let outcome = match self.drive(&job.schedule) {
            Ok(retries) => {
                let report = LayerReport {
                    id: job.id,
                    layer,
                    stages: job.schedule.stage_count(),
                    retries,
                    elapsed: started.elapsed(),
                    pattern_hash: job.schedule.stats.pattern_hash.clone(),
                };
                self.events.record(ExecEventKind::LayerCompleted { layer });
                info!(layer, elapsed_ms = report.elapsed.as_millis() as u64, "layer complete");
                Ok(report)
            }
            Err(err) => Err(self.fail_layer(layer, err)),
        };
        self.current = None;
        self.publish();
        let _ = job.reply.send(outcome);
    }

    /// Run every stage of `schedule`. Returns the number of retried barriers.
    fn drive(&mut self, schedule: &Schedule) -> ExecResult<u32> {
        let run = self.run_seq;
        let layer = schedule.layer;
        self.current = Some((layer, 0));
        self.set_state(CoordinatorState::Preparing)?;
        self.apply_pressure_targets()?;

        let mut retries = 0;
        for stage in &schedule.stages {
            if stage.index > 0 {
                self.at_boundary(layer)?;
                self.set_state(CoordinatorState::Preparing)?;
            }
            self.current = Some((layer, stage.index));
            self.check_estop()?;
            self.safety.check()?;

            let zones = stage.barrier.zones.clone();
            self.dispatch(run, layer, stage, &zones, 1)?;
            self.set_state(CoordinatorState::AwaitingZoneAck)?;
            retries += self.await_barrier(run, layer, stage)?;

            self.set_state(CoordinatorState::Committed)?;
            self.events.record(ExecEventKind::BarrierReleased {
                layer,
                stage: stage.index,
            });
            self.set_state(CoordinatorState::Settling)?;
            self.safety.check()?;
            self.dwell(stage.timing.settle)?;
            self.verify_pressure(layer, stage.index)?;
        }

        self.check_estop()?;
        if self.cancel_requested {
            return Err(ExecError::Cancelled { layer });
        }
        self.set_state(CoordinatorState::LayerComplete)?;
        Ok(retries)
    }

    /// Honor cancel and pause requests between stages.
    fn at_boundary(&mut self, layer: u32) -> ExecResult<()> {
        loop {
            match self.inbox.try_recv() {
                Ok(msg) => {
                    if let Some(stale) = self.on_control(msg) {
                        self.note_stale(&stale);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Err(ExecError::CoordinatorGone),
            }
        }
        self.check_estop()?;
        if self.cancel_requested {
            return Err(ExecError::Cancelled { layer });
        }
        if !self.paused {
            return Ok(());
        }

        self.set_state(CoordinatorState::Paused)?;
        info!(layer, "paused at stage boundary");
        while self.paused {
            let msg = self.inbox.recv().map_err(|_| ExecError::CoordinatorGone)?;
            if let Some(stale) = self.on_control(msg) {
                self.note_stale(&stale);
            }
            self.check_estop()?;
            if self.cancel_requested {
                return Err(ExecError::Cancelled { layer });
            }
        }
        info!(layer, "resumed");
        Ok(())
    }

    fn dispatch(
        &mut self,
        run: u64,
        layer: u32,
        stage: &Stage,
        zones: &[ZoneId],
        attempt: u32,
    ) -> ExecResult<()> {
        for &zone in zones {
            let worker = self
                .zones
                .get(&zone)
                .ok_or(ExecError::UnknownZone { zone })?;
            let commits = stage
                .command_for(zone)
                .map(|c| c.commits.clone())
                .unwrap_or_default();
            let sent = worker.send(ZoneMsg::Commit {
                run,
                layer,
                stage: stage.index,
                attempt,
                commits,
            });
            if !sent {
                return Err(ExecError::HwFault {
                    zone,
                    fault: HwFault::new("zone worker is not running"),
                });
            }
            self.events.record(ExecEventKind::CommandSent {
                layer,
                stage: stage.index,
                zone,
                attempt,
            });
        }
        Ok(())
    }

    /// Block until every addressed zone confirms `stage`, retrying once.
    fn await_barrier(&mut self, run: u64, layer: u32, stage: &Stage) -> ExecResult<u32> {
        let mut barrier = AckBarrier::new(stage.index, stage.barrier.zones.iter().copied());
        let base = stage.timing.valve_response + self.config.ack_margin;
        let mut attempt = 1;
        let mut deadline = Instant::now() + base;

        loop {
            if barrier.is_complete() {
                return Ok(attempt - 1);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let missing = barrier.missing();
                self.events.record(ExecEventKind::AckTimeout {
                    layer,
                    stage: stage.index,
                    zones: missing.clone(),
                    attempt,
                });
                if attempt >= 2 {
                    return Err(ExecError::ZoneAckTimeout {
                        layer,
                        stage: stage.index,
                        zones: missing,
                    });
                }
                attempt += 1;
                let window = base.mul_f64(self.config.retry_extension);
                warn!(layer, stage = stage.index, ?missing, window_ms = window.as_millis() as u64, "ack timeout, retrying");
                self.dispatch(run, layer, stage, &missing, attempt)?;
                deadline = Instant::now() + window;
                continue;
            }

            match self.inbox.recv_timeout(remaining) {
                Ok(msg) => {
                    match self.on_control(msg) {
                        Some(Inbox::ZoneAck {
                            zone,
                            run: r,
                            stage: s,
                        }) if r == run && s == stage.index => {
                            if barrier.arrive(zone) {
                                self.events.record(ExecEventKind::ZoneAcked {
                                    layer,
                                    stage: s,
                                    zone,
                                });
                            }
                        }
                        Some(Inbox::ZoneFault {
                            zone,
                            run: r,
                            stage: s,
                            fault,
                        }) if r == run && s == stage.index => {
                            self.events.record(ExecEventKind::ZoneFaulted {
                                layer,
                                stage: s,
                                zone,
                                what: fault.to_string(),
                            });
                            return Err(ExecError::HwFault { zone, fault });
                        }
                        Some(stale) => self.note_stale(&stale),
                        None => {}
                    }
                    self.check_estop()?;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(ExecError::CoordinatorGone),
            }
        }
    }

    /// Settle dwell; ends early on cancel and aborts on emergency stop.
    fn dwell(&mut self, settle: Duration) -> ExecResult<()> {
        let deadline = Instant::now() + settle;
        loop {
            self.check_estop()?;
            if self.cancel_requested {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            match self.inbox.recv_timeout(remaining) {
                Ok(msg) => {
                    if let Some(stale) = self.on_control(msg) {
                        self.note_stale(&stale);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Ok(()),
                Err(RecvTimeoutError::Disconnected) => return Err(ExecError::CoordinatorGone),
            }
        }
    }

    fn apply_pressure_targets(&self) -> ExecResult<()> {
        let (Some(pressure), Some(policy)) = (&self.pressure, &self.config.pressure) else {
            return Ok(());
        };
        for &(channel, target) in &policy.targets {
            pressure
                .set_target(channel, target)
                .map_err(ExecError::Pressure)?;
        }
        Ok(())
    }

    fn verify_pressure(&self, layer: u32, stage: u32) -> ExecResult<()> {
        let (Some(pressure), Some(policy)) = (&self.pressure, &self.config.pressure) else {
            return Ok(());
        };
        for &(channel, target) in &policy.targets {
            let measured = pressure.read(channel).map_err(ExecError::Pressure)?;
            let measured_pa = to_pa(measured);
            if measured_pa > to_pa(policy.max_pressure) {
                return Err(SafetyViolation::new(format!(
                    "channel {channel} at {:.1} kPa exceeds maximum {:.1} kPa",
                    measured_pa / 1e3,
                    to_pa(policy.max_pressure) / 1e3
                ))
                .into());
            }
            if (measured_pa - to_pa(target)).abs() > to_pa(policy.fault_threshold) {
                return Err(ExecError::PressureDeviation {
                    channel,
                    target_kpa: to_pa(target) / 1e3,
                    measured_kpa: measured_pa / 1e3,
                });
            }
        }
        self.events
            .record(ExecEventKind::PressureChecked { layer, stage });
        Ok(())
    }

    /// Put the machine into the state `err` calls for; returns `err`.
    fn fail_layer(&mut self, layer: u32, err: ExecError) -> ExecError {
        match &err {
            ExecError::EmergencyStop => self.safe_shutdown("emergency stop"),
            ExecError::SafetyViolation(v) => {
                self.events
                    .record(ExecEventKind::SafetyTripped { what: v.what.clone() });
                self.safe_shutdown(&v.what);
            }
            ExecError::Cancelled { .. } => {
                self.broadcast_close();
                if self.set_state(CoordinatorState::Cancelled).is_err() {
                    // Cancelled from a state that cannot cancel: treat as a fault.
                    self.enter_fault(layer, &err);
                } else {
                    self.events.record(ExecEventKind::LayerCancelled { layer });
                    info!(layer, "layer cancelled");
                }
            }
            _ => self.enter_fault(layer, &err),
        }
        err
    }

    fn enter_fault(&mut self, layer: u32, err: &ExecError) {
        error!(layer, %err, "layer faulted");
        self.broadcast_close();
        self.safety.report_fault(&err.to_string());
        let _ = self.set_state(CoordinatorState::Fault);
        self.events.record(ExecEventKind::LayerFailed {
            layer,
            reason: err.to_string(),
        });
        let reason = err.to_string();
        self.drain_queue(|job| ExecError::Halted {
            layer: job.schedule.layer,
            reason: reason.clone(),
        });
    }

    fn safe_shutdown(&mut self, reason: &str) {
        if self.machine.state().is_terminal() {
            return;
        }
        error!(reason, "entering safe shutdown");
        if self.estop_raised() {
            self.events.record(ExecEventKind::EmergencyStop);
        }
        let _ = self.set_state(CoordinatorState::SafeShutdown);
        self.broadcast_close();
        if let Some(pressure) = &self.pressure {
            match pressure.vent_all() {
                Ok(()) => self.events.record(ExecEventKind::PressureVented),
                Err(fault) => error!(%fault, "vent failed"),
            }
        }
        self.paused = false;
        self.drain_queue(|job| ExecError::Halted {
            layer: job.schedule.layer,
            reason: "safe shutdown".to_string(),
        });
    }
}
