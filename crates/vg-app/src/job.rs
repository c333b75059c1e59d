//! Print job: drives layers through planning and execution.

use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use vg_exec::CoordinatorHandle;
use vg_grid::Grid;
use vg_route::TargetSet;
use vg_schedule::Schedule;

use crate::error::{AppError, AppResult};
use crate::phase::{PrintPhase, SystemState};
use crate::plan_service::{PlanOptions, plan_layer};
use crate::progress::{JobProgressEvent, JobStage, LayerProgress, ProgressCallback};

#[derive(Debug, Clone, PartialEq)]
pub enum LayerOutcome {
    Printed {
        layer: u32,
        stages: usize,
        attempts: u32,
        skipped_targets: usize,
        elapsed: Duration,
    },
    /// Routing failed; nothing reached the hardware.
    Aborted { layer: u32, reason: String },
}

impl LayerOutcome {
    pub fn layer(&self) -> u32 {
        match self {
            LayerOutcome::Printed { layer, .. } | LayerOutcome::Aborted { layer, .. } => *layer,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub started_at: String,
    pub layers: Vec<LayerOutcome>,
    pub elapsed_s: f64,
}

impl JobSummary {
    pub fn printed(&self) -> usize {
        self.layers
            .iter()
            .filter(|l| matches!(l, LayerOutcome::Printed { .. }))
            .count()
    }

    pub fn aborted(&self) -> usize {
        self.layers.len() - self.printed()
    }
}

struct Reporter<'p> {
    start: Instant,
    callback: Option<ProgressCallback<'p>>,
}

impl Reporter<'_> {
    fn emit(&mut self, stage: JobStage, phase: PrintPhase, message: Option<String>, layer: Option<LayerProgress>) {
        if let Some(cb) = self.callback.as_mut() {
            let event =
                JobProgressEvent::stage(stage, phase, self.start.elapsed().as_secs_f64(), message);
            cb(match layer {
                Some(layer) => event.with_layer(layer),
                None => event,
            });
        }
    }
}

/// One print job on one grid, executed through a running coordinator.
pub struct PrintJob<'a> {
    grid: &'a Grid,
    coordinator: &'a CoordinatorHandle,
    options: PlanOptions,
}

impl<'a> PrintJob<'a> {
    pub fn new(grid: &'a Grid, coordinator: &'a CoordinatorHandle, options: PlanOptions) -> Self {
        Self {
            grid,
            coordinator,
            options,
        }
    }

    pub fn options(&self) -> &PlanOptions {
        &self.options
    }

    /// Plan and print `layers` in order.
    ///
    /// Routing failures abort only their layer. Any execution failure stops
    /// the job and leaves `state` in `Faulted` or `ShuttingDown`.
    pub fn run(
        &self,
        state: &mut SystemState,
        layers: &[TargetSet],
        progress: Option<ProgressCallback<'_>>,
    ) -> AppResult<JobSummary> {
        let mut reporter = Reporter {
            start: Instant::now(),
            callback: progress,
        };
        let started_at = chrono::Utc::now().to_rfc3339();
        self.start(state, &mut reporter)?;

        let mut outcomes = Vec::with_capacity(layers.len());
        for (index, targets) in layers.iter().enumerate() {
            let mut lp = LayerProgress {
                layer: targets.layer,
                layer_index: index,
                layer_count: layers.len(),
                ..Default::default()
            };
            state.set_layer(Some(targets.layer));
            state.transition(PrintPhase::Routing)?;
            reporter.emit(JobStage::Routing, state.phase(), None, Some(lp.clone()));

            let planned = match plan_layer(self.grid, targets, &self.options) {
                Ok(planned) => planned,
                Err(err) if err.is_layer_local() => {
                    warn!(layer = targets.layer, %err, "layer aborted");
                    reporter.emit(
                        JobStage::LayerSkipped,
                        state.phase(),
                        Some(err.to_string()),
                        Some(lp),
                    );
                    outcomes.push(LayerOutcome::Aborted {
                        layer: targets.layer,
                        reason: err.to_string(),
                    });
                    continue;
                }
                Err(err) => return Err(Self::halt(state, err)),
            };
            lp.attempts = Some(planned.accepted.attempts);
            lp.stages = Some(planned.schedule.stage_count());
            lp.unroutable = planned.accepted.plan.unroutable.len();
            reporter.emit(JobStage::Compiling, state.phase(), None, Some(lp.clone()));

            let elapsed = self.execute(state, planned.schedule, &mut reporter, &lp)?;
            outcomes.push(LayerOutcome::Printed {
                layer: targets.layer,
                stages: lp.stages.unwrap_or_default(),
                attempts: planned.accepted.attempts,
                skipped_targets: lp.unroutable,
                elapsed,
            });
        }

        self.finish(state, &mut reporter, started_at, outcomes)
    }

    /// Print pre-compiled schedules, e.g. from a plan file.
    pub fn run_schedules(
        &self,
        state: &mut SystemState,
        schedules: Vec<Schedule>,
        progress: Option<ProgressCallback<'_>>,
    ) -> AppResult<JobSummary> {
        let mut reporter = Reporter {
            start: Instant::now(),
            callback: progress,
        };
        let started_at = chrono::Utc::now().to_rfc3339();
        self.start(state, &mut reporter)?;

        let count = schedules.len();
        let mut outcomes = Vec::with_capacity(count);
        for (index, schedule) in schedules.into_iter().enumerate() {
            let lp = LayerProgress {
                layer: schedule.layer,
                layer_index: index,
                layer_count: count,
                stages: Some(schedule.stage_count()),
                ..Default::default()
            };
            state.set_layer(Some(schedule.layer));
            state.transition(PrintPhase::Routing)?;
            let layer = schedule.layer;
            let stages = schedule.stage_count();
            let elapsed = self.execute(state, schedule, &mut reporter, &lp)?;
            outcomes.push(LayerOutcome::Printed {
                layer,
                stages,
                attempts: 0,
                skipped_targets: 0,
                elapsed,
            });
        }

        self.finish(state, &mut reporter, started_at, outcomes)
    }

    fn start(&self, state: &mut SystemState, reporter: &mut Reporter<'_>) -> AppResult<()> {
        state.transition(PrintPhase::Homing)?;
        reporter.emit(JobStage::Preparing, state.phase(), Some("homing".to_string()), None);
        state.transition(PrintPhase::Heating)?;
        reporter.emit(
            JobStage::Preparing,
            state.phase(),
            Some("pressurizing".to_string()),
            None,
        );
        Ok(())
    }

    fn execute(
        &self,
        state: &mut SystemState,
        schedule: Schedule,
        reporter: &mut Reporter<'_>,
        lp: &LayerProgress,
    ) -> AppResult<Duration> {
        state.transition(PrintPhase::Committing)?;
        reporter.emit(JobStage::Executing, state.phase(), None, Some(lp.clone()));

        let outcome = self
            .coordinator
            .submit_layer(schedule)
            .and_then(|handle| handle.wait());
        let report = match outcome {
            Ok(report) => report,
            Err(err) => return Err(Self::halt(state, err.into())),
        };

        state.transition(PrintPhase::Settling)?;
        reporter.emit(JobStage::LayerDone, state.phase(), None, Some(lp.clone()));
        info!(
            layer = report.layer,
            stages = report.stages,
            retries = report.retries,
            "layer printed"
        );
        Ok(report.elapsed)
    }

    fn finish(
        &self,
        state: &mut SystemState,
        reporter: &mut Reporter<'_>,
        started_at: String,
        layers: Vec<LayerOutcome>,
    ) -> AppResult<JobSummary> {
        state.set_layer(None);
        state.transition(PrintPhase::Idle)?;
        let summary = JobSummary {
            started_at,
            layers,
            elapsed_s: reporter.start.elapsed().as_secs_f64(),
        };
        reporter.emit(
            JobStage::Completed,
            state.phase(),
            Some(format!(
                "{} printed, {} aborted",
                summary.printed(),
                summary.aborted()
            )),
            None,
        );
        Ok(summary)
    }

    /// Move `state` to where `err` leaves the machine.
    fn halt(state: &mut SystemState, err: AppError) -> AppError {
        let to = if err.is_safety_critical() {
            PrintPhase::ShuttingDown
        } else {
            PrintPhase::Faulted
        };
        error!(layer = ?state.active_layer(), %err, "print job halted");
        if let Err(e) = state.transition(to) {
            warn!(%e, "phase not updated");
        }
        err
    }
}
