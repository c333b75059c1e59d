//! Simulated machine: a coordinator wired to in-memory hardware.

use std::sync::Arc;
use std::time::Duration;

use vg_core::ZoneId;
use vg_exec::{
    Coordinator, CoordinatorConfig, CoordinatorHandle, Hardware, SimPressureController,
    SimSafetyMonitor, SimValveController,
};
use vg_grid::Grid;

use crate::error::AppResult;

/// Fault injection for dry runs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimOptions {
    /// Delay of every valve batch.
    pub latency: Duration,
    /// This zone never acknowledges its first command in time.
    pub drop_zone: Option<ZoneId>,
}

pub struct SimulatedMachine {
    pub coordinator: CoordinatorHandle,
    pub zones: Vec<(ZoneId, Arc<SimValveController>)>,
    pub pressure: Arc<SimPressureController>,
    pub safety: Arc<SimSafetyMonitor>,
}

impl SimulatedMachine {
    pub fn start(grid: &Grid, config: CoordinatorConfig, sim: SimOptions) -> AppResult<Self> {
        let safety = Arc::new(SimSafetyMonitor::new());
        let pressure = Arc::new(SimPressureController::new());
        let mut hardware = Hardware::new(safety.clone()).with_pressure(pressure.clone());

        // A dropped ack outlasts both the first window and the extended retry.
        let window = Duration::from_secs(1) + config.ack_margin.mul_f64(1.0 + config.retry_extension);
        let mut zones = Vec::with_capacity(grid.zones().len());
        for zone in grid.zones() {
            let mut valves = SimValveController::new().with_latency(sim.latency);
            if sim.drop_zone == Some(zone.id) {
                valves = valves.stall_first(1, window);
            }
            let valves = Arc::new(valves);
            hardware = hardware.with_zone(zone.id, valves.clone());
            zones.push((zone.id, valves));
        }

        let coordinator = Coordinator::spawn(hardware, config)?;
        Ok(Self {
            coordinator,
            zones,
            pressure,
            safety,
        })
    }

    /// Nodes with any valve open, over all zones.
    pub fn open_nodes(&self) -> usize {
        self.zones.iter().map(|(_, v)| v.open_nodes()).sum()
    }
}
