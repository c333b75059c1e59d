//! In-memory hardware for dry runs and tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use vg_core::{NodeId, Pressure, pa, to_pa};
use vg_grid::{MaterialId, ValveMask};

use crate::hw::{Ack, HwFault, PressureController, SafetyMonitor, SafetyViolation, ValveController, ValveState};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct Valves {
    masks: HashMap<NodeId, ValveMask>,
    latency: Duration,
    /// Remaining stalled calls and their extra delay.
    stall: Option<(u32, Duration)>,
    faults: HashSet<NodeId>,
    corrupt_readback: bool,
    set_calls: usize,
    close_calls: usize,
}

/// Valve controller that stores masks in memory.
#[derive(Debug, Default)]
pub struct SimValveController {
    inner: Mutex<Valves>,
}

impl SimValveController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `set_batch` by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        guard(&self.inner).latency = latency;
        self
    }

    /// Delay the next `calls` `set_batch` calls by an extra `delay`.
    pub fn stall_first(self, calls: u32, delay: Duration) -> Self {
        guard(&self.inner).stall = Some((calls, delay));
        self
    }

    /// `set_batch` on `node` fails.
    pub fn fault_at(self, node: NodeId) -> Self {
        guard(&self.inner).faults.insert(node);
        self
    }

    /// Read-back reports a mask different from the one commanded.
    pub fn corrupt_readback(self) -> Self {
        guard(&self.inner).corrupt_readback = true;
        self
    }

    pub fn mask(&self, node: NodeId) -> ValveMask {
        guard(&self.inner)
            .masks
            .get(&node)
            .copied()
            .unwrap_or_default()
    }

    /// Nodes with any valve open.
    pub fn open_nodes(&self) -> usize {
        guard(&self.inner)
            .masks
            .values()
            .filter(|m| !m.is_closed())
            .count()
    }

    pub fn set_calls(&self) -> usize {
        guard(&self.inner).set_calls
    }

    pub fn close_calls(&self) -> usize {
        guard(&self.inner).close_calls
    }
}

impl ValveController for SimValveController {
    fn set_batch(&self, node: NodeId, mask: ValveMask) -> Result<Ack, HwFault> {
        let delay = {
            let mut v = guard(&self.inner);
            v.set_calls += 1;
            if v.faults.contains(&node) {
                return Err(HwFault::at(node, "driver did not respond"));
            }
            let mut delay = v.latency;
            if let Some((left, extra)) = v.stall {
                delay += extra;
                v.stall = (left > 1).then(|| (left - 1, extra));
            }
            delay
        };
        // Sleep without the lock so reads stay responsive.
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        guard(&self.inner).masks.insert(node, mask);
        Ok(Ack { node, mask })
    }

    fn read_back(&self, node: NodeId) -> Result<ValveState, HwFault> {
        let v = guard(&self.inner);
        let mask = v.masks.get(&node).copied().unwrap_or_default();
        if v.corrupt_readback {
            return Ok(ValveMask(mask.0 ^ 1));
        }
        Ok(mask)
    }

    fn close_all(&self) -> Result<(), HwFault> {
        let mut v = guard(&self.inner);
        v.masks.clear();
        v.close_calls += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Channels {
    targets: HashMap<MaterialId, f64>,
    offset_pa: f64,
}

/// Pressure regulator that reads back its target plus a fixed offset.
#[derive(Debug, Default)]
pub struct SimPressureController {
    inner: Mutex<Channels>,
    vented: AtomicBool,
}

impl SimPressureController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Readings deviate from the target by `offset`.
    pub fn with_offset(self, offset: Pressure) -> Self {
        guard(&self.inner).offset_pa = to_pa(offset);
        self
    }

    pub fn target(&self, channel: MaterialId) -> Option<Pressure> {
        guard(&self.inner).targets.get(&channel).copied().map(pa)
    }

    pub fn is_vented(&self) -> bool {
        self.vented.load(Ordering::SeqCst)
    }
}

impl PressureController for SimPressureController {
    fn set_target(&self, channel: MaterialId, value: Pressure) -> Result<(), HwFault> {
        guard(&self.inner).targets.insert(channel, to_pa(value));
        self.vented.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self, channel: MaterialId) -> Result<Pressure, HwFault> {
        if self.is_vented() {
            return Ok(pa(0.0));
        }
        let c = guard(&self.inner);
        let target = c
            .targets
            .get(&channel)
            .copied()
            .ok_or_else(|| HwFault::new(format!("channel {channel} has no target")))?;
        Ok(pa(target + c.offset_pa))
    }

    fn vent_all(&self) -> Result<(), HwFault> {
        self.vented.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Safety monitor that trips on request.
#[derive(Debug, Default)]
pub struct SimSafetyMonitor {
    tripped: AtomicBool,
    reported: Mutex<Vec<String>>,
}

impl SimSafetyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every following `check`.
    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.tripped.store(false, Ordering::SeqCst);
    }

    /// Faults the coordinator reported.
    pub fn reported(&self) -> Vec<String> {
        guard(&self.reported).clone()
    }
}

impl SafetyMonitor for SimSafetyMonitor {
    fn check(&self) -> Result<(), SafetyViolation> {
        if self.tripped.load(Ordering::SeqCst) {
            return Err(SafetyViolation::new("interlock open"));
        }
        Ok(())
    }

    fn report_fault(&self, what: &str) {
        guard(&self.reported).push(what.to_string());
    }
}
