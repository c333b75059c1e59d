//! Auditable in-memory log of coordinator events.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use vg_core::ZoneId;

use crate::state::CoordinatorState;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecEventKind {
    LayerAccepted { layer: u32 },
    LayerStarted { layer: u32, stages: usize },
    StateChanged { from: CoordinatorState, to: CoordinatorState },
    CommandSent { layer: u32, stage: u32, zone: ZoneId, attempt: u32 },
    ZoneAcked { layer: u32, stage: u32, zone: ZoneId },
    BarrierReleased { layer: u32, stage: u32 },
    AckTimeout { layer: u32, stage: u32, zones: Vec<ZoneId>, attempt: u32 },
    ZoneFaulted { layer: u32, stage: u32, zone: ZoneId, what: String },
    PressureChecked { layer: u32, stage: u32 },
    SafetyTripped { what: String },
    EmergencyStop,
    ValvesClosed,
    PressureVented,
    LayerCompleted { layer: u32 },
    LayerCancelled { layer: u32 },
    LayerFailed { layer: u32, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecEvent {
    pub seq: u64,
    /// Offset from log creation.
    pub at: Duration,
    pub kind: ExecEventKind,
}

/// Events kept by a log created with `EventLog::new`.
pub const DEFAULT_EVENT_CAPACITY: usize = 16_384;

#[derive(Debug)]
struct Inner {
    start: Instant,
    capacity: usize,
    next_seq: u64,
    events: VecDeque<ExecEvent>,
}

/// Shared event log holding the most recent `capacity` events. Clones share one log.
///
/// Sequence numbers keep counting across evictions, so gaps at the front
/// show how much history was dropped.
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<Mutex<Inner>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// A log that evicts its oldest event beyond `capacity` (at least 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                start: Instant::now(),
                capacity,
                next_seq: 0,
                events: VecDeque::with_capacity(capacity.min(1024)),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, kind: ExecEventKind) {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let at = inner.start.elapsed();
        if inner.events.len() == inner.capacity {
            inner.events.pop_front();
        }
        inner.events.push_back(ExecEvent { seq, at, kind });
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Events recorded since creation, including evicted ones.
    pub fn total_recorded(&self) -> u64 {
        self.lock().next_seq
    }

    pub fn snapshot(&self) -> Vec<ExecEvent> {
        self.lock().events.iter().cloned().collect()
    }

    /// Take every retained event, leaving the log empty.
    pub fn drain(&self) -> Vec<ExecEvent> {
        self.lock().events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events matching `pred`, in order.
    pub fn filter(&self, pred: impl Fn(&ExecEventKind) -> bool) -> Vec<ExecEvent> {
        self.lock()
            .events
            .iter()
            .filter(|e| pred(&e.kind))
            .cloned()
            .collect()
    }
}
