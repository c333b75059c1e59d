//! vg-schedule: compile routing plans into zone-partitioned, barrier-separated
//! command stages, and exchange them as checksummed layer records.
//!
//! A schedule opens trunk channels before branch channels and deposition
//! outlets last. Every stage ends in a barrier: all zones addressed by stage N
//! must confirm before stage N+1 is dispatched. Node masks in commands are
//! cumulative, so a command always states the complete valve state a node
//! should hold after its stage.

pub mod compile;
pub mod error;
pub mod hash;
pub mod options;
pub mod record;
pub mod schedule;

pub use compile::ScheduleCompiler;
pub use error::{ScheduleError, ScheduleResult};
pub use options::{CompileOptions, ValveTechnology};
pub use record::{FORMAT_VERSION, ActivationEntry, LayerRecord, PlanFile, StageRecord};
pub use schedule::{
    Activation, Barrier, ExecutionCommand, NodeCommit, Schedule, ScheduleStats, Stage, StageKind,
    StageTiming,
};
