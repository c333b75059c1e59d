//! Compiler options and valve technology timing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ScheduleError, ScheduleResult};

/// Actuator family of the valve array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValveTechnology {
    #[default]
    PneumaticSolenoid,
    Piezoelectric,
    Electromagnetic,
    Microfluidic,
}

impl ValveTechnology {
    /// Typical open/close response time.
    pub fn default_response(self) -> Duration {
        match self {
            ValveTechnology::PneumaticSolenoid => Duration::from_millis(10),
            ValveTechnology::Piezoelectric => Duration::from_millis(1),
            ValveTechnology::Electromagnetic => Duration::from_millis(5),
            ValveTechnology::Microfluidic => Duration::from_millis(20),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompileOptions {
    pub technology: ValveTechnology,
    /// Replaces the technology's typical response time.
    pub response_override: Option<Duration>,
    /// Dwell after each stage's barrier before the next stage.
    pub settle: Duration,
    /// Channel depth levels merged into one stage.
    pub depth_per_stage: u32,
    /// Split stages touching more nodes than this.
    pub max_nodes_per_stage: Option<usize>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            technology: ValveTechnology::default(),
            response_override: None,
            settle: Duration::from_millis(20),
            depth_per_stage: 2,
            max_nodes_per_stage: None,
        }
    }
}

impl CompileOptions {
    pub fn valve_response(&self) -> Duration {
        self.response_override
            .unwrap_or_else(|| self.technology.default_response())
    }

    pub fn validate(&self) -> ScheduleResult<()> {
        if self.depth_per_stage == 0 {
            return Err(ScheduleError::InvalidOption {
                what: "depth_per_stage must be >= 1",
            });
        }
        if self.max_nodes_per_stage == Some(0) {
            return Err(ScheduleError::InvalidOption {
                what: "max_nodes_per_stage must be >= 1",
            });
        }
        Ok(())
    }
}
