//! Physical limits the estimator checks plans against.

use vg_core::{Pressure, kpa, to_pa};

use crate::error::{FeasibilityError, FeasibilityResult};

/// Linear laminar pressure model plus actuation limits.
///
/// Channel drop = `channel_resistance_pa_per_unit_mm * length_mm * flow`;
/// every valve a path passes through adds `valve_loss`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeasibilityLimits {
    pub channel_resistance_pa_per_unit_mm: f64,
    pub valve_loss: Pressure,
    pub pressure_tolerance: Pressure,
    /// Simultaneously open directional slots allowed at one node.
    pub max_open_valves_per_node: Option<u32>,
}

impl Default for FeasibilityLimits {
    fn default() -> Self {
        Self {
            channel_resistance_pa_per_unit_mm: 50.0,
            valve_loss: kpa(1.0),
            pressure_tolerance: kpa(250.0),
            max_open_valves_per_node: None,
        }
    }
}

impl FeasibilityLimits {
    pub fn validate(&self) -> FeasibilityResult<()> {
        let r = self.channel_resistance_pa_per_unit_mm;
        if !r.is_finite() || r < 0.0 {
            return Err(FeasibilityError::InvalidLimit {
                what: "channel resistance must be finite and >= 0",
            });
        }
        let loss = to_pa(self.valve_loss);
        if !loss.is_finite() || loss < 0.0 {
            return Err(FeasibilityError::InvalidLimit {
                what: "valve loss must be finite and >= 0",
            });
        }
        let tol = to_pa(self.pressure_tolerance);
        if !tol.is_finite() || tol <= 0.0 {
            return Err(FeasibilityError::InvalidLimit {
                what: "pressure tolerance must be finite and > 0",
            });
        }
        if self.max_open_valves_per_node == Some(0) {
            return Err(FeasibilityError::InvalidLimit {
                what: "per-node open valve limit must be > 0",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vg_core::pa;

    #[test]
    fn defaults_are_valid() {
        assert!(FeasibilityLimits::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_tolerance() {
        let limits = FeasibilityLimits {
            pressure_tolerance: pa(0.0),
            ..Default::default()
        };
        assert!(limits.validate().is_err());
    }
}
