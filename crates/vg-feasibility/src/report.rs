//! Feasibility verdicts and bottleneck ranking.

use core::cmp::Ordering;
use core::fmt;
use vg_core::{EdgeId, NodeId, Pressure};
use vg_route::Target;

/// Where a limit was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BottleneckSite {
    Edge(EdgeId),
    Node(NodeId),
    /// Index into `Grid::injection_points()`.
    Injection(usize),
}

impl fmt::Display for BottleneckSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BottleneckSite::Edge(e) => write!(f, "channel {e}"),
            BottleneckSite::Node(n) => write!(f, "node {n}"),
            BottleneckSite::Injection(i) => write!(f, "injection point {i}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BottleneckKind {
    SupplyExceeded,
    PressureDrop,
    ValveLimit,
    Capacity,
}

/// One exceeded limit. `severity` is the ratio of demand to limit (> 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bottleneck {
    pub site: BottleneckSite,
    pub kind: BottleneckKind,
    pub severity: f64,
}

impl fmt::Display for Bottleneck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} x{:.2}", self.site, self.kind, self.severity)
    }
}

/// Most severe first; ties by site then kind.
pub(crate) fn rank(bottlenecks: &mut [Bottleneck]) {
    bottlenecks.sort_by(|a, b| {
        b.severity
            .total_cmp(&a.severity)
            .then_with(|| a.site.cmp(&b.site))
            .then_with(|| a.kind.cmp(&b.kind))
    });
}

/// Pressure drop of one routed path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathPressure {
    pub target: Target,
    pub drop: Pressure,
}

/// Outcome of one feasibility estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct FeasibilityReport {
    pub layer: u32,
    pub feasible: bool,
    /// Demand drawn per injection point.
    pub supply_draw: Vec<f64>,
    pub supply_capacity: Vec<f64>,
    pub max_pressure_drop: Pressure,
    /// The path with the largest drop.
    pub critical_path: Option<PathPressure>,
    pub max_open_valves: u32,
    pub bottlenecks: Vec<Bottleneck>,
}

impl FeasibilityReport {
    pub fn worst(&self) -> Option<&Bottleneck> {
        self.bottlenecks.first()
    }

    /// Largest draw/capacity ratio over injection points.
    pub fn supply_utilization(&self) -> f64 {
        self.supply_draw
            .iter()
            .zip(&self.supply_capacity)
            .map(|(d, c)| if *c > 0.0 { d / c } else { 0.0 })
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
            .unwrap_or(0.0)
    }
}
