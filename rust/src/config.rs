//! Configuration for the scheduling engine.

use pyo3::prelude::*;

use crate::calendar::STANDARD_CALENDAR;
use crate::logging::verbosity_name;

/// Hard upper bound on WBS depth.
pub const MAX_WBS_DEPTH: usize = 6;

/// Engine-wide knobs shared by the CPM, leveling and optimizer passes.
#[pyclass]
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    #[pyo3(get, set)]
    pub verbosity: u8,
    /// Working days removed from a task per crashing step.
    #[pyo3(get, set)]
    pub crash_step_days: f64,
    /// Upper bound on crash steps / fast-track conversions per call.
    #[pyo3(get, set)]
    pub max_optimizer_iterations: usize,
    /// Maximum WBS depth (never above 6).
    #[pyo3(get, set)]
    pub max_wbs_depth: usize,
    /// Calendar used for tasks that do not name one.
    #[pyo3(get, set)]
    pub default_calendar: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            crash_step_days: 1.0,
            max_optimizer_iterations: 1000,
            max_wbs_depth: MAX_WBS_DEPTH,
            default_calendar: STANDARD_CALENDAR.to_string(),
        }
    }
}

impl EngineConfig {
    /// WBS depth actually enforced.
    pub fn effective_wbs_depth(&self) -> usize {
        self.max_wbs_depth.clamp(1, MAX_WBS_DEPTH)
    }

    /// Crash step, falling back to one day for non-positive values.
    pub fn effective_crash_step(&self) -> f64 {
        if self.crash_step_days.is_finite() && self.crash_step_days > 0.0 {
            self.crash_step_days
        } else {
            1.0
        }
    }
}

#[pymethods]
impl EngineConfig {
    #[new]
    #[pyo3(signature = (
        verbosity=None,
        crash_step_days=None,
        max_optimizer_iterations=None,
        max_wbs_depth=None,
        default_calendar=None
    ))]
    fn new(
        verbosity: Option<u8>,
        crash_step_days: Option<f64>,
        max_optimizer_iterations: Option<usize>,
        max_wbs_depth: Option<usize>,
        default_calendar: Option<String>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            verbosity: verbosity.unwrap_or(defaults.verbosity),
            crash_step_days: crash_step_days.unwrap_or(defaults.crash_step_days),
            max_optimizer_iterations: max_optimizer_iterations
                .unwrap_or(defaults.max_optimizer_iterations),
            max_wbs_depth: max_wbs_depth.unwrap_or(defaults.max_wbs_depth),
            default_calendar: default_calendar.unwrap_or(defaults.default_calendar),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "EngineConfig(verbosity={}, crash_step_days={}, max_wbs_depth={}, default_calendar={:?})",
            verbosity_name(self.verbosity),
            self.crash_step_days,
            self.max_wbs_depth,
            self.default_calendar
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.verbosity, 0);
        assert_eq!(config.effective_wbs_depth(), 6);
        assert!((config.effective_crash_step() - 1.0).abs() < 1e-9);
        assert_eq!(config.default_calendar, STANDARD_CALENDAR);
    }

    #[test]
    fn test_depth_is_clamped() {
        let config = EngineConfig {
            max_wbs_depth: 12,
            ..EngineConfig::default()
        };
        assert_eq!(config.effective_wbs_depth(), MAX_WBS_DEPTH);
    }

    #[test]
    fn test_bad_crash_step_falls_back() {
        let config = EngineConfig {
            crash_step_days: -3.0,
            ..EngineConfig::default()
        };
        assert!((config.effective_crash_step() - 1.0).abs() < 1e-9);
    }
}
