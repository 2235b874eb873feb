//! Timeline optimization: crashing and fast-tracking the critical path.
//!
//! Both modes work on a copy of the snapshot behind a [`CpmResult`] and
//! recompute CPM after every change; the input schedule is never modified.

mod crashing;
mod fast_tracking;

use chrono::NaiveDate;
use pyo3::prelude::*;

use crate::critical_path::CpmResult;
use crate::error::ScheduleError;

pub use crashing::crash;
pub use fast_tracking::fast_track;

#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizeMode {
    /// Shorten critical tasks, paying their crash cost.
    Crash,
    /// Overlap critical finish-to-start pairs.
    FastTrack,
}

/// Cost of shortening a task by one working day, and how far it can go.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct CrashEntry {
    #[pyo3(get, set)]
    pub task_id: String,
    #[pyo3(get, set)]
    pub cost_per_day: f64,
    #[pyo3(get, set)]
    pub min_duration: f64,
}

impl CrashEntry {
    pub fn new(task_id: impl Into<String>, cost_per_day: f64, min_duration: f64) -> Self {
        Self {
            task_id: task_id.into(),
            cost_per_day,
            min_duration,
        }
    }
}

#[pymethods]
impl CrashEntry {
    #[new]
    fn py_new(task_id: String, cost_per_day: f64, min_duration: f64) -> Self {
        Self::new(task_id, cost_per_day, min_duration)
    }

    fn __repr__(&self) -> String {
        format!(
            "CrashEntry(task_id={:?}, cost_per_day={}, min_duration={})",
            self.task_id, self.cost_per_day, self.min_duration
        )
    }
}

#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct AdjustedTask {
    #[pyo3(get)]
    pub task_id: String,
    #[pyo3(get)]
    pub original_duration: f64,
    #[pyo3(get)]
    pub new_duration: f64,
    #[pyo3(get)]
    pub added_cost: f64,
}

#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct AdjustedDependency {
    #[pyo3(get)]
    pub predecessor: String,
    #[pyo3(get)]
    pub successor: String,
    #[pyo3(get)]
    pub original_lag: f64,
    #[pyo3(get)]
    pub new_lag: f64,
}

/// New durations and lags plus the schedule they produce.
#[pyclass]
#[derive(Clone, Debug)]
pub struct OptimizationResult {
    #[pyo3(get)]
    pub adjusted_tasks: Vec<AdjustedTask>,
    #[pyo3(get)]
    pub adjusted_dependencies: Vec<AdjustedDependency>,
    #[pyo3(get)]
    pub achieved_end: NaiveDate,
    #[pyo3(get)]
    pub added_cost: f64,
    #[pyo3(get)]
    pub target_met: bool,
    /// CPM result of the optimized snapshot.
    #[pyo3(get)]
    pub schedule: CpmResult,
}

impl OptimizationResult {
    pub(crate) fn unchanged(cpm: &CpmResult, target_end: NaiveDate) -> Self {
        Self {
            adjusted_tasks: Vec::new(),
            adjusted_dependencies: Vec::new(),
            achieved_end: cpm.project_end,
            added_cost: 0.0,
            target_met: cpm.project_end <= target_end,
            schedule: cpm.clone(),
        }
    }

    /// Calendar days from project start to the achieved end.
    pub fn achieved_duration_days(&self) -> i64 {
        self.schedule.project_duration_days()
    }
}

#[pymethods]
impl OptimizationResult {
    fn __repr__(&self) -> String {
        format!(
            "OptimizationResult(achieved_end={}, added_cost={}, target_met={}, tasks={}, dependencies={})",
            self.achieved_end,
            self.added_cost,
            self.target_met,
            self.adjusted_tasks.len(),
            self.adjusted_dependencies.len()
        )
    }
}

/// Pull the project end toward `target_end` using the given mode.
///
/// `cost_table` is only read when crashing; `max_overlap_fraction` only when
/// fast-tracking.
pub fn optimize_timeline(
    cpm: &CpmResult,
    target_end: NaiveDate,
    mode: OptimizeMode,
    cost_table: &[CrashEntry],
    max_overlap_fraction: f64,
) -> Result<OptimizationResult, ScheduleError> {
    match mode {
        OptimizeMode::Crash => crash(cpm, target_end, cost_table),
        OptimizeMode::FastTrack => fast_track(cpm, target_end, max_overlap_fraction),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::critical_path::compute_critical_path;
    use crate::models::{Dependency, Task};
    use crate::project::ProjectSnapshot;

    #[test]
    fn test_target_already_met() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let snapshot = ProjectSnapshot::from_records(
            start,
            vec![Task::new("a", 3.0), Task::new("b", 2.0)],
            vec![Dependency::finish_to_start("a", "b")],
            vec![],
        )
        .unwrap();
        let cpm = compute_critical_path(&snapshot, &EngineConfig::default()).unwrap();
        let target = start + chrono::Duration::days(10);

        for mode in [OptimizeMode::Crash, OptimizeMode::FastTrack] {
            let result = optimize_timeline(&cpm, target, mode, &[], 0.5).unwrap();
            assert!(result.target_met);
            assert_eq!(result.achieved_end, cpm.project_end);
            assert_eq!(result.added_cost, 0.0);
            assert!(result.adjusted_tasks.is_empty());
            assert!(result.adjusted_dependencies.is_empty());
        }
    }
}
