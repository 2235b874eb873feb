//! Result types of the critical path computation.

use chrono::NaiveDate;
use pyo3::prelude::*;

use crate::config::EngineConfig;
use crate::error::TaskDataError;
use crate::graph::TaskIdx;
use crate::project::ProjectSnapshot;

/// Early/late dates and float of one task.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct TaskTiming {
    #[pyo3(get)]
    pub task_id: String,
    #[pyo3(get)]
    pub duration_days: f64,
    #[pyo3(get)]
    pub early_start: NaiveDate,
    #[pyo3(get)]
    pub early_finish: NaiveDate,
    #[pyo3(get)]
    pub late_start: NaiveDate,
    #[pyo3(get)]
    pub late_finish: NaiveDate,
    /// Working days the task can slip without moving the project end.
    #[pyo3(get)]
    pub total_float: f64,
    /// Working days the task can slip without delaying any successor.
    #[pyo3(get)]
    pub free_float: f64,
    #[pyo3(get)]
    pub is_critical: bool,
    #[pyo3(get)]
    pub progress: f64,
}

#[pymethods]
impl TaskTiming {
    fn __repr__(&self) -> String {
        format!(
            "TaskTiming(task_id={:?}, es={}, ef={}, ls={}, lf={}, tf={}, critical={})",
            self.task_id,
            self.early_start,
            self.early_finish,
            self.late_start,
            self.late_finish,
            self.total_float,
            self.is_critical
        )
    }
}

/// Output of a CPM run, tied to the snapshot it was computed from.
///
/// Leveling and optimization passes take this as input so they always work
/// against the exact graph that produced the dates.
#[pyclass]
#[derive(Clone, Debug)]
pub struct CpmResult {
    pub(crate) snapshot: ProjectSnapshot,
    pub(crate) config: EngineConfig,
    /// Indexed by `TaskIdx`; `None` for excluded tasks.
    pub(crate) timings: Vec<Option<TaskTiming>>,
    pub(crate) order: Vec<TaskIdx>,
    pub(crate) critical_path: Vec<TaskIdx>,
    pub project_start: NaiveDate,
    pub project_end: NaiveDate,
    pub(crate) excluded: Vec<TaskDataError>,
}

impl CpmResult {
    pub fn snapshot(&self) -> &ProjectSnapshot {
        &self.snapshot
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn timing(&self, idx: TaskIdx) -> Option<&TaskTiming> {
        self.timings.get(idx as usize).and_then(Option::as_ref)
    }

    pub fn timing_by_id(&self, id: &str) -> Option<&TaskTiming> {
        self.snapshot
            .graph()
            .index_of(id)
            .and_then(|idx| self.timing(idx))
    }

    /// Scheduled tasks in forward-pass order.
    pub fn order(&self) -> &[TaskIdx] {
        &self.order
    }

    pub fn timings(&self) -> impl Iterator<Item = &TaskTiming> + '_ {
        self.order.iter().filter_map(|&idx| self.timing(idx))
    }

    /// Zero-float tasks in forward-pass order.
    pub fn critical_tasks(&self) -> &[TaskIdx] {
        &self.critical_path
    }

    pub fn critical_path_ids(&self) -> Vec<&str> {
        self.critical_path
            .iter()
            .map(|&idx| self.snapshot.graph().id(idx))
            .collect()
    }

    pub fn excluded(&self) -> &[TaskDataError] {
        &self.excluded
    }

    /// Calendar days between project start and project end.
    pub fn project_duration_days(&self) -> i64 {
        (self.project_end - self.project_start).num_days()
    }

    /// Working days between project start and end in the default calendar.
    pub fn project_working_days(&self) -> f64 {
        match self.snapshot.calendars().get(&self.config.default_calendar) {
            Some(calendar) => calendar.working_days_between(self.project_start, self.project_end),
            None => self.project_duration_days() as f64,
        }
    }
}

#[pymethods]
impl CpmResult {
    #[getter(project_start)]
    fn py_project_start(&self) -> NaiveDate {
        self.project_start
    }

    #[getter(project_end)]
    fn py_project_end(&self) -> NaiveDate {
        self.project_end
    }

    #[getter]
    fn project_duration(&self) -> i64 {
        self.project_duration_days()
    }

    #[getter(project_working_days)]
    fn py_project_working_days(&self) -> f64 {
        self.project_working_days()
    }

    #[getter(tasks)]
    fn py_tasks(&self) -> Vec<TaskTiming> {
        self.timings().cloned().collect()
    }

    #[getter(critical_path)]
    fn py_critical_path(&self) -> Vec<String> {
        self.critical_path_ids()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// `(task_id, reason)` for every task left out of this computation.
    #[getter(excluded)]
    fn py_excluded(&self) -> Vec<(String, String)> {
        self.excluded
            .iter()
            .map(|e| (e.task_id().to_string(), e.to_string()))
            .collect()
    }

    fn __repr__(&self) -> String {
        format!(
            "CpmResult(start={}, end={}, tasks={}, critical={}, excluded={})",
            self.project_start,
            self.project_end,
            self.order.len(),
            self.critical_path.len(),
            self.excluded.len()
        )
    }
}
