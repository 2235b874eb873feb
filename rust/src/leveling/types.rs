use chrono::NaiveDate;
use pyo3::prelude::*;
use std::collections::HashMap;

use crate::models::Assignment;

/// Leveled dates of one task.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct LeveledTask {
    #[pyo3(get)]
    pub task_id: String,
    #[pyo3(get)]
    pub start: NaiveDate,
    #[pyo3(get)]
    pub finish: NaiveDate,
    /// Working days moved past the CPM early start.
    #[pyo3(get)]
    pub shift_days: f64,
    #[pyo3(get)]
    pub early_start: NaiveDate,
    #[pyo3(get)]
    pub late_start: NaiveDate,
}

/// A day on which a resource stays over capacity after leveling.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct LevelingConflict {
    #[pyo3(get)]
    pub resource_id: String,
    #[pyo3(get)]
    pub date: NaiveDate,
    #[pyo3(get)]
    pub demand: f64,
    #[pyo3(get)]
    pub capacity: f64,
    #[pyo3(get)]
    pub task_ids: Vec<String>,
}

#[pymethods]
impl LevelingConflict {
    fn __repr__(&self) -> String {
        format!(
            "LevelingConflict(resource_id={:?}, date={}, demand={}, capacity={}, tasks={:?})",
            self.resource_id, self.date, self.demand, self.capacity, self.task_ids
        )
    }
}

/// Best-effort leveled plan plus everything that could not be fixed.
#[pyclass]
#[derive(Clone, Debug)]
pub struct LevelingResult {
    /// Every scheduled task, in forward-pass order.
    #[pyo3(get)]
    pub tasks: Vec<LeveledTask>,
    #[pyo3(get)]
    pub unresolved_conflicts: Vec<LevelingConflict>,
    /// Assignments to tasks excluded from the CPM run.
    #[pyo3(get)]
    pub skipped_assignments: Vec<Assignment>,
    #[pyo3(get)]
    pub resource_costs: Vec<(String, f64)>,
    #[pyo3(get)]
    pub project_end: NaiveDate,
}

impl LevelingResult {
    pub fn task(&self, task_id: &str) -> Option<&LeveledTask> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Tasks whose start moved.
    pub fn shifted(&self) -> impl Iterator<Item = &LeveledTask> {
        self.tasks.iter().filter(|t| t.start != t.early_start)
    }
}

#[pymethods]
impl LevelingResult {
    /// Leveled start of every scheduled task.
    #[getter]
    pub fn adjusted_starts(&self) -> HashMap<String, NaiveDate> {
        self.tasks
            .iter()
            .map(|t| (t.task_id.clone(), t.start))
            .collect()
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved_conflicts.is_empty()
    }

    fn __repr__(&self) -> String {
        format!(
            "LevelingResult(shifted={}, unresolved={}, end={})",
            self.shifted().count(),
            self.unresolved_conflicts.len(),
            self.project_end
        )
    }
}
