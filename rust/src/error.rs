//! Error types shared by the scheduling engine.
//!
//! Structural problems (cycles, invalid input) fail closed and are returned as
//! [`ScheduleError`]. Per-task data problems are not errors at this level: they
//! are collected as [`TaskDataError`] entries next to a partial result.

use thiserror::Error;

/// Errors that reject a computation or a mutation before anything is committed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("Circular dependency detected: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Invalid input that would make the schedule meaningless.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("WBS depth exceeded: {code} would have {depth} segments (max {max})")]
    DepthExceeded {
        code: String,
        depth: usize,
        max: usize,
    },
    #[error("Invalid WBS code: {0:?}")]
    InvalidWbsCode(String),
    #[error("Task {task_id} has negative duration {duration}")]
    NegativeDuration { task_id: String, duration: f64 },
    #[error("Dependency {pred} -> {succ} has invalid lag {lag}")]
    InvalidLag { pred: String, succ: String, lag: f64 },
    #[error("Dependency {pred} -> {succ} already exists")]
    DuplicateDependency { pred: String, succ: String },
    #[error("Dependency {pred} -> {succ} does not exist")]
    UnknownDependency { pred: String, succ: String },
    #[error("Task {task_id} has invalid weather risk multiplier {multiplier}")]
    InvalidMultiplier { task_id: String, multiplier: f64 },
    #[error("Unknown task: {0}")]
    UnknownTask(String),
    #[error("Duplicate task: {0}")]
    DuplicateTask(String),
    #[error("Unknown resource: {0}")]
    UnknownResource(String),
    #[error("Unknown parent {parent} for node {node}")]
    UnknownParent { node: String, parent: String },
    #[error("Calendar {0} has no working weekdays")]
    EmptyWorkWeek(String),
    #[error("Resource {0} has invalid capacity")]
    InvalidCapacity(String),
    #[error("Assignment of {task_id} to {resource_id} has invalid allocation {allocation}")]
    InvalidAllocation {
        task_id: String,
        resource_id: String,
        allocation: f64,
    },
    #[error("Overlap fraction {0} must be within [0, 1]")]
    InvalidOverlapFraction(f64),
    #[error("Crash entry for {0} needs a finite cost and a non-negative minimum duration")]
    InvalidCrashEntry(String),
}

/// Per-task data problems. The task (and everything downstream of it) is
/// left out of the current computation and reported alongside the result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskDataError {
    #[error("Task {task_id} references missing calendar {calendar_id}")]
    MissingCalendar {
        task_id: String,
        calendar_id: String,
    },
    #[error("Task {task_id} has an undefined duration")]
    UndefinedDuration { task_id: String },
    #[error("Task {task_id} depends on excluded task {upstream}")]
    UpstreamExcluded { task_id: String, upstream: String },
}

impl TaskDataError {
    pub fn task_id(&self) -> &str {
        match self {
            Self::MissingCalendar { task_id, .. }
            | Self::UndefinedDuration { task_id }
            | Self::UpstreamExcluded { task_id, .. } => task_id,
        }
    }
}

impl From<ScheduleError> for pyo3::PyErr {
    fn from(err: ScheduleError) -> Self {
        pyo3::exceptions::PyValueError::new_err(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = ScheduleError::CycleDetected {
            path: vec!["c".into(), "a".into(), "b".into(), "c".into()],
        };
        assert_eq!(
            err.to_string(),
            "Circular dependency detected: c -> a -> b -> c"
        );
    }

    #[test]
    fn test_validation_converts() {
        let err: ScheduleError = ValidationError::UnknownTask("x".into()).into();
        assert_eq!(err.to_string(), "Unknown task: x");
    }
}
