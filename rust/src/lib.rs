//! Construction scheduling engine.
//!
//! Critical path scheduling over typed dependencies and working calendars,
//! WBS numbering, float-bounded resource leveling, and crashing /
//! fast-tracking of the critical path. Exposed as a Rust library and as the
//! `groundwork.rust` Python module.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::NaiveDate;
use pyo3::prelude::*;
use std::collections::HashMap;

pub mod calendar;
mod config;
pub mod critical_path;
mod error;
pub mod graph;
pub mod leveling;
pub mod logging;
mod models;
pub mod optimizer;
pub mod project;
pub mod recompute;
pub mod wbs;

pub use calendar::{Calendar, CalendarSet, RiskWindow, STANDARD_CALENDAR};
pub use config::{EngineConfig, MAX_WBS_DEPTH};
pub use critical_path::{compute_critical_path, CpmResult, TaskTiming};
pub use error::{ScheduleError, TaskDataError, ValidationError};
pub use graph::{DependencyGraph, TaskIdx};
pub use leveling::{level_resources, LeveledTask, LevelingConflict, LevelingResult};
pub use models::{Assignment, Dependency, DependencyType, Resource, Task, WbsNode};
pub use optimizer::{
    optimize_timeline, AdjustedDependency, AdjustedTask, CrashEntry, OptimizationResult,
    OptimizeMode,
};
pub use project::ProjectSnapshot;
pub use recompute::{RecomputeOutcome, RecomputeSlot};
pub use wbs::{assign_code, generate_wbs, WbsCode, WbsTree};

/// Compute early/late dates, float and the critical path.
///
/// # Arguments
/// * `project_start` - Date tasks without predecessors start on
/// * `tasks` - Tasks to schedule
/// * `dependencies` - Typed dependencies between tasks
/// * `calendars` - Working calendars; the built-in "standard" calendar is always available
/// * `config` - Engine configuration (default calendar, verbosity)
///
/// # Returns
/// * CpmResult with per-task timings, the critical path and excluded tasks
///
/// # Raises
/// * ValueError on cycles or invalid input
#[pyfunction]
#[pyo3(name = "compute_critical_path", signature = (project_start, tasks, dependencies, calendars=None, config=None))]
fn py_compute_critical_path(
    project_start: NaiveDate,
    tasks: Vec<Task>,
    dependencies: Vec<Dependency>,
    calendars: Option<Vec<Calendar>>,
    config: Option<EngineConfig>,
) -> PyResult<CpmResult> {
    let snapshot = ProjectSnapshot::from_records(
        project_start,
        tasks,
        dependencies,
        calendars.unwrap_or_default(),
    )?;
    Ok(compute_critical_path(&snapshot, &config.unwrap_or_default())?)
}

/// Assign WBS codes to a tree given in creation order.
///
/// # Returns
/// * Dict mapping node ID to dotted WBS code
///
/// # Raises
/// * ValueError on unknown parents, duplicate IDs, parent cycles or excess depth
#[pyfunction]
#[pyo3(name = "generate_wbs", signature = (nodes, config=None))]
fn py_generate_wbs(
    nodes: Vec<WbsNode>,
    config: Option<EngineConfig>,
) -> PyResult<HashMap<String, String>> {
    let depth = config.unwrap_or_default().effective_wbs_depth();
    let codes = generate_wbs(&nodes, depth)?;
    Ok(codes
        .into_iter()
        .map(|(id, code)| (id, code.to_string()))
        .collect())
}

/// Level resource usage within total float.
///
/// Conflicts that cannot be fixed are listed in `unresolved_conflicts`.
///
/// # Raises
/// * ValueError on unknown resources or tasks and invalid capacities or allocations
#[pyfunction]
#[pyo3(name = "level_resources")]
fn py_level_resources(
    schedule: PyRef<'_, CpmResult>,
    assignments: Vec<Assignment>,
    resources: Vec<Resource>,
) -> PyResult<LevelingResult> {
    Ok(level_resources(&schedule, &assignments, &resources)?)
}

/// Crash or fast-track the critical path toward `target_end`.
///
/// # Raises
/// * ValueError on invalid cost entries or overlap fraction
#[pyfunction]
#[pyo3(name = "optimize_timeline", signature = (schedule, target_end, mode, cost_table=None, max_overlap_fraction=0.5))]
fn py_optimize_timeline(
    schedule: PyRef<'_, CpmResult>,
    target_end: NaiveDate,
    mode: OptimizeMode,
    cost_table: Option<Vec<CrashEntry>>,
    max_overlap_fraction: f64,
) -> PyResult<OptimizationResult> {
    Ok(optimize_timeline(
        &schedule,
        target_end,
        mode,
        &cost_table.unwrap_or_default(),
        max_overlap_fraction,
    )?)
}

/// The groundwork.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Input types
    m.add_class::<Task>()?;
    m.add_class::<Dependency>()?;
    m.add_class::<DependencyType>()?;
    m.add_class::<Calendar>()?;
    m.add_class::<RiskWindow>()?;
    m.add_class::<Resource>()?;
    m.add_class::<Assignment>()?;
    m.add_class::<WbsNode>()?;
    m.add_class::<CrashEntry>()?;
    m.add_class::<OptimizeMode>()?;

    // Result types
    m.add_class::<TaskTiming>()?;
    m.add_class::<CpmResult>()?;
    m.add_class::<LeveledTask>()?;
    m.add_class::<LevelingConflict>()?;
    m.add_class::<LevelingResult>()?;
    m.add_class::<AdjustedTask>()?;
    m.add_class::<AdjustedDependency>()?;
    m.add_class::<OptimizationResult>()?;

    // Config types
    m.add_class::<EngineConfig>()?;

    // Algorithms
    m.add_function(wrap_pyfunction!(py_compute_critical_path, m)?)?;
    m.add_function(wrap_pyfunction!(py_generate_wbs, m)?)?;
    m.add_function(wrap_pyfunction!(py_level_resources, m)?)?;
    m.add_function(wrap_pyfunction!(py_optimize_timeline, m)?)?;

    Ok(())
}
