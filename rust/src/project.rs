//! Immutable project snapshot handed to the scheduling passes.
//!
//! Tasks are stored in the same arena order as the dependency graph, so a
//! `TaskIdx` addresses both. Every mutation validates first and leaves the
//! snapshot untouched on error.

use chrono::NaiveDate;

use crate::calendar::{Calendar, CalendarSet};
use crate::error::{ScheduleError, ValidationError};
use crate::graph::{DependencyGraph, TaskIdx};
use crate::models::{Dependency, Task};

#[derive(Clone, Debug)]
pub struct ProjectSnapshot {
    pub project_start: NaiveDate,
    tasks: Vec<Task>,
    graph: DependencyGraph,
    calendars: CalendarSet,
}

fn validate_task(task: &Task) -> Result<(), ValidationError> {
    if let Some(duration) = task.duration_days {
        if duration < 0.0 && !task.milestone {
            return Err(ValidationError::NegativeDuration {
                task_id: task.id.clone(),
                duration,
            });
        }
    }
    if let Some(multiplier) = task.weather_risk {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ValidationError::InvalidMultiplier {
                task_id: task.id.clone(),
                multiplier,
            });
        }
    }
    Ok(())
}

impl ProjectSnapshot {
    pub fn new(project_start: NaiveDate, calendars: CalendarSet) -> Self {
        Self {
            project_start,
            tasks: Vec::new(),
            graph: DependencyGraph::new(),
            calendars,
        }
    }

    /// Build a snapshot from flat records, rejecting the whole set on the
    /// first structural problem.
    pub fn from_records(
        project_start: NaiveDate,
        tasks: Vec<Task>,
        dependencies: Vec<Dependency>,
        calendars: Vec<Calendar>,
    ) -> Result<Self, ScheduleError> {
        let mut snapshot = Self::new(project_start, CalendarSet::from_calendars(calendars)?);
        for task in tasks {
            snapshot.add_task(task)?;
        }
        for dep in dependencies {
            snapshot.add_dependency(&dep)?;
        }
        Ok(snapshot)
    }

    pub fn add_task(&mut self, mut task: Task) -> Result<TaskIdx, ScheduleError> {
        if self.graph.index_of(&task.id).is_some() {
            return Err(ValidationError::DuplicateTask(task.id).into());
        }
        validate_task(&task)?;
        if task.milestone {
            task.duration_days = Some(0.0);
        }
        task.progress = task.progress.clamp(0.0, 1.0);
        let idx = self.graph.add_task(&task.id);
        self.tasks.push(task);
        Ok(idx)
    }

    pub fn add_dependency(&mut self, dep: &Dependency) -> Result<(), ScheduleError> {
        self.graph
            .add_edge(&dep.predecessor, &dep.successor, dep.kind, dep.lag_days)
    }

    pub fn remove_dependency(&mut self, predecessor: &str, successor: &str) -> Result<(), ScheduleError> {
        self.graph.remove_edge(predecessor, successor).map(|_| ())
    }

    pub fn set_lag(&mut self, pred: TaskIdx, succ: TaskIdx, lag: f64) -> Result<(), ScheduleError> {
        self.graph.set_lag(pred, succ, lag)
    }

    /// Replace a task's planned duration (`None` marks it unestimated).
    pub fn update_duration(&mut self, task_id: &str, duration: Option<f64>) -> Result<(), ScheduleError> {
        let idx = self
            .graph
            .index_of(task_id)
            .ok_or_else(|| ValidationError::UnknownTask(task_id.to_string()))?;
        let task = &self.tasks[idx as usize];
        let mut updated = task.clone();
        updated.duration_days = if task.milestone { Some(0.0) } else { duration };
        validate_task(&updated)?;
        self.tasks[idx as usize] = updated;
        Ok(())
    }

    pub fn insert_calendar(&mut self, calendar: Calendar) -> Result<(), ScheduleError> {
        self.calendars.insert(calendar)?;
        Ok(())
    }

    #[inline]
    pub fn task(&self, idx: TaskIdx) -> &Task {
        &self.tasks[idx as usize]
    }

    /// Id of the calendar a task runs on, falling back to `default_calendar`.
    pub fn calendar_id<'s>(&'s self, idx: TaskIdx, default_calendar: &'s str) -> &'s str {
        self.task(idx).calendar.as_deref().unwrap_or(default_calendar)
    }

    pub fn calendar_for(&self, idx: TaskIdx, default_calendar: &str) -> Option<&Calendar> {
        self.calendars.get(self.calendar_id(idx, default_calendar))
    }

    pub fn task_by_id(&self, id: &str) -> Option<&Task> {
        self.graph.index_of(id).map(|idx| self.task(idx))
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn calendars(&self) -> &CalendarSet {
        &self.calendars
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
