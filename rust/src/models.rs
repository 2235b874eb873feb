//! Input records consumed by the scheduling engine.

use pyo3::prelude::*;

use crate::calendar::EPSILON;

/// The four precedence relations between a predecessor and a successor.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DependencyType {
    FinishToStart,
    StartToStart,
    FinishToFinish,
    StartToFinish,
}

impl DependencyType {
    /// The constraint is anchored on the predecessor's start (SS, SF).
    #[inline]
    pub fn from_start(self) -> bool {
        matches!(self, Self::StartToStart | Self::StartToFinish)
    }

    /// The constraint restricts the successor's finish (FF, SF).
    #[inline]
    pub fn to_finish(self) -> bool {
        matches!(self, Self::FinishToFinish | Self::StartToFinish)
    }

    pub fn abbreviation(self) -> &'static str {
        match self {
            Self::FinishToStart => "FS",
            Self::StartToStart => "SS",
            Self::FinishToFinish => "FF",
            Self::StartToFinish => "SF",
        }
    }
}

/// A typed, lagged precedence edge between two tasks.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct Dependency {
    #[pyo3(get, set)]
    pub predecessor: String,
    #[pyo3(get, set)]
    pub successor: String,
    #[pyo3(get, set)]
    pub kind: DependencyType,
    /// Working days; negative values are leads.
    #[pyo3(get, set)]
    pub lag_days: f64,
}

impl Dependency {
    pub fn finish_to_start(predecessor: impl Into<String>, successor: impl Into<String>) -> Self {
        Self::typed(predecessor, successor, DependencyType::FinishToStart, 0.0)
    }

    pub fn typed(
        predecessor: impl Into<String>,
        successor: impl Into<String>,
        kind: DependencyType,
        lag_days: f64,
    ) -> Self {
        Self {
            predecessor: predecessor.into(),
            successor: successor.into(),
            kind,
            lag_days,
        }
    }
}

#[pymethods]
impl Dependency {
    #[new]
    #[pyo3(signature = (predecessor, successor, kind=DependencyType::FinishToStart, lag_days=0.0))]
    fn new(predecessor: String, successor: String, kind: DependencyType, lag_days: f64) -> Self {
        Self::typed(predecessor, successor, kind, lag_days)
    }

    fn __repr__(&self) -> String {
        format!(
            "Dependency({:?} -{}{:+}-> {:?})",
            self.predecessor,
            self.kind.abbreviation(),
            self.lag_days,
            self.successor
        )
    }
}

/// A schedulable unit of work.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    #[pyo3(get, set)]
    pub id: String,
    /// Planned duration in working days; `None` means not yet estimated.
    #[pyo3(get, set)]
    pub duration_days: Option<f64>,
    /// Calendar id; `None` uses the engine's default calendar.
    #[pyo3(get, set)]
    pub calendar: Option<String>,
    /// Slowdown factor applied inside the calendar's risk windows (default 1.0).
    #[pyo3(get, set)]
    pub weather_risk: Option<f64>,
    #[pyo3(get, set)]
    pub milestone: bool,
    /// Completed fraction in [0, 1].
    #[pyo3(get, set)]
    pub progress: f64,
}

impl Task {
    pub fn new(id: impl Into<String>, duration_days: f64) -> Self {
        Self {
            id: id.into(),
            duration_days: Some(duration_days),
            calendar: None,
            weather_risk: None,
            milestone: false,
            progress: 0.0,
        }
    }

    /// A zero-duration checkpoint.
    pub fn milestone(id: impl Into<String>) -> Self {
        Self {
            milestone: true,
            ..Self::new(id, 0.0)
        }
    }

    /// A task without an estimate yet.
    pub fn unestimated(id: impl Into<String>) -> Self {
        Self {
            duration_days: None,
            ..Self::new(id, 0.0)
        }
    }

    pub fn with_calendar(mut self, calendar: impl Into<String>) -> Self {
        self.calendar = Some(calendar.into());
        self
    }

    pub fn with_weather_risk(mut self, multiplier: f64) -> Self {
        self.weather_risk = Some(multiplier);
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = progress;
        self
    }

    /// Duration used for scheduling: milestones are always zero, undefined
    /// or non-finite estimates yield `None`.
    pub fn effective_duration(&self) -> Option<f64> {
        if self.milestone {
            return Some(0.0);
        }
        self.duration_days.filter(|d| d.is_finite())
    }

    pub fn weather_multiplier(&self) -> f64 {
        self.weather_risk.unwrap_or(1.0)
    }

    pub fn is_zero_duration(&self) -> bool {
        self.effective_duration().is_some_and(|d| d <= EPSILON)
    }
}

#[pymethods]
impl Task {
    #[new]
    #[pyo3(signature = (
        id,
        duration_days=None,
        calendar=None,
        weather_risk=None,
        milestone=false,
        progress=0.0
    ))]
    fn py_new(
        id: String,
        duration_days: Option<f64>,
        calendar: Option<String>,
        weather_risk: Option<f64>,
        milestone: bool,
        progress: f64,
    ) -> Self {
        Self {
            id,
            duration_days,
            calendar,
            weather_risk,
            milestone,
            progress,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Task(id={:?}, duration_days={:?}, calendar={:?}, milestone={})",
            self.id, self.duration_days, self.calendar, self.milestone
        )
    }
}

/// A resource pool with a per-day capacity.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    #[pyo3(get, set)]
    pub id: String,
    /// Units available per calendar day.
    #[pyo3(get, set)]
    pub capacity: f64,
    /// Cost per unit per day.
    #[pyo3(get, set)]
    pub cost_rate: f64,
}

impl Resource {
    pub fn new(id: impl Into<String>, capacity: f64, cost_rate: f64) -> Self {
        Self {
            id: id.into(),
            capacity,
            cost_rate,
        }
    }
}

#[pymethods]
impl Resource {
    #[new]
    #[pyo3(signature = (id, capacity, cost_rate=0.0))]
    fn py_new(id: String, capacity: f64, cost_rate: f64) -> Self {
        Self::new(id, capacity, cost_rate)
    }

    fn __repr__(&self) -> String {
        format!(
            "Resource(id={:?}, capacity={}, cost_rate={})",
            self.id, self.capacity, self.cost_rate
        )
    }
}

/// Share of a resource's capacity claimed by a task while it is active.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    #[pyo3(get, set)]
    pub task_id: String,
    #[pyo3(get, set)]
    pub resource_id: String,
    /// Fraction of the resource's capacity (1.0 = all of it).
    #[pyo3(get, set)]
    pub allocation: f64,
}

impl Assignment {
    pub fn new(task_id: impl Into<String>, resource_id: impl Into<String>, allocation: f64) -> Self {
        Self {
            task_id: task_id.into(),
            resource_id: resource_id.into(),
            allocation,
        }
    }
}

#[pymethods]
impl Assignment {
    #[new]
    #[pyo3(signature = (task_id, resource_id, allocation=1.0))]
    fn py_new(task_id: String, resource_id: String, allocation: f64) -> Self {
        Self::new(task_id, resource_id, allocation)
    }

    fn __repr__(&self) -> String {
        format!(
            "Assignment(task_id={:?}, resource_id={:?}, allocation={})",
            self.task_id, self.resource_id, self.allocation
        )
    }
}

/// A node of the work breakdown tree, listed in creation order.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WbsNode {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    pub parent: Option<String>,
}

impl WbsNode {
    pub fn root(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: None,
        }
    }

    pub fn child(id: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: Some(parent.into()),
        }
    }
}

#[pymethods]
impl WbsNode {
    #[new]
    #[pyo3(signature = (id, parent=None))]
    fn py_new(id: String, parent: Option<String>) -> Self {
        Self { id, parent }
    }

    fn __repr__(&self) -> String {
        format!("WbsNode(id={:?}, parent={:?})", self.id, self.parent)
    }
}
