//! Critical path calculation using forward and backward passes.

use chrono::NaiveDate;

use crate::calendar::{Calendar, EPSILON};
use crate::config::EngineConfig;
use crate::error::{ScheduleError, TaskDataError};
use crate::graph::TaskIdx;
use crate::log_debug;
use crate::models::DependencyType;
use crate::project::ProjectSnapshot;

use super::types::{CpmResult, TaskTiming};

/// `[start, finish)` of a task.
pub(crate) type Window = (NaiveDate, NaiveDate);

/// Scheduling inputs of a task whose data is complete.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ResolvedTask<'a> {
    pub calendar: &'a Calendar,
    pub duration: f64,
    pub multiplier: f64,
}

/// Snapshot with calendars and durations resolved and bad tasks split off.
pub(crate) struct Network<'a> {
    pub snapshot: &'a ProjectSnapshot,
    pub tasks: Vec<Option<ResolvedTask<'a>>>,
    /// Topological order of the included tasks.
    pub order: Vec<TaskIdx>,
    pub excluded: Vec<TaskDataError>,
}

/// Earliest start a successor may take given one predecessor edge.
fn start_bound(
    kind: DependencyType,
    lag: f64,
    pred: Window,
    succ: &ResolvedTask<'_>,
) -> NaiveDate {
    let anchor = if kind.from_start() { pred.0 } else { pred.1 };
    let shifted = succ.calendar.shift_working_days(anchor, lag);
    if kind.to_finish() {
        succ.calendar
            .subtract_working_duration(shifted, succ.duration, succ.multiplier)
    } else {
        shifted
    }
}

/// Latest finish a predecessor may take given one successor edge.
fn finish_bound(
    kind: DependencyType,
    lag: f64,
    succ_late: Window,
    succ: &ResolvedTask<'_>,
    pred: &ResolvedTask<'_>,
) -> NaiveDate {
    let anchor = if kind.to_finish() { succ_late.1 } else { succ_late.0 };
    let shifted = succ.calendar.shift_working_days(anchor, -lag);
    if kind.from_start() {
        pred.calendar
            .add_working_duration(shifted, pred.duration, pred.multiplier)
    } else {
        shifted
    }
}

impl<'a> Network<'a> {
    pub fn resolve(
        snapshot: &'a ProjectSnapshot,
        config: &EngineConfig,
    ) -> Result<Self, ScheduleError> {
        let graph = snapshot.graph();
        let topo = graph.topological_order()?;
        let mut tasks: Vec<Option<ResolvedTask<'a>>> = vec![None; graph.len()];
        let mut order = Vec::with_capacity(topo.len());
        let mut excluded = Vec::new();

        for idx in topo {
            let task = snapshot.task(idx);
            let Some(calendar) = snapshot.calendar_for(idx, &config.default_calendar) else {
                excluded.push(TaskDataError::MissingCalendar {
                    task_id: task.id.clone(),
                    calendar_id: snapshot
                        .calendar_id(idx, &config.default_calendar)
                        .to_string(),
                });
                continue;
            };
            let Some(duration) = task.effective_duration() else {
                excluded.push(TaskDataError::UndefinedDuration {
                    task_id: task.id.clone(),
                });
                continue;
            };
            // Predecessors come first in topological order, so `None` means excluded.
            if let Some(link) = graph
                .predecessors(idx)
                .iter()
                .find(|l| tasks[l.task as usize].is_none())
            {
                excluded.push(TaskDataError::UpstreamExcluded {
                    task_id: task.id.clone(),
                    upstream: graph.id(link.task).to_string(),
                });
                continue;
            }

            tasks[idx as usize] = Some(ResolvedTask {
                calendar,
                duration,
                multiplier: task.weather_multiplier(),
            });
            order.push(idx);
        }

        Ok(Self {
            snapshot,
            tasks,
            order,
            excluded,
        })
    }

    /// Early dates. `floors` optionally holds a start-no-earlier-than date per
    /// task (used by leveling); an empty slice means no floors.
    pub fn forward_pass(&self, floors: &[Option<NaiveDate>]) -> Vec<Option<Window>> {
        let graph = self.snapshot.graph();
        let mut early: Vec<Option<Window>> = vec![None; self.tasks.len()];

        for &idx in &self.order {
            let Some(task) = self.tasks[idx as usize] else {
                continue;
            };
            let mut start: Option<NaiveDate> = None;
            for link in graph.predecessors(idx) {
                let Some(pred) = early[link.task as usize] else {
                    continue;
                };
                let bound = start_bound(link.kind, link.lag, pred, &task);
                start = Some(start.map_or(bound, |s| s.max(bound)));
            }

            let mut early_start = start.unwrap_or(self.snapshot.project_start);
            if let Some(floor) = floors.get(idx as usize).copied().flatten() {
                early_start = early_start.max(floor);
            }
            if task.duration > EPSILON {
                early_start = task.calendar.next_working_day(early_start);
            }
            let early_finish =
                task.calendar
                    .add_working_duration(early_start, task.duration, task.multiplier);
            early[idx as usize] = Some((early_start, early_finish));
        }

        early
    }

    /// Latest finish over all scheduled tasks.
    pub fn project_end(&self, early: &[Option<Window>]) -> NaiveDate {
        early
            .iter()
            .flatten()
            .map(|w| w.1)
            .max()
            .unwrap_or(self.snapshot.project_start)
    }

    /// Late dates, anchored at `project_end`.
    pub fn backward_pass(&self, project_end: NaiveDate) -> Vec<Option<Window>> {
        let graph = self.snapshot.graph();
        let mut late: Vec<Option<Window>> = vec![None; self.tasks.len()];

        for &idx in self.order.iter().rev() {
            let Some(task) = self.tasks[idx as usize] else {
                continue;
            };
            let mut late_finish = project_end;
            for link in graph.successors(idx) {
                let (Some(succ), Some(succ_late)) =
                    (self.tasks[link.task as usize], late[link.task as usize])
                else {
                    continue;
                };
                let bound = finish_bound(link.kind, link.lag, succ_late, &succ, &task);
                late_finish = late_finish.min(bound);
            }
            let late_start =
                task.calendar
                    .subtract_working_duration(late_finish, task.duration, task.multiplier);
            late[idx as usize] = Some((late_start, late_finish));
        }

        late
    }

    /// Working days a task can slip before delaying any successor (or the
    /// project end for sinks).
    fn free_float(
        &self,
        idx: TaskIdx,
        early: &[Option<Window>],
        project_end: NaiveDate,
    ) -> f64 {
        let graph = self.snapshot.graph();
        let Some(task) = self.tasks[idx as usize] else {
            return 0.0;
        };
        let Some(own) = early[idx as usize] else {
            return 0.0;
        };

        let mut slack: Option<f64> = None;
        for link in graph.successors(idx) {
            let (Some(succ), Some(succ_early)) =
                (self.tasks[link.task as usize], early[link.task as usize])
            else {
                continue;
            };
            let anchor = if link.kind.from_start() { own.0 } else { own.1 };
            let required = succ.calendar.shift_working_days(anchor, link.lag);
            let actual = if link.kind.to_finish() {
                succ_early.1
            } else {
                succ_early.0
            };
            let edge_slack = task.calendar.working_days_between(required, actual);
            slack = Some(slack.map_or(edge_slack, |s| s.min(edge_slack)));
        }
        slack.unwrap_or_else(|| task.calendar.working_days_between(own.1, project_end))
    }
}

/// Run the full CPM computation over a snapshot.
///
/// Tasks with missing calendars or undefined durations (and everything
/// downstream of them) are excluded and reported; the rest is scheduled.
pub fn compute_critical_path(
    snapshot: &ProjectSnapshot,
    config: &EngineConfig,
) -> Result<CpmResult, ScheduleError> {
    let verbosity = config.verbosity;
    let network = Network::resolve(snapshot, config)?;
    let graph = snapshot.graph();

    let early = network.forward_pass(&[]);
    let project_end = network.project_end(&early);
    let late = network.backward_pass(project_end);

    log_debug!(
        verbosity,
        "CPM: {} tasks scheduled, {} excluded, project end {}",
        network.order.len(),
        network.excluded.len(),
        project_end
    );

    let mut timings: Vec<Option<TaskTiming>> = vec![None; graph.len()];
    let mut critical_path = Vec::new();

    for &idx in &network.order {
        let (Some(task), Some(e), Some(l)) = (
            network.tasks[idx as usize],
            early[idx as usize],
            late[idx as usize],
        ) else {
            continue;
        };
        let total_float = task.calendar.working_days_between(e.0, l.0);
        let free_float = network
            .free_float(idx, &early, project_end)
            .max(0.0)
            .min(total_float.max(0.0));
        let is_critical = total_float <= EPSILON;
        if is_critical {
            critical_path.push(idx);
        }

        log_debug!(
            verbosity,
            "  {} es={} ef={} ls={} lf={} tf={} ff={}",
            graph.id(idx),
            e.0,
            e.1,
            l.0,
            l.1,
            total_float,
            free_float
        );

        let record = snapshot.task(idx);
        timings[idx as usize] = Some(TaskTiming {
            task_id: record.id.clone(),
            duration_days: task.duration,
            early_start: e.0,
            early_finish: e.1,
            late_start: l.0,
            late_finish: l.1,
            total_float,
            free_float,
            is_critical,
            progress: record.progress,
        });
    }

    Ok(CpmResult {
        snapshot: snapshot.clone(),
        config: config.clone(),
        timings,
        order: network.order,
        critical_path,
        project_start: snapshot.project_start,
        project_end,
        excluded: network.excluded,
    })
}
