//! Float-bounded resource leveling.
//!
//! Overloads are scanned per resource, day by day. A conflicting non-critical
//! task is pushed later through a start floor and the forward pass is re-run
//! so its successors move with it. A shift is kept only if nothing ends up
//! past its CPM late start and the shifted task's resources fit in its new
//! window; otherwise the day is left overloaded and reported.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::critical_path::{CpmResult, Network, Window};
use crate::error::{ScheduleError, ValidationError};
use crate::graph::TaskIdx;
use crate::models::{Assignment, Resource};
use crate::{log_changes, log_checks};

use super::resource_load::ResourceLoad;
use super::types::{LeveledTask, LevelingConflict, LevelingResult};

/// Validated assignment data, indexed by resource and by task.
struct Demands {
    /// Per resource: `(task, units per day)`.
    by_resource: Vec<Vec<(TaskIdx, f64)>>,
    /// Per task: resources it draws on.
    by_task: Vec<Vec<usize>>,
    skipped: Vec<Assignment>,
}

fn collect_demands(
    cpm: &CpmResult,
    assignments: &[Assignment],
    resources: &[Resource],
) -> Result<Demands, ValidationError> {
    let graph = cpm.snapshot().graph();
    let mut index: FxHashMap<&str, usize> = FxHashMap::default();
    for (i, resource) in resources.iter().enumerate() {
        if !resource.capacity.is_finite() || resource.capacity <= 0.0 {
            return Err(ValidationError::InvalidCapacity(resource.id.clone()));
        }
        index.entry(resource.id.as_str()).or_insert(i);
    }

    let mut demands = Demands {
        by_resource: vec![Vec::new(); resources.len()],
        by_task: vec![Vec::new(); graph.len()],
        skipped: Vec::new(),
    };
    for assignment in assignments {
        let &r = index
            .get(assignment.resource_id.as_str())
            .ok_or_else(|| ValidationError::UnknownResource(assignment.resource_id.clone()))?;
        if !assignment.allocation.is_finite() || assignment.allocation <= 0.0 {
            return Err(ValidationError::InvalidAllocation {
                task_id: assignment.task_id.clone(),
                resource_id: assignment.resource_id.clone(),
                allocation: assignment.allocation,
            });
        }
        let task = graph
            .index_of(&assignment.task_id)
            .ok_or_else(|| ValidationError::UnknownTask(assignment.task_id.clone()))?;
        if cpm.timing(task).is_none() {
            demands.skipped.push(assignment.clone());
            continue;
        }
        demands.by_resource[r].push((task, assignment.allocation * resources[r].capacity));
        let task_resources = &mut demands.by_task[task as usize];
        if !task_resources.contains(&r) {
            task_resources.push(r);
        }
    }
    Ok(demands)
}

struct Leveler<'a> {
    cpm: &'a CpmResult,
    network: Network<'a>,
    resources: &'a [Resource],
    demands: Demands,
    floors: Vec<Option<NaiveDate>>,
    windows: Vec<Option<Window>>,
    verbosity: u8,
}

impl<'a> Leveler<'a> {
    fn load(&self, r: usize, windows: &[Option<Window>]) -> ResourceLoad {
        let mut load = ResourceLoad::new(&self.resources[r]);
        for &(task, demand) in &self.demands.by_resource[r] {
            if let (Some(window), Some(resolved)) =
                (windows[task as usize], self.network.tasks[task as usize])
            {
                load.add_task(task, demand, window, resolved.calendar);
            }
        }
        load
    }

    fn late_start(&self, task: TaskIdx) -> Option<NaiveDate> {
        self.cpm.timing(task).map(|t| t.late_start)
    }

    fn within_late_starts(&self, windows: &[Option<Window>]) -> bool {
        self.network.order.iter().all(|&idx| {
            match (windows[idx as usize], self.late_start(idx)) {
                (Some(w), Some(ls)) => w.0 <= ls,
                _ => true,
            }
        })
    }

    /// Non-critical tasks active on the overloaded day, most float first.
    fn candidates(&self, tasks: &[TaskIdx]) -> Vec<TaskIdx> {
        let graph = self.cpm.snapshot().graph();
        let mut candidates: Vec<TaskIdx> = tasks
            .iter()
            .copied()
            .filter(|&t| self.cpm.timing(t).is_some_and(|timing| !timing.is_critical))
            .collect();
        candidates.sort_by(|&a, &b| {
            let (ta, tb) = (self.cpm.timing(a), self.cpm.timing(b));
            let float_a = ta.map_or(0.0, |t| t.total_float);
            let float_b = tb.map_or(0.0, |t| t.total_float);
            float_b
                .total_cmp(&float_a)
                .then_with(|| {
                    let es_a = ta.map(|t| t.early_start);
                    let es_b = tb.map(|t| t.early_start);
                    es_b.cmp(&es_a)
                })
                .then_with(|| graph.id(a).cmp(graph.id(b)))
        });
        candidates.dedup();
        candidates
    }

    /// Try to move one task off `day`. Returns true if a shift was committed.
    fn resolve(&mut self, resource: usize, day: NaiveDate, tasks: &[TaskIdx]) -> bool {
        let cpm = self.cpm;
        let graph = cpm.snapshot().graph();
        for task in self.candidates(tasks) {
            let (Some(resolved), Some(late_start)) =
                (self.network.tasks[task as usize], self.late_start(task))
            else {
                continue;
            };
            let Some(after) = day.succ_opt() else {
                continue;
            };
            let mut start = resolved.calendar.next_working_day(after);

            while start <= late_start {
                let mut floors = self.floors.clone();
                floors[task as usize] = Some(start);
                let trial = self.network.forward_pass(&floors);

                let accepted = match trial[task as usize] {
                    Some(window) if window.0 > day && self.within_late_starts(&trial) => !self
                        .demands
                        .by_task[task as usize]
                        .iter()
                        .any(|&r| self.load(r, &trial).overloaded_within(window.0, window.1)),
                    _ => false,
                };

                if accepted {
                    log_changes!(
                        self.verbosity,
                        "Leveling {}: shifted {} to start {} (overload on {})",
                        self.resources[resource].id,
                        graph.id(task),
                        start,
                        day
                    );
                    self.floors = floors;
                    self.windows = trial;
                    return true;
                }
                log_checks!(
                    self.verbosity,
                    "  {} cannot start {} without a new overload or slipping past late start",
                    graph.id(task),
                    start
                );
                let Some(next) = start.succ_opt() else {
                    break;
                };
                start = resolved.calendar.next_working_day(next);
            }
        }
        false
    }

    fn run(&mut self) {
        for r in 0..self.resources.len() {
            let mut cursor: Option<NaiveDate> = None;
            loop {
                let load = self.load(r, &self.windows);
                let Some((day, day_load)) = load.next_overload(cursor) else {
                    break;
                };
                let tasks = day_load.tasks.clone();
                log_checks!(
                    self.verbosity,
                    "Resource {} overloaded on {}: demand {} > capacity {}",
                    load.resource_id,
                    day,
                    day_load.demand,
                    load.capacity
                );
                // A committed shift may leave the same day overloaded; rescan it.
                if !self.resolve(r, day, &tasks) {
                    cursor = Some(day);
                }
            }
        }
    }

    fn into_result(self) -> LevelingResult {
        let graph = self.cpm.snapshot().graph();
        let mut conflicts = Vec::new();
        let mut resource_costs = Vec::with_capacity(self.resources.len());

        for r in 0..self.resources.len() {
            let load = self.load(r, &self.windows);
            for (date, day_load) in load.overloads() {
                conflicts.push(LevelingConflict {
                    resource_id: load.resource_id.clone(),
                    date,
                    demand: day_load.demand,
                    capacity: load.capacity,
                    task_ids: day_load
                        .tasks
                        .iter()
                        .map(|&t| graph.id(t).to_string())
                        .collect(),
                });
            }
            resource_costs.push((load.resource_id.clone(), load.cost()));
        }

        let tasks: Vec<LeveledTask> = self
            .network
            .order
            .iter()
            .filter_map(|&idx| {
                let timing = self.cpm.timing(idx)?;
                let window = self.windows[idx as usize]?;
                let resolved = self.network.tasks[idx as usize]?;
                Some(LeveledTask {
                    task_id: timing.task_id.clone(),
                    start: window.0,
                    finish: window.1,
                    shift_days: resolved
                        .calendar
                        .working_days_between(timing.early_start, window.0),
                    early_start: timing.early_start,
                    late_start: timing.late_start,
                })
            })
            .collect();

        let project_end = self.network.project_end(&self.windows);

        if !conflicts.is_empty() {
            log_changes!(
                self.verbosity,
                "Leveling left {} unresolved conflict(s)",
                conflicts.len()
            );
        }

        LevelingResult {
            tasks,
            unresolved_conflicts: conflicts,
            skipped_assignments: self.demands.skipped,
            resource_costs,
            project_end,
        }
    }
}

/// Level resource usage within float.
///
/// Leveling is advisory: conflicts that cannot be fixed without moving a
/// critical task or slipping past a late start are listed in the result,
/// never raised.
pub fn level_resources(
    cpm: &CpmResult,
    assignments: &[Assignment],
    resources: &[Resource],
) -> Result<LevelingResult, ScheduleError> {
    let demands = collect_demands(cpm, assignments, resources)?;
    let network = Network::resolve(cpm.snapshot(), cpm.config())?;
    let floors = vec![None; network.tasks.len()];
    let windows = network.forward_pass(&floors);

    let mut leveler = Leveler {
        cpm,
        network,
        resources,
        demands,
        floors,
        windows,
        verbosity: cpm.config().verbosity,
    };
    leveler.run();
    Ok(leveler.into_result())
}
