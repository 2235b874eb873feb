//! Greedy least-cost crashing.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::calendar::EPSILON;
use crate::config::EngineConfig;
use crate::critical_path::{compute_critical_path, CpmResult};
use crate::error::{ScheduleError, ValidationError};
use crate::graph::TaskIdx;
use crate::project::ProjectSnapshot;
use crate::{log_changes, log_checks};

use super::{AdjustedTask, CrashEntry, OptimizationResult};

#[derive(Clone, Copy, Debug)]
struct Candidate {
    task: TaskIdx,
    /// Working days removed in this step.
    cut: f64,
    cost_per_day: f64,
}

impl Candidate {
    fn cost(&self) -> f64 {
        self.cut * self.cost_per_day
    }
}

fn index_cost_table<'t>(
    snapshot: &ProjectSnapshot,
    cost_table: &'t [CrashEntry],
) -> Result<FxHashMap<TaskIdx, &'t CrashEntry>, ValidationError> {
    let mut costs = FxHashMap::default();
    for entry in cost_table {
        let idx = snapshot
            .graph()
            .index_of(&entry.task_id)
            .ok_or_else(|| ValidationError::UnknownTask(entry.task_id.clone()))?;
        let valid = entry.cost_per_day.is_finite()
            && entry.cost_per_day >= 0.0
            && entry.min_duration.is_finite()
            && entry.min_duration >= 0.0;
        if !valid {
            return Err(ValidationError::InvalidCrashEntry(entry.task_id.clone()));
        }
        costs.insert(idx, entry);
    }
    Ok(costs)
}

fn duration_of(snapshot: &ProjectSnapshot, idx: TaskIdx) -> f64 {
    snapshot.task(idx).effective_duration().unwrap_or(0.0)
}

/// Copy of `snapshot` with every candidate's cut applied.
fn with_cuts(snapshot: &ProjectSnapshot, cuts: &[Candidate]) -> Result<ProjectSnapshot, ScheduleError> {
    let mut trial = snapshot.clone();
    for c in cuts {
        let id = snapshot.graph().id(c.task);
        let shortened = (duration_of(snapshot, c.task) - c.cut).max(0.0);
        trial.update_duration(id, Some(shortened))?;
    }
    Ok(trial)
}

/// Drop members of a gaining combination that the gain does not depend on.
///
/// Members are tried most expensive first; a removal is kept when the project
/// still ends at least as early without it.
fn prune_combined(
    snapshot: &ProjectSnapshot,
    config: &EngineConfig,
    mut combined: Vec<Candidate>,
    mut trial: CpmResult,
) -> Result<(Vec<Candidate>, CpmResult), ScheduleError> {
    let mut i = combined.len();
    while i > 0 && combined.len() > 1 {
        i -= 1;
        let mut without = combined.clone();
        let dropped = without.remove(i);
        let lighter = compute_critical_path(&with_cuts(snapshot, &without)?, config)?;
        if lighter.project_end <= trial.project_end {
            log_checks!(
                config.verbosity,
                "  combined cut of {} not needed",
                snapshot.graph().id(dropped.task)
            );
            combined = without;
            trial = lighter;
        }
    }
    Ok((combined, trial))
}

/// Shorten critical tasks, cheapest gain first, until `target_end` is reached
/// or no critical task with a cost entry can be shortened further.
///
/// Each step removes up to `crash_step_days` from one task. When parallel
/// critical chains mean no single cut gains a day, the cheapest cuts are
/// combined until they do, then cuts the gain does not need are dropped.
pub fn crash(
    cpm: &CpmResult,
    target_end: NaiveDate,
    cost_table: &[CrashEntry],
) -> Result<OptimizationResult, ScheduleError> {
    let config = cpm.config();
    let verbosity = config.verbosity;
    let step = config.effective_crash_step();
    let costs = index_cost_table(cpm.snapshot(), cost_table)?;

    if cpm.project_end <= target_end {
        return Ok(OptimizationResult::unchanged(cpm, target_end));
    }

    let mut snapshot = cpm.snapshot().clone();
    let mut current = cpm.clone();
    let mut spent: FxHashMap<TaskIdx, f64> = FxHashMap::default();
    let mut added_cost = 0.0;
    let mut iterations = 0;

    while current.project_end > target_end && iterations < config.max_optimizer_iterations {
        iterations += 1;

        let mut candidates: Vec<Candidate> = current
            .critical_tasks()
            .iter()
            .filter_map(|&idx| {
                let entry = costs.get(&idx)?;
                let room = duration_of(&snapshot, idx) - entry.min_duration;
                (room > EPSILON).then(|| Candidate {
                    task: idx,
                    cut: step.min(room),
                    cost_per_day: entry.cost_per_day,
                })
            })
            .collect();
        if candidates.is_empty() {
            log_changes!(verbosity, "Crashing: critical path saturated at {}", current.project_end);
            break;
        }

        let mut best: Option<(f64, Candidate, CpmResult)> = None;
        for &candidate in &candidates {
            let trial = compute_critical_path(&with_cuts(&snapshot, &[candidate])?, config)?;
            let gain = (current.project_end - trial.project_end).num_days();
            log_checks!(
                verbosity,
                "  crash {} by {}: gain {} day(s) for {}",
                snapshot.graph().id(candidate.task),
                candidate.cut,
                gain,
                candidate.cost()
            );
            if gain <= 0 {
                continue;
            }
            let ratio = candidate.cost() / gain as f64;
            if best.as_ref().map_or(true, |(r, _, _)| ratio < *r) {
                best = Some((ratio, candidate, trial));
            }
        }

        let (applied, next) = match best {
            Some((_, candidate, trial)) => (vec![candidate], trial),
            None => {
                // Parallel critical chains: cut the cheapest tasks together.
                candidates.sort_by(|a, b| {
                    a.cost_per_day.total_cmp(&b.cost_per_day).then_with(|| {
                        snapshot
                            .graph()
                            .id(a.task)
                            .cmp(snapshot.graph().id(b.task))
                    })
                });
                let mut combined = Vec::new();
                let mut found = None;
                for candidate in candidates {
                    combined.push(candidate);
                    let trial = compute_critical_path(&with_cuts(&snapshot, &combined)?, config)?;
                    if trial.project_end < current.project_end {
                        found = Some(trial);
                        break;
                    }
                }
                match found {
                    Some(trial) => prune_combined(&snapshot, config, combined, trial)?,
                    None => {
                        log_changes!(
                            verbosity,
                            "Crashing: no combination of cuts shortens the project past {}",
                            current.project_end
                        );
                        break;
                    }
                }
            }
        };

        snapshot = with_cuts(&snapshot, &applied)?;
        for c in &applied {
            added_cost += c.cost();
            *spent.entry(c.task).or_insert(0.0) += c.cost();
            log_changes!(
                verbosity,
                "Crashing {} by {} day(s) at {}/day",
                snapshot.graph().id(c.task),
                c.cut,
                c.cost_per_day
            );
        }
        current = next;
    }

    let adjusted_tasks = cpm
        .order()
        .iter()
        .filter_map(|&idx| {
            let cost = *spent.get(&idx)?;
            Some(AdjustedTask {
                task_id: snapshot.graph().id(idx).to_string(),
                original_duration: duration_of(cpm.snapshot(), idx),
                new_duration: duration_of(&snapshot, idx),
                added_cost: cost,
            })
        })
        .collect();

    Ok(OptimizationResult {
        adjusted_tasks,
        adjusted_dependencies: Vec::new(),
        achieved_end: current.project_end,
        added_cost,
        target_met: current.project_end <= target_end,
        schedule: current,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::{Dependency, Task};

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Duration::days(n)
    }

    fn scenario_a() -> CpmResult {
        let snapshot = ProjectSnapshot::from_records(
            day(0),
            vec![
                Task::new("A", 5.0),
                Task::new("B", 3.0),
                Task::new("C", 4.0),
                Task::new("D", 10.0),
            ],
            vec![
                Dependency::finish_to_start("A", "B"),
                Dependency::finish_to_start("B", "C"),
            ],
            vec![],
        )
        .unwrap();
        compute_critical_path(&snapshot, &EngineConfig::default()).unwrap()
    }

    fn cost_table() -> Vec<CrashEntry> {
        vec![CrashEntry::new("B", 100.0, 1.0), CrashEntry::new("C", 50.0, 2.0)]
    }

    #[test]
    fn test_crash_to_ten_days() {
        let cpm = scenario_a();
        let result = crash(&cpm, day(10), &cost_table()).unwrap();

        assert!(result.target_met);
        assert_eq!(result.achieved_end, day(10));
        assert_eq!(result.achieved_duration_days(), 10);
        assert_eq!(result.added_cost, 100.0);
        assert_eq!(
            result.adjusted_tasks,
            vec![AdjustedTask {
                task_id: "C".into(),
                original_duration: 4.0,
                new_duration: 2.0,
                added_cost: 100.0,
            }]
        );
        // original schedule untouched
        assert_eq!(cpm.project_duration_days(), 12);
        assert_eq!(cpm.snapshot().task_by_id("C").unwrap().duration_days, Some(4.0));
    }

    #[test]
    fn test_saturates_on_parallel_path() {
        // D (10 days) becomes critical once A-B-C reaches 10
        let cpm = scenario_a();
        let result = crash(&cpm, day(8), &cost_table()).unwrap();

        assert!(!result.target_met);
        assert_eq!(result.achieved_end, day(10));
        assert_eq!(result.added_cost, 100.0);
        assert!(result.schedule.timing_by_id("D").unwrap().is_critical);
    }

    #[test]
    fn test_combined_cuts_on_parallel_chains() {
        // Two equal chains; only cutting both gains a day
        let snapshot = ProjectSnapshot::from_records(
            day(0),
            vec![Task::new("P", 4.0), Task::new("Q", 4.0)],
            vec![],
            vec![],
        )
        .unwrap();
        let cpm = compute_critical_path(&snapshot, &EngineConfig::default()).unwrap();
        let table = vec![CrashEntry::new("P", 30.0, 1.0), CrashEntry::new("Q", 20.0, 1.0)];
        let result = crash(&cpm, day(3), &table).unwrap();

        assert!(result.target_met);
        assert_eq!(result.achieved_end, day(3));
        assert_eq!(result.added_cost, 50.0);
        assert_eq!(result.adjusted_tasks.len(), 2);
    }

    #[test]
    fn test_combined_cuts_drop_unneeded_members() {
        // X -> Y runs alongside Z; cutting X and Z is enough, Y only adds cost
        let snapshot = ProjectSnapshot::from_records(
            day(0),
            vec![Task::new("X", 3.0), Task::new("Y", 3.0), Task::new("Z", 6.0)],
            vec![Dependency::finish_to_start("X", "Y")],
            vec![],
        )
        .unwrap();
        let cpm = compute_critical_path(&snapshot, &EngineConfig::default()).unwrap();
        let table = vec![
            CrashEntry::new("X", 1.0, 0.0),
            CrashEntry::new("Y", 2.0, 0.0),
            CrashEntry::new("Z", 10.0, 0.0),
        ];
        let result = crash(&cpm, day(5), &table).unwrap();

        assert!(result.target_met);
        assert_eq!(result.achieved_end, day(5));
        assert_eq!(result.added_cost, 11.0);
        let mut adjusted: Vec<_> = result
            .adjusted_tasks
            .iter()
            .map(|t| (t.task_id.as_str(), t.new_duration))
            .collect();
        adjusted.sort_by(|a, b| a.0.cmp(b.0));
        assert_eq!(adjusted, vec![("X", 2.0), ("Z", 5.0)]);
        assert_eq!(result.schedule.snapshot().task_by_id("Y").unwrap().duration_days, Some(3.0));
    }

    #[test]
    fn test_invalid_entries() {
        let cpm = scenario_a();
        let err = crash(&cpm, day(10), &[CrashEntry::new("Z", 1.0, 0.0)]).unwrap_err();
        assert_eq!(err, ScheduleError::Validation(ValidationError::UnknownTask("Z".into())));

        let err = crash(&cpm, day(10), &[CrashEntry::new("B", f64::NAN, 0.0)]).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::Validation(ValidationError::InvalidCrashEntry("B".into()))
        );
    }

    #[test]
    fn test_crash_step_from_config() {
        let snapshot = ProjectSnapshot::from_records(day(0), vec![Task::new("A", 6.0)], vec![], vec![]).unwrap();
        let config = EngineConfig {
            crash_step_days: 2.0,
            ..EngineConfig::default()
        };
        let cpm = compute_critical_path(&snapshot, &config).unwrap();
        let result = crash(&cpm, day(3), &[CrashEntry::new("A", 10.0, 0.0)]).unwrap();

        // two steps of two days overshoot the target by one
        assert_eq!(result.achieved_end, day(2));
        assert_eq!(result.added_cost, 40.0);
    }
}
