//! Fast-tracking: overlap critical finish-to-start pairs.

use chrono::NaiveDate;
use rustc_hash::FxHashSet;

use crate::critical_path::{compute_critical_path, CpmResult};
use crate::error::{ScheduleError, ValidationError};
use crate::graph::{Edge, TaskIdx};
use crate::models::DependencyType;
use crate::{log_changes, log_checks};

use super::{AdjustedDependency, OptimizationResult};

/// Next critical FS edge that can still be overlapped, with the overlap to apply.
fn next_conversion(
    current: &CpmResult,
    target_end: NaiveDate,
    max_overlap_fraction: f64,
    converted: &FxHashSet<(TaskIdx, TaskIdx)>,
) -> Option<(Edge, f64)> {
    let snapshot = current.snapshot();
    let graph = snapshot.graph();
    let verbosity = current.config().verbosity;

    for &pred in current.critical_tasks() {
        for link in graph.successors(pred) {
            let critical_succ = current.timing(link.task).is_some_and(|t| t.is_critical);
            if link.kind != DependencyType::FinishToStart
                || link.lag > 0.0
                || !critical_succ
                || converted.contains(&(pred, link.task))
            {
                continue;
            }
            let pred_duration = snapshot.task(pred).effective_duration().unwrap_or(0.0);
            let available = (max_overlap_fraction * pred_duration).floor() + link.lag;
            if available < 1.0 {
                log_checks!(
                    verbosity,
                    "  {} -> {}: no overlap left",
                    graph.id(pred),
                    graph.id(link.task)
                );
                continue;
            }
            let needed = snapshot
                .calendar_for(link.task, &current.config().default_calendar)
                .map_or(available, |cal| {
                    cal.working_days_between(target_end, current.project_end)
                });
            let overlap = available.min(needed.max(1.0));
            let edge = Edge {
                pred,
                succ: link.task,
                kind: link.kind,
                lag: link.lag,
            };
            return Some((edge, overlap));
        }
    }
    None
}

/// Overlap critical finish-to-start dependencies until `target_end` is met.
///
/// An edge may overlap by at most `floor(max_overlap_fraction × predecessor
/// duration)` working days in total (existing leads count toward it), and
/// only as much as is still needed. CPM is recomputed after each conversion
/// so the next pick always comes from the current critical path.
pub fn fast_track(
    cpm: &CpmResult,
    target_end: NaiveDate,
    max_overlap_fraction: f64,
) -> Result<OptimizationResult, ScheduleError> {
    if !(0.0..=1.0).contains(&max_overlap_fraction) {
        return Err(ValidationError::InvalidOverlapFraction(max_overlap_fraction).into());
    }
    if cpm.project_end <= target_end {
        return Ok(OptimizationResult::unchanged(cpm, target_end));
    }

    let config = cpm.config();
    let verbosity = config.verbosity;
    let mut snapshot = cpm.snapshot().clone();
    let mut current = cpm.clone();
    let mut converted: FxHashSet<(TaskIdx, TaskIdx)> = FxHashSet::default();
    let mut adjusted_dependencies = Vec::new();
    let mut iterations = 0;

    while current.project_end > target_end && iterations < config.max_optimizer_iterations {
        iterations += 1;
        let Some((edge, overlap)) =
            next_conversion(&current, target_end, max_overlap_fraction, &converted)
        else {
            log_changes!(verbosity, "Fast-tracking: no convertible edges left");
            break;
        };

        let new_lag = edge.lag - overlap;
        snapshot.set_lag(edge.pred, edge.succ, new_lag)?;
        converted.insert((edge.pred, edge.succ));
        current = compute_critical_path(&snapshot, config)?;

        let graph = snapshot.graph();
        log_changes!(
            verbosity,
            "Fast-tracking {} -> {}: lag {} -> {}, project end {}",
            graph.id(edge.pred),
            graph.id(edge.succ),
            edge.lag,
            new_lag,
            current.project_end
        );
        adjusted_dependencies.push(AdjustedDependency {
            predecessor: graph.id(edge.pred).to_string(),
            successor: graph.id(edge.succ).to_string(),
            original_lag: edge.lag,
            new_lag,
        });
    }

    Ok(OptimizationResult {
        adjusted_tasks: Vec::new(),
        adjusted_dependencies,
        achieved_end: current.project_end,
        added_cost: 0.0,
        target_met: current.project_end <= target_end,
        schedule: current,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::{Dependency, Task};
    use crate::project::ProjectSnapshot;

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

    #[test]
    fn test_overlap_only_as_needed() {
        let cpm = scenario_a();
        let result = fast_track(&cpm, day(10), 0.5).unwrap();

        assert!(result.target_met);
        assert_eq!(result.achieved_end, day(10));
        assert_eq!(
            result.adjusted_dependencies,
            vec![AdjustedDependency {
                predecessor: "A".into(),
                successor: "B".into(),
                original_lag: 0.0,
                new_lag: -2.0,
            }]
        );
        assert_eq!(result.schedule.timing_by_id("B").unwrap().early_start, day(3));
        assert_eq!(result.added_cost, 0.0);
        // input untouched
        assert_eq!(cpm.project_duration_days(), 12);
    }

    #[test]
    fn test_stops_when_edges_exhausted() {
        let cpm = scenario_a();
        let result = fast_track(&cpm, day(8), 0.5).unwrap();

        assert!(!result.target_met);
        assert_eq!(result.achieved_end, day(10));
        assert_eq!(result.adjusted_dependencies.len(), 2);
        assert_eq!(result.adjusted_dependencies[1].new_lag, -1.0);
    }

    #[test]
    fn test_zero_fraction_converts_nothing() {
        let cpm = scenario_a();
        let result = fast_track(&cpm, day(10), 0.0).unwrap();
        assert!(result.adjusted_dependencies.is_empty());
        assert_eq!(result.achieved_end, cpm.project_end);
    }

    #[test]
    fn test_invalid_fraction() {
        let cpm = scenario_a();
        for fraction in [-0.1, 1.5, f64::NAN] {
            assert!(matches!(
                fast_track(&cpm, day(10), fraction),
                Err(ScheduleError::Validation(ValidationError::InvalidOverlapFraction(_)))
            ));
        }
    }
}
