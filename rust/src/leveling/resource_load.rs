//! Per-resource daily demand profile.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::ops::Bound;

use crate::calendar::{Calendar, EPSILON};
use crate::graph::TaskIdx;
use crate::models::Resource;

/// Demand placed on a resource on one day.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DayLoad {
    pub demand: f64,
    /// Tasks active that day, in the order they were added.
    pub tasks: Vec<TaskIdx>,
}

/// Tracks how much of a resource each day consumes.
///
/// Days are kept in a `BTreeMap` so overloads can be scanned chronologically
/// and a task's window can be checked with a range query.
#[derive(Clone, Debug)]
pub struct ResourceLoad {
    pub resource_id: String,
    pub capacity: f64,
    cost_rate: f64,
    days: BTreeMap<NaiveDate, DayLoad>,
    /// Sum of demand over every active day.
    demand_days: f64,
}

impl ResourceLoad {
    pub fn new(resource: &Resource) -> Self {
        Self {
            resource_id: resource.id.clone(),
            capacity: resource.capacity,
            cost_rate: resource.cost_rate,
            days: BTreeMap::new(),
            demand_days: 0.0,
        }
    }

    /// Book `demand` units on every working day of `[start, finish)`.
    pub fn add_task(
        &mut self,
        task: TaskIdx,
        demand: f64,
        (start, finish): (NaiveDate, NaiveDate),
        calendar: &Calendar,
    ) {
        for day in start.iter_days().take_while(|d| *d < finish) {
            if !calendar.is_working_day(day) {
                continue;
            }
            let load = self.days.entry(day).or_default();
            load.demand += demand;
            load.tasks.push(task);
            self.demand_days += demand;
        }
    }

    #[inline]
    fn is_over(&self, load: &DayLoad) -> bool {
        load.demand > self.capacity + EPSILON
    }

    pub fn load_on(&self, day: NaiveDate) -> Option<&DayLoad> {
        self.days.get(&day)
    }

    /// Overloaded days in chronological order.
    pub fn overloads(&self) -> impl Iterator<Item = (NaiveDate, &DayLoad)> + '_ {
        self.days
            .iter()
            .filter(|(_, load)| self.is_over(load))
            .map(|(day, load)| (*day, load))
    }

    /// First overloaded day strictly after `after` (or the first overall).
    pub fn next_overload(&self, after: Option<NaiveDate>) -> Option<(NaiveDate, &DayLoad)> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        self.days
            .range((lower, Bound::Unbounded))
            .find(|(_, load)| self.is_over(load))
            .map(|(day, load)| (*day, load))
    }

    /// Whether any day of `[start, finish)` is overloaded.
    pub fn overloaded_within(&self, start: NaiveDate, finish: NaiveDate) -> bool {
        if start >= finish {
            return false;
        }
        self.days
            .range(start..finish)
            .any(|(_, load)| self.is_over(load))
    }

    pub fn peak_demand(&self) -> f64 {
        self.days.values().map(|l| l.demand).fold(0.0, f64::max)
    }

    /// `cost_rate × demand` summed over active days.
    pub fn cost(&self) -> f64 {
        self.cost_rate * self.demand_days
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn crane() -> Resource {
        Resource::new("crane", 1.0, 200.0)
    }

    #[test]
    fn test_overloads_chronological() {
        let calendar = Calendar::seven_day("site");
        let mut load = ResourceLoad::new(&crane());
        load.add_task(0, 1.0, (d(1), d(4)), &calendar);
        load.add_task(1, 1.0, (d(3), d(6)), &calendar);

        let over: Vec<_> = load.overloads().map(|(day, l)| (day, l.tasks.clone())).collect();
        assert_eq!(over, vec![(d(3), vec![0, 1])]);
        assert_eq!(load.next_overload(None).map(|(day, _)| day), Some(d(3)));
        assert_eq!(load.next_overload(Some(d(3))), None);
        assert!(load.overloaded_within(d(2), d(4)));
        assert!(!load.overloaded_within(d(4), d(6)));
        assert_eq!(load.peak_demand(), 2.0);
    }

    #[test]
    fn test_non_working_days_not_booked() {
        // 2025-01-04 and 2025-01-05 are a weekend
        let calendar = Calendar::five_day("site");
        let mut load = ResourceLoad::new(&crane());
        load.add_task(0, 0.5, (d(3), d(7)), &calendar);
        assert!(load.load_on(d(4)).is_none());
        assert!(load.load_on(d(5)).is_none());
        assert_eq!(load.load_on(d(6)).map(|l| l.demand), Some(0.5));
        // Friday and Monday at half a crane, 200 per crane-day
        assert_eq!(load.cost(), 200.0);
    }

    #[test]
    fn test_milestone_books_nothing() {
        let calendar = Calendar::seven_day("site");
        let mut load = ResourceLoad::new(&crane());
        load.add_task(0, 1.0, (d(2), d(2)), &calendar);
        assert_eq!(load.peak_demand(), 0.0);
        assert!(!load.overloaded_within(d(2), d(2)));
    }
}
