//! Working-time calendars and the date arithmetic built on them.
//!
//! A task occupies the half-open range `[start, finish)`: a 5-day task that
//! starts on Monday in a seven-day calendar finishes on Saturday. Partially
//! used days are consumed whole, so fractional work rounds up.

use chrono::{Datelike, NaiveDate, Weekday};
use pyo3::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::ValidationError;

/// Id of the built-in calendar in which every day is a working day.
pub const STANDARD_CALENDAR: &str = "standard";

/// Comparison tolerance for fractional working time.
pub(crate) const EPSILON: f64 = 1e-9;

const ALL_DAYS: u8 = 0b0111_1111;
const MON_TO_FRI: u8 = 0b0001_1111;

/// Seasonal window (inclusive months, may wrap the year end) in which a
/// task's weather-risk multiplier slows progress.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RiskWindow {
    #[pyo3(get)]
    pub start_month: u32,
    #[pyo3(get)]
    pub end_month: u32,
}

impl RiskWindow {
    pub fn months(start_month: u32, end_month: u32) -> Self {
        Self {
            start_month: start_month.clamp(1, 12),
            end_month: end_month.clamp(1, 12),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        let month = date.month();
        if self.start_month <= self.end_month {
            month >= self.start_month && month <= self.end_month
        } else {
            month >= self.start_month || month <= self.end_month
        }
    }
}

#[pymethods]
impl RiskWindow {
    #[new]
    fn py_new(start_month: u32, end_month: u32) -> Self {
        Self::months(start_month, end_month)
    }

    fn __repr__(&self) -> String {
        format!("RiskWindow({}..={})", self.start_month, self.end_month)
    }
}

/// Named work week plus holiday dates and seasonal risk windows.
#[pyclass]
#[derive(Clone, Debug)]
pub struct Calendar {
    #[pyo3(get)]
    pub id: String,
    /// Bit `n` set means weekday `n` (Monday = 0) is a working day.
    work_week: u8,
    holidays: FxHashSet<NaiveDate>,
    risk_windows: Vec<RiskWindow>,
}

impl Calendar {
    /// Calendar working on the given weekdays.
    pub fn new(id: impl Into<String>, weekdays: &[Weekday]) -> Self {
        let work_week = weekdays
            .iter()
            .fold(0u8, |mask, day| mask | (1 << day.num_days_from_monday()));
        Self {
            id: id.into(),
            work_week,
            holidays: FxHashSet::default(),
            risk_windows: Vec::new(),
        }
    }

    /// Every day is a working day.
    pub fn seven_day(id: impl Into<String>) -> Self {
        Self::from_mask(id, ALL_DAYS)
    }

    /// Monday to Friday.
    pub fn five_day(id: impl Into<String>) -> Self {
        Self::from_mask(id, MON_TO_FRI)
    }

    pub fn standard() -> Self {
        Self::seven_day(STANDARD_CALENDAR)
    }

    fn from_mask(id: impl Into<String>, work_week: u8) -> Self {
        Self {
            id: id.into(),
            work_week,
            holidays: FxHashSet::default(),
            risk_windows: Vec::new(),
        }
    }

    pub fn with_holiday(mut self, date: NaiveDate) -> Self {
        self.holidays.insert(date);
        self
    }

    pub fn with_holidays(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(dates);
        self
    }

    pub fn with_risk_window(mut self, window: RiskWindow) -> Self {
        self.risk_windows.push(window);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.work_week & ALL_DAYS == 0 {
            return Err(ValidationError::EmptyWorkWeek(self.id.clone()));
        }
        Ok(())
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        let bit = 1u8 << date.weekday().num_days_from_monday();
        self.work_week & bit != 0 && !self.holidays.contains(&date)
    }

    /// First working day at or after `date`.
    pub fn next_working_day(&self, date: NaiveDate) -> NaiveDate {
        if self.work_week & ALL_DAYS == 0 {
            return date;
        }
        let mut day = date;
        while !self.is_working_day(day) {
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        day
    }

    /// Whether `date` falls inside a seasonal risk window.
    pub fn is_risk_day(&self, date: NaiveDate) -> bool {
        self.risk_windows.iter().any(|w| w.contains(date))
    }

    /// Nominal work accomplished on a working day.
    fn progress_on(&self, date: NaiveDate, multiplier: f64) -> f64 {
        if multiplier > 0.0 && self.is_risk_day(date) {
            1.0 / multiplier
        } else {
            1.0
        }
    }

    /// Advance `start` by `duration` working days, returning the exclusive finish.
    ///
    /// Inside risk windows each working day only accomplishes `1 / multiplier`
    /// of a day of nominal work, which stretches the elapsed time.
    pub fn add_working_duration(&self, start: NaiveDate, duration: f64, multiplier: f64) -> NaiveDate {
        if duration <= EPSILON || self.work_week & ALL_DAYS == 0 {
            return start;
        }
        let mut remaining = duration;
        let mut day = start;
        while remaining > EPSILON {
            if self.is_working_day(day) {
                remaining -= self.progress_on(day, multiplier);
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        day
    }

    /// Inverse of [`Calendar::add_working_duration`]: the start that yields `finish`.
    pub fn subtract_working_duration(
        &self,
        finish: NaiveDate,
        duration: f64,
        multiplier: f64,
    ) -> NaiveDate {
        if duration <= EPSILON || self.work_week & ALL_DAYS == 0 {
            return finish;
        }
        let mut remaining = duration;
        let mut day = finish;
        while remaining > EPSILON {
            match day.pred_opt() {
                Some(prev) => day = prev,
                None => break,
            }
            if self.is_working_day(day) {
                remaining -= self.progress_on(day, multiplier);
            }
        }
        day
    }

    /// Apply a signed lag (negative = lead) in working days.
    pub fn shift_working_days(&self, date: NaiveDate, offset: f64) -> NaiveDate {
        if offset > EPSILON {
            self.add_working_duration(date, offset, 1.0)
        } else if offset < -EPSILON {
            self.subtract_working_duration(date, -offset, 1.0)
        } else {
            date
        }
    }

    /// Signed count of working days in `[from, to)`.
    pub fn working_days_between(&self, from: NaiveDate, to: NaiveDate) -> f64 {
        let (lo, hi, sign) = if from <= to {
            (from, to, 1.0)
        } else {
            (to, from, -1.0)
        };
        let count = lo
            .iter_days()
            .take_while(|d| *d < hi)
            .filter(|d| self.is_working_day(*d))
            .count();
        sign * count as f64
    }

    pub fn holidays(&self) -> impl Iterator<Item = &NaiveDate> {
        self.holidays.iter()
    }
}

#[pymethods]
impl Calendar {
    #[new]
    #[pyo3(signature = (id, working_weekdays=None, holidays=None, risk_windows=None))]
    fn py_new(
        id: String,
        working_weekdays: Option<Vec<u32>>,
        holidays: Option<Vec<NaiveDate>>,
        risk_windows: Option<Vec<RiskWindow>>,
    ) -> Self {
        let work_week = match working_weekdays {
            Some(days) => days
                .into_iter()
                .filter(|d| *d < 7)
                .fold(0u8, |mask, d| mask | (1 << d)),
            None => MON_TO_FRI,
        };
        Self {
            id,
            work_week,
            holidays: holidays.unwrap_or_default().into_iter().collect(),
            risk_windows: risk_windows.unwrap_or_default(),
        }
    }

    /// Working weekdays as numbers (Monday = 0).
    #[getter]
    fn working_weekdays(&self) -> Vec<u32> {
        (0..7).filter(|d| self.work_week & (1 << d) != 0).collect()
    }

    #[getter(holidays)]
    fn py_holidays(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.holidays.iter().copied().collect();
        dates.sort();
        dates
    }

    #[getter(risk_windows)]
    fn py_risk_windows(&self) -> Vec<RiskWindow> {
        self.risk_windows.clone()
    }

    fn __repr__(&self) -> String {
        format!(
            "Calendar(id={:?}, weekdays={:?}, holidays={}, risk_windows={})",
            self.id,
            self.working_weekdays(),
            self.holidays.len(),
            self.risk_windows.len()
        )
    }
}

/// Calendars available to a project, keyed by id.
#[derive(Clone, Debug, Default)]
pub struct CalendarSet {
    calendars: FxHashMap<String, Calendar>,
}

impl CalendarSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set containing only the built-in seven-day calendar.
    pub fn with_standard() -> Self {
        let mut set = Self::new();
        set.calendars
            .insert(STANDARD_CALENDAR.to_string(), Calendar::standard());
        set
    }

    /// Standard calendar plus the given ones (which may override it).
    pub fn from_calendars(
        calendars: impl IntoIterator<Item = Calendar>,
    ) -> Result<Self, ValidationError> {
        let mut set = Self::with_standard();
        for calendar in calendars {
            set.insert(calendar)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, calendar: Calendar) -> Result<(), ValidationError> {
        calendar.validate()?;
        self.calendars.insert(calendar.id.clone(), calendar);
        Ok(())
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&Calendar> {
        self.calendars.get(id)
    }

    pub fn len(&self) -> usize {
        self.calendars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calendars.is_empty()
    }
}
