//! Next-date computation and occurrence enumeration for recurrence rules.
//!
//! Everything here works on `NaiveDate`: civil dates in the user's calendar with no
//! time-of-day and no timezone. A `None` result means the rule cannot produce a date
//! (an empty day set, for instance) and callers treat it as "no occurrence".
//!
//! Only daily rules step by their interval here. Weekly and monthly rules fire on
//! every listed day; their interval is the stride the streak walk steps back by.

use chrono::{Datelike, Days, Months, NaiveDate};

use crate::models::{Recurrence, RecurrenceRule};

const WEEKLY_WINDOW_DAYS: u64 = 14;
const MONTHS_AHEAD: u32 = 12;

/// First date strictly after `from` on which the rule fires.
pub fn next_occurrence(rule: &RecurrenceRule, from: NaiveDate) -> Option<NaiveDate> {
    match &rule.recurrence {
        Recurrence::Daily { interval } => from.checked_add_days(Days::new(u64::from(*interval))),
        Recurrence::Weekly { days_of_week, .. } => (1..=WEEKLY_WINDOW_DAYS)
            .filter_map(|offset| from.checked_add_days(Days::new(offset)))
            .find(|d| days_of_week.contains(&d.weekday())),
        Recurrence::Monthly { days_of_month, .. } => {
            let first_of_month = from.with_day(1)?;
            for ahead in 0..=MONTHS_AHEAD {
                let month = first_of_month.checked_add_months(Months::new(ahead))?;
                let mut candidates: Vec<NaiveDate> = days_of_month
                    .iter()
                    .filter_map(|day| resolve_month_day(month.year(), month.month(), *day))
                    .collect();
                candidates.sort_unstable();
                if let Some(found) = candidates.into_iter().find(|d| *d > from) {
                    return Some(found);
                }
            }
            None
        }
    }
}

/// First occurrence on `date` or later, never before the rule's start date.
pub fn occurrence_on_or_after(rule: &RecurrenceRule, date: NaiveDate) -> Option<NaiveDate> {
    let date = date.max(rule.start_date);
    if matches!(rule.recurrence, Recurrence::Daily { .. }) || matches(rule, date) {
        return Some(date);
    }
    next_occurrence(rule, date)
}

/// Every date in `[start, end]` on which the rule fires.
pub fn expected_occurrences(rule: &RecurrenceRule, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut day = start.max(rule.start_date);
    while day <= end {
        if matches(rule, day) {
            dates.push(day);
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    dates
}

/// Whether the rule fires on `date`.
pub fn matches(rule: &RecurrenceRule, date: NaiveDate) -> bool {
    if date < rule.start_date {
        return false;
    }
    match &rule.recurrence {
        Recurrence::Daily { interval } => {
            let days = (date - rule.start_date).num_days();
            *interval > 0 && days % i64::from(*interval) == 0
        }
        Recurrence::Weekly { days_of_week, .. } => days_of_week.contains(&date.weekday()),
        Recurrence::Monthly { days_of_month, .. } => days_of_month
            .iter()
            .filter_map(|day| resolve_month_day(date.year(), date.month(), *day))
            .any(|d| d == date),
    }
}

/// Map a rule's day value onto a concrete date in the given month.
///
/// Positive values clamp to the month's last day (31 in February is the 28th/29th).
/// Negative values count back from the end; values reaching before the 1st yield `None`.
pub fn resolve_month_day(year: i32, month: u32, day: i32) -> Option<NaiveDate> {
    let last = last_day_of_month(year, month)?;
    let resolved = match day {
        0 => return None,
        d if d < 0 => last as i32 + d + 1,
        d => d.min(last as i32),
    };
    if resolved < 1 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, resolved as u32)
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    next.pred_opt().map(|d| d.day())
}
