//! Consecutive-completion streaks.
//!
//! The walk starts at today and steps back one rule interval at a time (daily: n days,
//! weekly: 7n days, monthly: n months). Each expected date needs a completion on exactly
//! that date. Daily rules get one day of grace when anchoring: if today has no
//! completion yet but yesterday does, the streak is still alive and counts from yesterday.
//! Weekly and monthly rules get no grace.

use chrono::{DateTime, Days, FixedOffset, Months, NaiveDate};

use crate::models::{Recurrence, RecurrenceRule};

pub fn streak(completions: &[DateTime<FixedOffset>], rule: &RecurrenceRule, today: NaiveDate) -> u32 {
    // Civil dates as recorded, newest first, one per day.
    let mut dates: Vec<NaiveDate> = completions
        .iter()
        .map(|c| c.date_naive())
        .filter(|d| *d <= today)
        .collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates.dedup();

    let Some(&latest) = dates.first() else {
        return 0;
    };

    let is_daily = matches!(rule.recurrence, Recurrence::Daily { .. });
    let anchor = if latest == today {
        today
    } else if is_daily && today.pred_opt() == Some(latest) {
        latest
    } else {
        return 0;
    };

    let mut expected = anchor;
    let mut count = 0;
    for date in dates {
        if date > expected {
            // extra completion between two expected dates
            continue;
        }
        if date != expected {
            break;
        }
        count += 1;
        match step_back(rule, expected) {
            Some(prev) => expected = prev,
            None => break,
        }
    }
    count
}

fn step_back(rule: &RecurrenceRule, date: NaiveDate) -> Option<NaiveDate> {
    let interval = rule.recurrence.interval().max(1);
    match rule.recurrence {
        Recurrence::Daily { .. } => date.checked_sub_days(Days::new(u64::from(interval))),
        Recurrence::Weekly { .. } => date.checked_sub_days(Days::new(7 * u64::from(interval))),
        Recurrence::Monthly { .. } => date.checked_sub_months(Months::new(interval)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(d: NaiveDate, hour: u32) -> DateTime<FixedOffset> {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        offset
            .from_local_datetime(&d.and_hms_opt(hour, 0, 0).unwrap())
            .single()
            .unwrap()
    }

    fn days_back(today: NaiveDate, offsets: &[u64]) -> Vec<DateTime<FixedOffset>> {
        offsets
            .iter()
            .map(|o| at(today.checked_sub_days(Days::new(*o)).unwrap(), 9))
            .collect()
    }

    fn daily() -> RecurrenceRule {
        RecurrenceRule::new(Recurrence::Daily { interval: 1 }, date(2024, 1, 1))
    }

    #[test]
    fn five_consecutive_days() {
        let today = date(2024, 6, 10);
        let completions = days_back(today, &[0, 1, 2, 3, 4]);
        assert_eq!(streak(&completions, &daily(), today), 5);
    }

    #[test]
    fn gap_three_days_back_stops_the_count() {
        let today = date(2024, 6, 10);
        let completions = days_back(today, &[0, 1, 3, 4]);
        assert_eq!(streak(&completions, &daily(), today), 2);
    }

    #[test]
    fn order_of_input_does_not_matter() {
        let today = date(2024, 6, 10);
        let completions = days_back(today, &[3, 0, 2, 1]);
        assert_eq!(streak(&completions, &daily(), today), 4);
    }

    #[test]
    fn daily_streak_survives_until_today_is_done() {
        let today = date(2024, 6, 10);
        let completions = days_back(today, &[1, 2, 3]);
        assert_eq!(streak(&completions, &daily(), today), 3);
    }

    #[test]
    fn two_days_old_completion_is_a_broken_streak() {
        let today = date(2024, 6, 10);
        let completions = days_back(today, &[2, 3, 4]);
        assert_eq!(streak(&completions, &daily(), today), 0);
    }

    #[test]
    fn no_completions_no_streak() {
        assert_eq!(streak(&[], &daily(), date(2024, 6, 10)), 0);
    }

    #[test]
    fn duplicate_completions_on_one_day_count_once() {
        let today = date(2024, 6, 10);
        let mut completions = days_back(today, &[0, 1]);
        completions.push(at(today, 20));
        assert_eq!(streak(&completions, &daily(), today), 2);
    }

    #[test]
    fn late_evening_west_of_utc_stays_on_its_civil_day() {
        // 23:00 at UTC-5 is 04:00 UTC the next day; it must still count for the 10th.
        let today = date(2024, 6, 10);
        let completions = vec![at(today, 23), at(date(2024, 6, 9), 23)];
        assert_eq!(streak(&completions, &daily(), today), 2);
    }

    #[test]
    fn weekly_steps_back_whole_weeks_without_grace() {
        let rule = RecurrenceRule::new(
            Recurrence::Weekly { interval: 1, days_of_week: vec![Weekday::Mon] },
            date(2024, 1, 1),
        );
        let today = date(2024, 6, 10);
        let completions = days_back(today, &[0, 7, 14, 28]);
        assert_eq!(streak(&completions, &rule, today), 3);

        let yesterday_only = days_back(today, &[1, 8]);
        assert_eq!(streak(&yesterday_only, &rule, today), 0);
    }

    #[test]
    fn monthly_steps_back_by_months() {
        let rule = RecurrenceRule::new(
            Recurrence::Monthly { interval: 1, days_of_month: vec![15] },
            date(2024, 1, 1),
        );
        let today = date(2024, 6, 15);
        let completions = vec![
            at(date(2024, 6, 15), 8),
            at(date(2024, 5, 15), 8),
            at(date(2024, 4, 15), 8),
            at(date(2024, 2, 15), 8),
        ];
        assert_eq!(streak(&completions, &rule, today), 3);
    }

    #[test]
    fn every_other_day_rule() {
        let rule = RecurrenceRule::new(Recurrence::Daily { interval: 2 }, date(2024, 1, 1));
        let today = date(2024, 6, 10);
        let completions = days_back(today, &[0, 2, 4, 5, 8]);
        assert_eq!(streak(&completions, &rule, today), 3);
    }
}
