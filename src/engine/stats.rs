use chrono::{Days, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

use crate::clock::Clock;
use crate::db::{completion_repo, habit_repo};
use crate::error::CadenceError;
use crate::schedule::{recurrence, streak as streak_calc};

#[derive(Debug, Clone, Serialize)]
pub struct CompletionRate {
    /// `completed / expected`. Can exceed 1.0 when extra instances were completed.
    pub rate: f64,
    pub completed: usize,
    pub expected: usize,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
}

/// Completion rate over the `window_days` days ending today.
pub fn completion_rate(
    conn: &Connection,
    clock: &dyn Clock,
    habit_id: &str,
    window_days: u32,
) -> Result<CompletionRate, CadenceError> {
    if window_days == 0 {
        return Err(CadenceError::validation("Stats window must be at least one day"));
    }
    let habit = habit_repo::get_habit_by_id(conn, habit_id)?;
    let window_end = clock.today();
    let window_start = window_end
        .checked_sub_days(Days::new(u64::from(window_days - 1)))
        .unwrap_or(NaiveDate::MIN);

    let expected = recurrence::expected_occurrences(&habit.rule, window_start, window_end).len();
    let completed = completion_repo::list_completions(conn, habit_id)?
        .iter()
        .map(|c| c.completed_at.date_naive())
        .filter(|d| (window_start..=window_end).contains(d))
        .count();

    let rate = if expected == 0 {
        0.0
    } else {
        completed as f64 / expected as f64
    };

    Ok(CompletionRate {
        rate,
        completed,
        expected,
        window_start,
        window_end,
    })
}

/// Current streak of a stored habit as of today.
pub fn streak(conn: &Connection, clock: &dyn Clock, habit_id: &str) -> Result<u32, CadenceError> {
    let habit = habit_repo::get_habit_by_id(conn, habit_id)?;
    let completions: Vec<_> = completion_repo::list_completions(conn, habit_id)?
        .into_iter()
        .map(|c| c.completed_at)
        .collect();
    Ok(streak_calc::streak(&completions, &habit.rule, clock.today()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    use crate::clock::FixedClock;
    use crate::db::connection;
    use crate::db::habit_repo::NewHabit;
    use crate::error::ErrorCode;
    use crate::models::{Priority, Recurrence, RecurrenceRule};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup(conn: &Connection) {
        let rule = RecurrenceRule::new(Recurrence::Daily { interval: 1 }, date(2024, 1, 1));
        habit_repo::create_habit(
            conn,
            &NewHabit {
                id: "h1",
                user_id: "u1",
                title: "Walk",
                description: None,
                priority: Priority::Normal,
                checklist_template_id: None,
                rule: &rule,
            },
        )
        .unwrap();
    }

    fn complete_on(conn: &Connection, d: NaiveDate, hour: u32) {
        let offset = FixedOffset::east_opt(0).unwrap();
        let at = offset.from_local_datetime(&d.and_hms_opt(hour, 0, 0).unwrap()).unwrap();
        completion_repo::record_completion(conn, "h1", at).unwrap();
    }

    #[test]
    fn rate_above_one_is_not_clamped() {
        let conn = connection::open_in_memory().unwrap();
        setup(&conn);
        let clock = FixedClock::on(date(2024, 3, 10));

        // 10 expected days (Mar 1..=10), 12 completions: two days done twice.
        for day in 1..=10 {
            complete_on(&conn, date(2024, 3, day), 8);
        }
        complete_on(&conn, date(2024, 3, 4), 20);
        complete_on(&conn, date(2024, 3, 7), 20);

        let stats = completion_rate(&conn, &clock, "h1", 10).unwrap();
        assert_eq!(stats.expected, 10);
        assert_eq!(stats.completed, 12);
        assert!((stats.rate - 1.2).abs() < 1e-9);
        assert_eq!(stats.window_start, date(2024, 3, 1));
    }

    #[test]
    fn completions_outside_the_window_are_ignored() {
        let conn = connection::open_in_memory().unwrap();
        setup(&conn);
        let clock = FixedClock::on(date(2024, 3, 10));
        complete_on(&conn, date(2024, 2, 1), 8);
        complete_on(&conn, date(2024, 3, 9), 8);

        let stats = completion_rate(&conn, &clock, "h1", 7).unwrap();
        assert_eq!(stats.expected, 7);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn zero_window_is_rejected() {
        let conn = connection::open_in_memory().unwrap();
        setup(&conn);
        let clock = FixedClock::on(date(2024, 3, 10));
        let err = completion_rate(&conn, &clock, "h1", 0).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[test]
    fn streak_reads_stored_completions() {
        let conn = connection::open_in_memory().unwrap();
        setup(&conn);
        let clock = FixedClock::on(date(2024, 3, 10));
        for day in 6..=9 {
            complete_on(&conn, date(2024, 3, day), 12);
        }
        // today not done yet: yesterday keeps it alive
        assert_eq!(streak(&conn, &clock, "h1").unwrap(), 4);
    }

    #[test]
    fn unknown_habit_is_not_found() {
        let conn = connection::open_in_memory().unwrap();
        let clock = FixedClock::on(date(2024, 3, 10));
        let err = streak(&conn, &clock, "nope").unwrap_err();
        assert_eq!(err.code, ErrorCode::HabitNotFound);
    }
}
