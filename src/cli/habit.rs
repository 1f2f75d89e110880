use chrono::{NaiveDate, NaiveTime};
use serde_json::json;

use crate::cli::commands::{Frequency, HabitCommands};
use crate::clock::Clock;
use crate::config::Config;
use crate::db::habit_repo::{self, NewHabit};
use crate::db::{connection, task_repo};
use crate::engine::{stats, HabitGenerator};
use crate::error::CadenceError;
use crate::models::{parse_month_days, parse_weekdays, Recurrence, RecurrenceRule};
use crate::output;
use crate::schedule::recurrence;

pub fn run(cmd: HabitCommands, clock: &dyn Clock, json_output: bool) -> i32 {
    let result = match cmd {
        HabitCommands::Add {
            title,
            every,
            interval,
            days,
            start,
            time,
            priority,
            description,
            checklist,
        } => {
            let spec = HabitSpec {
                title: &title,
                every,
                interval,
                days: days.as_deref(),
                start,
                time,
                priority: &priority,
                description: description.as_deref(),
                checklist: checklist.as_deref(),
            };
            run_add(&spec, clock, json_output)
        }
        HabitCommands::List => run_list(json_output),
        HabitCommands::Show { reference } => run_show(&reference, json_output),
        HabitCommands::Pause { reference } => run_set_active(&reference, false, clock, json_output),
        HabitCommands::Resume { reference } => run_set_active(&reference, true, clock, json_output),
        HabitCommands::Regenerate { reference } => run_regenerate(&reference, clock, json_output),
        HabitCommands::Delete { reference } => run_delete(&reference, clock, json_output),
        HabitCommands::Stats { reference, window } => run_stats(&reference, window, clock, json_output),
    };
    super::finish(result, json_output)
}

struct HabitSpec<'a> {
    title: &'a str,
    every: Frequency,
    interval: u32,
    days: Option<&'a str>,
    start: Option<NaiveDate>,
    time: Option<NaiveTime>,
    priority: &'a str,
    description: Option<&'a str>,
    checklist: Option<&'a str>,
}

fn build_rule(spec: &HabitSpec<'_>, today: NaiveDate) -> Result<RecurrenceRule, CadenceError> {
    let interval = spec.interval;
    let recurrence = match spec.every {
        Frequency::Daily => Recurrence::Daily { interval },
        Frequency::Weekly => {
            let days = spec
                .days
                .ok_or_else(|| CadenceError::invalid_rule("Weekly habits need --days (e.g. mon,thu)"))?;
            Recurrence::Weekly { interval, days_of_week: parse_weekdays(days)? }
        }
        Frequency::Monthly => {
            let days = spec
                .days
                .ok_or_else(|| CadenceError::invalid_rule("Monthly habits need --days (e.g. 1,15,-1)"))?;
            Recurrence::Monthly { interval, days_of_month: parse_month_days(days)? }
        }
    };
    let mut rule = RecurrenceRule::new(recurrence, spec.start.unwrap_or(today));
    rule.time_of_day = spec.time;
    rule.validate()?;
    rule.normalize();
    Ok(rule)
}

fn run_add(spec: &HabitSpec<'_>, clock: &dyn Clock, json_output: bool) -> Result<i32, CadenceError> {
    if spec.title.trim().is_empty() {
        return Err(CadenceError::validation("Habit title must not be empty"));
    }
    let priority = super::parse_priority(spec.priority)?;
    let rule = build_rule(spec, clock.today())?;
    let config = Config::load()?;
    let conn = connection::open_db()?;

    let id = ulid::Ulid::new().to_string();
    let habit = habit_repo::create_habit(
        &conn,
        &NewHabit {
            id: &id,
            user_id: &config.user_id,
            title: spec.title,
            description: spec.description,
            priority,
            checklist_template_id: spec.checklist,
            rule: &rule,
        },
    )?;

    let first = match recurrence::occurrence_on_or_after(&habit.rule, clock.today()) {
        Some(date) => HabitGenerator::new(&conn, clock).generate_next_task(&habit, date, true)?,
        None => None,
    };

    if json_output {
        output::json::print(&output::json::success(json!({
            "habit": output::json::habit_json(&habit),
            "instance": first.as_ref().map(output::json::task_summary)
        })));
    } else {
        println!("Created habit: {} ({})", habit.title, habit.id);
        println!("  {}", output::text::describe_rule(&habit.rule));
        if let Some(task) = &first {
            println!("  First instance: {}", task.assigned_date.map(|d| d.to_string()).unwrap_or_default());
        }
    }
    Ok(0)
}

fn run_list(json_output: bool) -> Result<i32, CadenceError> {
    let config = Config::load()?;
    let conn = connection::open_db()?;
    let habits = habit_repo::list_habits(&conn, &config.user_id)?;

    if json_output {
        let habits_json: Vec<_> = habits.iter().map(output::json::habit_json).collect();
        output::json::print(&output::json::success(json!({ "habits": habits_json })));
    } else {
        output::text::print_habit_list(&habits);
    }
    Ok(0)
}

fn run_show(reference: &str, json_output: bool) -> Result<i32, CadenceError> {
    let conn = connection::open_db()?;
    let habit = habit_repo::resolve_habit(&conn, reference)?;
    let open = task_repo::list_open_for_habit(&conn, &habit.id)?;

    if json_output {
        let open_json: Vec<_> = open.iter().map(output::json::task_summary).collect();
        output::json::print(&output::json::success(json!({
            "habit": output::json::habit_json(&habit),
            "open_instances": open_json
        })));
    } else {
        output::text::print_habit(&habit);
        println!("\nOpen:");
        output::text::print_task_list(&open);
    }
    Ok(0)
}

fn run_set_active(reference: &str, active: bool, clock: &dyn Clock, json_output: bool) -> Result<i32, CadenceError> {
    let conn = connection::open_db()?;
    let habit = habit_repo::resolve_habit(&conn, reference)?;
    let habit = HabitGenerator::new(&conn, clock).set_active(&habit.id, active)?;
    let open = task_repo::list_open_for_habit(&conn, &habit.id)?;

    if json_output {
        let open_json: Vec<_> = open.iter().map(output::json::task_summary).collect();
        output::json::print(&output::json::success(json!({
            "habit": output::json::habit_json(&habit),
            "open_instances": open_json
        })));
    } else {
        let verb = if active { "Resumed" } else { "Paused" };
        println!("{verb} habit: {} ({})", habit.title, habit.id);
    }
    Ok(0)
}

fn run_regenerate(reference: &str, clock: &dyn Clock, json_output: bool) -> Result<i32, CadenceError> {
    let conn = connection::open_db()?;
    let habit = habit_repo::resolve_habit(&conn, reference)?;
    if !habit.is_active {
        return Err(CadenceError::validation(format!(
            "Habit '{}' is paused; resume it instead",
            habit.title
        )));
    }
    let instance = HabitGenerator::new(&conn, clock).regenerate(&habit)?;

    if json_output {
        output::json::print(&output::json::success(json!({
            "habit": { "id": habit.id, "title": habit.title },
            "instance": instance.as_ref().map(output::json::task_summary)
        })));
    } else {
        match instance.and_then(|t| t.assigned_date) {
            Some(date) => println!("Regenerated {}: next instance on {date}", habit.title),
            None => println!("Regenerated {}: no upcoming occurrence", habit.title),
        }
    }
    Ok(0)
}

fn run_delete(reference: &str, clock: &dyn Clock, json_output: bool) -> Result<i32, CadenceError> {
    let conn = connection::open_db()?;
    let habit = habit_repo::resolve_habit(&conn, reference)?;
    let removed = HabitGenerator::new(&conn, clock).delete_habit(&habit.id)?;

    if json_output {
        output::json::print(&output::json::success(json!({
            "deleted": { "id": habit.id, "title": habit.title },
            "instances_removed": removed
        })));
    } else {
        println!("Deleted habit: {} ({}), {removed} instances removed", habit.title, habit.id);
    }
    Ok(0)
}

fn run_stats(reference: &str, window: Option<u32>, clock: &dyn Clock, json_output: bool) -> Result<i32, CadenceError> {
    let config = Config::load()?;
    let conn = connection::open_db()?;
    let habit = habit_repo::resolve_habit(&conn, reference)?;
    let window = window.unwrap_or(config.stats_window_days);
    let rate = stats::completion_rate(&conn, clock, &habit.id, window)?;
    let streak = stats::streak(&conn, clock, &habit.id)?;

    if json_output {
        output::json::print(&output::json::success(json!({
            "habit": { "id": habit.id, "title": habit.title },
            "completion": output::json::rate_json(&rate),
            "streak": streak
        })));
    } else {
        println!("Habit: {} ({})", habit.title, habit.id);
        output::text::print_rate(&rate, streak);
    }
    Ok(0)
}
