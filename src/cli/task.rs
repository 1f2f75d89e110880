use chrono::NaiveDate;
use serde_json::json;

use crate::cli::commands::TaskCommands;
use crate::clock::Clock;
use crate::config::Config;
use crate::db::{connection, task_repo};
use crate::engine::{TaskEvents, TaskUpdate};
use crate::error::CadenceError;
use crate::output;

pub fn run(cmd: TaskCommands, clock: &dyn Clock, json_output: bool) -> i32 {
    let result = match cmd {
        TaskCommands::Add { title, date, priority } => run_add(&title, date, &priority, clock, json_output),
        TaskCommands::List { date } => run_list(date, json_output),
        TaskCommands::Show { id } => run_show(&id, json_output),
        TaskCommands::Start { id } => run_start(&id, clock, json_output),
        TaskCommands::Done { id } => run_done(&id, clock, json_output),
        TaskCommands::Undo { id } => run_undo(&id, clock, json_output),
        TaskCommands::Delete { id } => run_delete(&id, clock, json_output),
    };
    super::finish(result, json_output)
}

fn run_add(
    title: &str,
    date: Option<NaiveDate>,
    priority: &str,
    clock: &dyn Clock,
    json_output: bool,
) -> Result<i32, CadenceError> {
    let priority = super::parse_priority(priority)?;
    let config = Config::load()?;
    let conn = connection::open_db()?;
    let task = TaskEvents::new(&conn, clock).add_task(&config.user_id, title, date, priority)?;

    if json_output {
        output::json::print(&output::json::success(output::json::task_json(&task)));
    } else {
        println!("Added task: {} ({})", task.title, task.id);
    }
    Ok(0)
}

fn run_list(date: Option<NaiveDate>, json_output: bool) -> Result<i32, CadenceError> {
    let config = Config::load()?;
    let conn = connection::open_db()?;
    let tasks = task_repo::list_tasks(&conn, &config.user_id, date)?;

    if json_output {
        let tasks_json: Vec<_> = tasks.iter().map(output::json::task_summary).collect();
        output::json::print(&output::json::success(json!({ "tasks": tasks_json })));
    } else {
        output::text::print_task_list(&tasks);
    }
    Ok(0)
}

fn run_show(id: &str, json_output: bool) -> Result<i32, CadenceError> {
    let conn = connection::open_db()?;
    let task = task_repo::resolve_task(&conn, id)?;

    if json_output {
        output::json::print(&output::json::success(output::json::task_json(&task)));
    } else {
        output::text::print_task(&task);
    }
    Ok(0)
}

fn run_start(id: &str, clock: &dyn Clock, json_output: bool) -> Result<i32, CadenceError> {
    let conn = connection::open_db()?;
    let task = task_repo::resolve_task(&conn, id)?;
    let task = TaskEvents::new(&conn, clock).start_task(&task.id)?;

    if json_output {
        output::json::print(&output::json::success(output::json::task_json(&task)));
    } else {
        println!("Started: {} ({})", task.title, task.id);
    }
    Ok(0)
}

fn run_done(id: &str, clock: &dyn Clock, json_output: bool) -> Result<i32, CadenceError> {
    let conn = connection::open_db()?;
    let task = task_repo::resolve_task(&conn, id)?;
    let update = TaskEvents::new(&conn, clock).complete_task(&task.id)?;
    print_update("Completed", &update, json_output);
    Ok(0)
}

fn run_undo(id: &str, clock: &dyn Clock, json_output: bool) -> Result<i32, CadenceError> {
    let conn = connection::open_db()?;
    let task = task_repo::resolve_task(&conn, id)?;
    let update = TaskEvents::new(&conn, clock).uncomplete_task(&task.id)?;
    print_update("Reopened", &update, json_output);
    Ok(0)
}

fn run_delete(id: &str, clock: &dyn Clock, json_output: bool) -> Result<i32, CadenceError> {
    let conn = connection::open_db()?;
    let task = task_repo::resolve_task(&conn, id)?;
    let project = TaskEvents::new(&conn, clock).delete_task(&task.id)?;

    if json_output {
        let mut data = json!({ "deleted": { "id": task.id, "title": task.title } });
        if let Some(ref p) = project {
            data["project"] = output::json::project_json(p);
        }
        output::json::print(&output::json::success(data));
    } else {
        println!("Deleted task: {} ({})", task.title, task.id);
    }
    Ok(0)
}

fn print_update(verb: &str, update: &TaskUpdate, json_output: bool) {
    if json_output {
        let mut data = json!({ "task": output::json::task_json(&update.task) });
        if let Some(ref next) = update.next_instance {
            data["next_instance"] = output::json::task_summary(next);
        }
        if let Some(ref p) = update.project {
            data["project"] = output::json::project_json(p);
        }
        output::json::print(&output::json::success(data));
        return;
    }

    println!("{verb}: {} ({})", update.task.title, update.task.id);
    if let Some(date) = update.next_instance.as_ref().and_then(|t| t.assigned_date) {
        println!("  Next: {date}");
    }
    if let Some(ref p) = update.project {
        println!("  Project {}: {} {}%", p.name, p.status.as_str(), p.progress);
    }
}
