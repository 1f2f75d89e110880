use std::io::{self, Read};

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

use crate::cli::commands::ProjectCommands;
use crate::clock::Clock;
use crate::config::Config;
use crate::db::connection;
use crate::db::project_repo::{self, NewStep};
use crate::engine::StepProgression;
use crate::error::CadenceError;
use crate::models::{Priority, ProjectStatus};
use crate::output;

pub fn run(cmd: ProjectCommands, clock: &dyn Clock, json_output: bool) -> i32 {
    let result = match cmd {
        ProjectCommands::Load => run_load(clock, json_output),
        ProjectCommands::List => run_list(json_output),
        ProjectCommands::Show { reference } => run_show(&reference, json_output),
        ProjectCommands::Sync { reference } => run_sync(&reference, clock, json_output),
        ProjectCommands::Hold { reference } => run_set_status(&reference, ProjectStatus::OnHold, clock, json_output),
        ProjectCommands::Resume { reference } => {
            run_set_status(&reference, ProjectStatus::Active, clock, json_output)
        }
    };
    super::finish(result, json_output)
}

fn validate_project_name(name: &str) -> Result<(), CadenceError> {
    if !is_slug(name) {
        return Err(CadenceError::validation(
            "Project name must match ^[a-z0-9][a-z0-9-]*[a-z0-9]$ (or single char [a-z0-9])",
        ));
    }
    Ok(())
}

fn is_slug(name: &str) -> bool {
    let edge_ok = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    match (name.chars().next(), name.chars().last()) {
        (Some(first), Some(last)) => {
            edge_ok(first) && edge_ok(last) && name.chars().all(|c| edge_ok(c) || c == '-')
        }
        _ => false,
    }
}

// --- project load ---

#[derive(Deserialize)]
struct ProjectLoadInput {
    name: String,
    title: String,
    description: Option<String>,
    steps: Vec<StepInput>,
}

#[derive(Deserialize)]
struct StepInput {
    title: String,
    description: Option<String>,
    priority: Option<String>,
    due_date: Option<NaiveDate>,
    assigned_date: Option<NaiveDate>,
}

fn run_load(clock: &dyn Clock, json_output: bool) -> Result<i32, CadenceError> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| CadenceError::validation(e.to_string()))?;

    let project_input: ProjectLoadInput =
        serde_json::from_str(&input).map_err(|e| CadenceError::validation(format!("Invalid JSON: {e}")))?;

    validate_project_name(&project_input.name)?;
    let priorities = validate_load_input(&project_input)?;

    let config = Config::load()?;
    let conn = connection::open_db()?;

    if project_repo::find_project_by_name(&conn, &project_input.name)?.is_some() {
        return Err(CadenceError::project_name_conflict(&project_input.name));
    }

    let project_id = ulid::Ulid::new().to_string();

    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = (|| -> Result<_, CadenceError> {
        project_repo::create_project(
            &conn,
            &project_id,
            &config.user_id,
            &project_input.name,
            &project_input.title,
            project_input.description.as_deref(),
        )?;

        for (i, (step, priority)) in project_input.steps.iter().zip(&priorities).enumerate() {
            let step_id = ulid::Ulid::new().to_string();
            project_repo::create_step(
                &conn,
                &NewStep {
                    id: &step_id,
                    project_id: &project_id,
                    title: &step.title,
                    description: step.description.as_deref(),
                    order_number: i as i64 + 1,
                    priority: *priority,
                    due_date: step.due_date,
                    assigned_date: step.assigned_date,
                },
            )?;
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e);
        }
    }

    let project = StepProgression::new(&conn, clock).sync_project_steps(&project_id)?;
    let steps = project_repo::list_steps(&conn, &project_id)?;
    let first_task = steps.iter().find_map(|s| s.converted_task_id.clone());

    if json_output {
        output::json::print(&output::json::success(json!({
            "project": output::json::project_json(&project),
            "steps_created": steps.len(),
            "first_task": first_task
        })));
    } else {
        println!("Loaded project '{}' with {} steps.", project.name, steps.len());
        if let Some(task_id) = first_task {
            println!("First task: {task_id}");
        }
    }
    Ok(0)
}

/// Check the document before any write. Returns each step's priority.
fn validate_load_input(input: &ProjectLoadInput) -> Result<Vec<Priority>, CadenceError> {
    if input.title.trim().is_empty() {
        return Err(CadenceError::validation("Project title is required"));
    }
    if input.steps.is_empty() {
        return Err(CadenceError::validation("At least one step is required"));
    }

    input
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            if step.title.trim().is_empty() {
                return Err(CadenceError::validation(format!("Step {} has empty title", i + 1)));
            }
            match step.priority.as_deref() {
                None => Ok(Priority::Normal),
                Some(raw) => Priority::from_str(raw).ok_or_else(|| {
                    CadenceError::validation(format!("Step {} has unknown priority '{raw}'", i + 1))
                }),
            }
        })
        .collect()
}

fn run_list(json_output: bool) -> Result<i32, CadenceError> {
    let config = Config::load()?;
    let conn = connection::open_db()?;
    let projects = project_repo::list_projects(&conn, &config.user_id)?;

    if json_output {
        let projects_json: Vec<_> = projects.iter().map(output::json::project_json).collect();
        output::json::print(&output::json::success(json!({ "projects": projects_json })));
    } else {
        output::text::print_project_list(&projects);
    }
    Ok(0)
}

fn run_show(reference: &str, json_output: bool) -> Result<i32, CadenceError> {
    let conn = connection::open_db()?;
    let project = project_repo::resolve_project(&conn, reference)?;
    print_project_with_steps(&conn, &project.id, json_output)
}

fn run_sync(reference: &str, clock: &dyn Clock, json_output: bool) -> Result<i32, CadenceError> {
    let conn = connection::open_db()?;
    let project = project_repo::resolve_project(&conn, reference)?;
    StepProgression::new(&conn, clock).sync_project_steps(&project.id)?;
    print_project_with_steps(&conn, &project.id, json_output)
}

fn run_set_status(
    reference: &str,
    status: ProjectStatus,
    clock: &dyn Clock,
    json_output: bool,
) -> Result<i32, CadenceError> {
    let conn = connection::open_db()?;
    let project = project_repo::resolve_project(&conn, reference)?;
    StepProgression::new(&conn, clock).set_project_status(&project.id, status)?;
    print_project_with_steps(&conn, &project.id, json_output)
}

fn print_project_with_steps(conn: &Connection, project_id: &str, json_output: bool) -> Result<i32, CadenceError> {
    let project = project_repo::get_project_by_id(conn, project_id)?;
    let steps = project_repo::list_steps(conn, project_id)?;

    if json_output {
        let steps_json: Vec<_> = steps.iter().map(output::json::step_json).collect();
        output::json::print(&output::json::success(json!({
            "project": output::json::project_json(&project),
            "steps": steps_json
        })));
    } else {
        output::text::print_project(&project);
        println!("\nSteps:");
        output::text::print_steps(&steps);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_rules() {
        assert!(is_slug("a"));
        assert!(is_slug("q3-launch"));
        assert!(!is_slug(""));
        assert!(!is_slug("-launch"));
        assert!(!is_slug("launch-"));
        assert!(!is_slug("Launch"));
        assert!(!is_slug("big launch"));
    }

    #[test]
    fn load_input_rejects_unknown_priority() {
        let input: ProjectLoadInput = serde_json::from_str(
            r#"{"name":"x","title":"X","steps":[{"title":"a"},{"title":"b","priority":"urgent"}]}"#,
        )
        .unwrap();
        let err = validate_load_input(&input).unwrap_err();
        assert!(err.message.contains("Step 2"));
    }

    #[test]
    fn load_input_defaults_priority() {
        let input: ProjectLoadInput =
            serde_json::from_str(r#"{"name":"x","title":"X","steps":[{"title":"a","priority":"high"},{"title":"b"}]}"#)
                .unwrap();
        assert_eq!(validate_load_input(&input).unwrap(), vec![Priority::High, Priority::Normal]);
    }
}
