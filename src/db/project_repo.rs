use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{CadenceError, ErrorCode};
use crate::models::{Priority, Project, ProjectStatus, ProjectStep, StepStatus};

const PROJECT_COLUMNS: &str = "id, user_id, name, title, description, status, progress,
    current_step, created_at, updated_at";

const STEP_COLUMNS: &str = "id, project_id, title, description, order_number, status, priority,
    due_date, assigned_date, is_converted, converted_task_id, completed_at";

pub fn create_project(
    conn: &Connection,
    id: &str,
    user_id: &str,
    name: &str,
    title: &str,
    description: Option<&str>,
) -> Result<Project, CadenceError> {
    if find_project_by_name(conn, name)?.is_some() {
        return Err(CadenceError::project_name_conflict(name));
    }

    conn.execute(
        "INSERT INTO projects (id, user_id, name, title, description) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, user_id, name, title, description],
    )?;

    get_project_by_id(conn, id)
}

pub fn get_project_by_id(conn: &Connection, id: &str) -> Result<Project, CadenceError> {
    conn.query_row(
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
        params![id],
        row_to_project,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => CadenceError::project_not_found(id),
        _ => CadenceError::from(e),
    })
}

pub fn find_project_by_name(conn: &Connection, name: &str) -> Result<Option<Project>, CadenceError> {
    let project = conn
        .query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE name = ?1"),
            params![name],
            row_to_project,
        )
        .optional()?;
    Ok(project)
}

/// Resolve a project reference: exact name → ID prefix → name partial match.
pub fn resolve_project(conn: &Connection, reference: &str) -> Result<Project, CadenceError> {
    if let Some(project) = find_project_by_name(conn, reference)? {
        return Ok(project);
    }

    let by_prefix = query_projects(
        conn,
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id LIKE ?1"),
        &format!("{reference}%"),
    )?;
    if !by_prefix.is_empty() {
        return single_match(reference, by_prefix);
    }

    let by_name = query_projects(
        conn,
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE name LIKE ?1"),
        &format!("%{reference}%"),
    )?;
    single_match(reference, by_name)
}

pub fn list_projects(conn: &Connection, user_id: &str) -> Result<Vec<Project>, CadenceError> {
    query_projects(
        conn,
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE user_id = ?1 ORDER BY created_at DESC"),
        user_id,
    )
}

pub fn update_project_status(conn: &Connection, id: &str, status: ProjectStatus) -> Result<(), CadenceError> {
    let changed = conn.execute(
        "UPDATE projects SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    if changed == 0 {
        return Err(CadenceError::project_not_found(id));
    }
    Ok(())
}

pub fn update_project_progress(conn: &Connection, id: &str, progress: i64) -> Result<(), CadenceError> {
    let changed = conn.execute(
        "UPDATE projects SET progress = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![progress.clamp(0, 100), id],
    )?;
    if changed == 0 {
        return Err(CadenceError::project_not_found(id));
    }
    Ok(())
}

pub fn set_current_step(conn: &Connection, id: &str, order_number: Option<i64>) -> Result<(), CadenceError> {
    conn.execute(
        "UPDATE projects SET current_step = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![order_number, id],
    )?;
    Ok(())
}

// --- steps ---

pub struct NewStep<'a> {
    pub id: &'a str,
    pub project_id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub order_number: i64,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub assigned_date: Option<NaiveDate>,
}

pub fn create_step(conn: &Connection, step: &NewStep<'_>) -> Result<(), CadenceError> {
    conn.execute(
        "INSERT INTO project_steps (id, project_id, title, description, order_number, priority,
                due_date, assigned_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            step.id,
            step.project_id,
            step.title,
            step.description,
            step.order_number,
            step.priority.as_str(),
            step.due_date,
            step.assigned_date,
        ],
    )?;
    Ok(())
}

/// Steps of a project in `order_number` order.
pub fn list_steps(conn: &Connection, project_id: &str) -> Result<Vec<ProjectStep>, CadenceError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STEP_COLUMNS} FROM project_steps WHERE project_id = ?1 ORDER BY order_number ASC"
    ))?;
    let steps = stmt
        .query_map(params![project_id], row_to_step)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(steps)
}

pub fn get_step_by_id(conn: &Connection, id: &str) -> Result<ProjectStep, CadenceError> {
    conn.query_row(
        &format!("SELECT {STEP_COLUMNS} FROM project_steps WHERE id = ?1"),
        params![id],
        row_to_step,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            CadenceError::new(ErrorCode::StepNotFound, format!("Step not found: {id}"))
        }
        _ => CadenceError::from(e),
    })
}

/// The step whose converted task is `task_id`, if any.
pub fn find_step_by_task(conn: &Connection, task_id: &str) -> Result<Option<ProjectStep>, CadenceError> {
    let step = conn
        .query_row(
            &format!("SELECT {STEP_COLUMNS} FROM project_steps WHERE converted_task_id = ?1"),
            params![task_id],
            row_to_step,
        )
        .optional()?;
    Ok(step)
}

pub fn mark_step_converted(
    conn: &Connection,
    step_id: &str,
    task_id: &str,
    status: StepStatus,
) -> Result<(), CadenceError> {
    conn.execute(
        "UPDATE project_steps SET is_converted = 1, converted_task_id = ?1, status = ?2 WHERE id = ?3",
        params![task_id, status.as_str(), step_id],
    )?;
    Ok(())
}

/// Forget the step's task; the status is left alone.
pub fn reset_step_conversion(conn: &Connection, step_id: &str) -> Result<(), CadenceError> {
    conn.execute(
        "UPDATE project_steps SET is_converted = 0, converted_task_id = NULL WHERE id = ?1",
        params![step_id],
    )?;
    Ok(())
}

pub fn update_step_status(
    conn: &Connection,
    step_id: &str,
    status: StepStatus,
    completed_at: Option<&str>,
) -> Result<(), CadenceError> {
    conn.execute(
        "UPDATE project_steps SET status = ?1, completed_at = ?2 WHERE id = ?3",
        params![status.as_str(), completed_at, step_id],
    )?;
    Ok(())
}

/// Put a step's mutable columns back to a previously read snapshot.
pub fn restore_step(conn: &Connection, snapshot: &ProjectStep) -> Result<(), CadenceError> {
    conn.execute(
        "UPDATE project_steps
         SET status = ?1, completed_at = ?2, is_converted = ?3, converted_task_id = ?4
         WHERE id = ?5",
        params![
            snapshot.status.as_str(),
            snapshot.completed_at,
            snapshot.is_converted,
            snapshot.converted_task_id,
            snapshot.id,
        ],
    )?;
    Ok(())
}

fn query_projects(conn: &Connection, sql: &str, arg: &str) -> Result<Vec<Project>, CadenceError> {
    let mut stmt = conn.prepare(sql)?;
    let projects = stmt
        .query_map(params![arg], row_to_project)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(projects)
}

fn single_match(reference: &str, mut projects: Vec<Project>) -> Result<Project, CadenceError> {
    match projects.len() {
        0 => Err(CadenceError::project_not_found(reference)),
        1 => Ok(projects.remove(0)),
        _ => {
            let candidates: Vec<String> = projects.iter().map(|p| format!("{} ({})", p.name, p.id)).collect();
            Err(CadenceError::ambiguous_ref(reference, &candidates))
        }
    }
}

fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        status: ProjectStatus::from_str(&row.get::<_, String>(5)?).unwrap_or(ProjectStatus::Active),
        progress: row.get(6)?,
        current_step: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn row_to_step(row: &rusqlite::Row) -> rusqlite::Result<ProjectStep> {
    Ok(ProjectStep {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        order_number: row.get(4)?,
        status: StepStatus::from_str(&row.get::<_, String>(5)?).unwrap_or(StepStatus::Pending),
        priority: Priority::from_str(&row.get::<_, String>(6)?).unwrap_or(Priority::Normal),
        due_date: row.get(7)?,
        assigned_date: row.get(8)?,
        is_converted: row.get(9)?,
        converted_task_id: row.get(10)?,
        completed_at: row.get(11)?,
    })
}
