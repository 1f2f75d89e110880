use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::CadenceError;
use crate::models::{NewTask, Priority, SourceRef, TaskInstance, TaskStatus};

const TASK_COLUMNS: &str = "id, item_id, title, description, status, priority, assigned_date,
    due_date, reminder_time, habit_id, project_id, checklist_template_id,
    created_at, updated_at, completed_at";

/// Phase two of task creation. The item row must already exist.
pub fn insert_task(conn: &Connection, task: &NewTask) -> Result<(), CadenceError> {
    conn.execute(
        "INSERT INTO task_instances (id, item_id, title, description, status, priority,
                assigned_date, due_date, reminder_time, habit_id, project_id, checklist_template_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            task.id,
            task.item_id,
            task.title,
            task.description,
            task.status.as_str(),
            task.priority.as_str(),
            task.assigned_date,
            task.due_date,
            task.reminder_time,
            task.source.habit_id(),
            task.source.project_id(),
            task.checklist_template_id,
        ],
    )?;
    Ok(())
}

pub fn get_task_by_id(conn: &Connection, id: &str) -> Result<TaskInstance, CadenceError> {
    find_task(conn, id)?.ok_or_else(|| CadenceError::task_not_found(id))
}

/// Like `get_task_by_id`, but a missing row is `None` rather than an error.
pub fn find_task(conn: &Connection, id: &str) -> Result<Option<TaskInstance>, CadenceError> {
    let task = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM task_instances WHERE id = ?1"),
            params![id],
            row_to_task,
        )
        .optional()?;
    Ok(task)
}

/// Batch lookup; ids that do not exist are simply absent from the result.
pub fn get_tasks_by_ids(conn: &Connection, ids: &[String]) -> Result<Vec<TaskInstance>, CadenceError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM task_instances WHERE id IN ({placeholders})"
    ))?;
    let tasks = stmt
        .query_map(params_from_iter(ids.iter()), row_to_task)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

/// Resolve a task by exact id or unique id prefix.
pub fn resolve_task(conn: &Connection, reference: &str) -> Result<TaskInstance, CadenceError> {
    if let Some(task) = find_task(conn, reference)? {
        return Ok(task);
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM task_instances WHERE id LIKE ?1"
    ))?;
    let prefix = format!("{reference}%");
    let mut tasks: Vec<TaskInstance> = stmt
        .query_map(params![prefix], row_to_task)?
        .collect::<Result<Vec<_>, _>>()?;

    match tasks.len() {
        0 => Err(CadenceError::task_not_found(reference)),
        1 => Ok(tasks.remove(0)),
        _ => {
            let candidates: Vec<String> = tasks.iter().map(|t| format!("{} ({})", t.title, t.id)).collect();
            Err(CadenceError::ambiguous_ref(reference, &candidates))
        }
    }
}

/// Open (non-completed) instances of a habit, oldest date first.
pub fn list_open_for_habit(conn: &Connection, habit_id: &str) -> Result<Vec<TaskInstance>, CadenceError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM task_instances
         WHERE habit_id = ?1 AND status != 'completed'
         ORDER BY assigned_date ASC"
    ))?;
    let tasks = stmt
        .query_map(params![habit_id], row_to_task)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

pub fn find_open_for_habit_on(
    conn: &Connection,
    habit_id: &str,
    date: NaiveDate,
) -> Result<Option<TaskInstance>, CadenceError> {
    let task = conn
        .query_row(
            &format!(
                "SELECT {TASK_COLUMNS} FROM task_instances
                 WHERE habit_id = ?1 AND assigned_date = ?2 AND status != 'completed'"
            ),
            params![habit_id, date],
            row_to_task,
        )
        .optional()?;
    Ok(task)
}

pub fn list_for_habit(conn: &Connection, habit_id: &str) -> Result<Vec<TaskInstance>, CadenceError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM task_instances WHERE habit_id = ?1 ORDER BY assigned_date ASC"
    ))?;
    let tasks = stmt
        .query_map(params![habit_id], row_to_task)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

pub fn list_for_project(conn: &Connection, project_id: &str) -> Result<Vec<TaskInstance>, CadenceError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM task_instances WHERE project_id = ?1 ORDER BY created_at ASC"
    ))?;
    let tasks = stmt
        .query_map(params![project_id], row_to_task)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

/// All tasks owned by a user, optionally limited to one assigned date.
pub fn list_tasks(
    conn: &Connection,
    user_id: &str,
    date: Option<NaiveDate>,
) -> Result<Vec<TaskInstance>, CadenceError> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.item_id, t.title, t.description, t.status, t.priority, t.assigned_date,
                t.due_date, t.reminder_time, t.habit_id, t.project_id, t.checklist_template_id,
                t.created_at, t.updated_at, t.completed_at
         FROM task_instances t
         JOIN items i ON i.id = t.item_id
         WHERE i.user_id = ?1 AND (?2 IS NULL OR t.assigned_date = ?2)
         ORDER BY t.assigned_date IS NULL, t.assigned_date ASC, t.created_at ASC",
    )?;
    let tasks = stmt
        .query_map(params![user_id, date], row_to_task)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

pub fn update_task_status(conn: &Connection, id: &str, status: TaskStatus) -> Result<(), CadenceError> {
    let completed_clause = match status {
        TaskStatus::Completed => "completed_at = COALESCE(completed_at, datetime('now')),",
        _ => "completed_at = NULL,",
    };
    let sql = format!(
        "UPDATE task_instances SET status = ?1, {completed_clause}
         updated_at = datetime('now')
         WHERE id = ?2"
    );
    let changed = conn.execute(&sql, params![status.as_str(), id])?;
    if changed == 0 {
        return Err(CadenceError::task_not_found(id));
    }
    Ok(())
}

/// Delete the task row only; the caller owns the matching item row.
pub fn delete_task(conn: &Connection, id: &str) -> Result<(), CadenceError> {
    let changed = conn.execute("DELETE FROM task_instances WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(CadenceError::task_not_found(id));
    }
    Ok(())
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<TaskInstance> {
    Ok(TaskInstance {
        id: row.get(0)?,
        item_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: TaskStatus::from_str(&row.get::<_, String>(4)?).unwrap_or(TaskStatus::OnDeck),
        priority: Priority::from_str(&row.get::<_, String>(5)?).unwrap_or(Priority::Normal),
        assigned_date: row.get(6)?,
        due_date: row.get(7)?,
        reminder_time: row.get(8)?,
        source: SourceRef::from_columns(row.get(9)?, row.get(10)?),
        checklist_template_id: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        completed_at: row.get(14)?,
    })
}
