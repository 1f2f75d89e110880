//! Two-phase task records: a generic item row, then the task instance row.

use rusqlite::Connection;

use crate::db::{item_repo, task_repo};
use crate::error::CadenceError;
use crate::models::{NewTask, TaskInstance};

use super::rollback::{create_with_rollback, WriteStep};

/// The writes that materialize `task`, each with its compensator. Callers may append
/// further writes (linking a project step, for instance) before running them.
pub fn task_writes<'a>(conn: &'a Connection, task: &'a NewTask) -> Vec<WriteStep<'a>> {
    vec![
        WriteStep::new(
            "create item",
            move || item_repo::create_item(conn, &task.item_id, &task.user_id, &task.title),
            move || item_repo::delete_item(conn, &task.item_id),
        ),
        WriteStep::new(
            "create task instance",
            move || task_repo::insert_task(conn, task),
            move || task_repo::delete_task(conn, &task.id),
        ),
    ]
}

pub fn create_task_record(conn: &Connection, task: &NewTask) -> Result<TaskInstance, CadenceError> {
    create_with_rollback(task_writes(conn, task))?;
    task_repo::get_task_by_id(conn, &task.id)
}

/// Remove a task and its item, task row first.
pub fn delete_task_record(conn: &Connection, task: &TaskInstance) -> Result<(), CadenceError> {
    task_repo::delete_task(conn, &task.id)?;
    item_repo::delete_item(conn, &task.item_id)
}
