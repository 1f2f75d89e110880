//! Project step state machine.
//!
//! A step moves `pending/unconverted -> in_progress/converted -> completed/converted`.
//! At most one step (the frontier) should have an open task at a time; the task
//! event handlers advance the frontier and `sync_project_steps` repairs it when the
//! linked records drift apart.

use std::collections::HashMap;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::db::{project_repo, task_repo};
use crate::error::CadenceError;
use crate::models::{
    progress_percent, NewTask, Project, ProjectStatus, ProjectStep, SourceRef, StepStatus, TaskStatus,
};

use super::materialize;
use super::rollback::{create_with_rollback, WriteStep};

pub struct StepProgression<'a> {
    conn: &'a Connection,
    clock: &'a dyn Clock,
}

impl<'a> StepProgression<'a> {
    pub fn new(conn: &'a Connection, clock: &'a dyn Clock) -> Self {
        Self { conn, clock }
    }

    /// Materialize the task for a step and link it. Returns the task id. A step whose
    /// linked task still exists is returned as is.
    pub fn create_task_for_step(&self, step: &ProjectStep, project_id: &str) -> Result<String, CadenceError> {
        if step.is_converted {
            if let Some(task_id) = &step.converted_task_id {
                if task_repo::find_task(self.conn, task_id)?.is_some() {
                    debug!(step_id = %step.id, %task_id, "step already has a task");
                    return Ok(task_id.clone());
                }
            }
        }

        let project = project_repo::get_project_by_id(self.conn, project_id)?;
        let mut task = NewTask::new(
            &project.user_id,
            &step.title,
            TaskStatus::OnDeck,
            SourceRef::Project(project.id.clone()),
        );
        task.description = step.description.clone();
        task.priority = step.priority;
        task.due_date = step.due_date;
        task.assigned_date = step.assigned_date;

        let status = match step.status {
            StepStatus::Pending => StepStatus::InProgress,
            other => other,
        };

        let mut writes = materialize::task_writes(self.conn, &task);
        writes.push(WriteStep::new(
            "link step",
            || project_repo::mark_step_converted(self.conn, &step.id, &task.id, status),
            || project_repo::restore_step(self.conn, step),
        ));
        writes.push(WriteStep::last("set current step", || {
            project_repo::set_current_step(self.conn, project_id, Some(step.order_number))
        }));
        create_with_rollback(writes)?;

        info!(
            project_id,
            step_id = %step.id,
            order = step.order_number,
            task_id = %task.id,
            "step converted to task"
        );
        Ok(task.id)
    }

    /// The step linked to `task_id` is done: complete it and move the frontier on.
    pub fn handle_task_completion(&self, task_id: &str, project_id: &str) -> Result<Project, CadenceError> {
        let step = self.step_for_task(task_id)?;
        if step.project_id != project_id {
            return Err(CadenceError::validation(format!(
                "Task {task_id} belongs to project {}, not {project_id}",
                step.project_id
            )));
        }
        let project = project_repo::get_project_by_id(self.conn, project_id)?;

        if step.status == StepStatus::Completed {
            debug!(step_id = %step.id, "step already completed");
        } else {
            let completed_at = self.clock.now().to_rfc3339();
            create_with_rollback(vec![
                WriteStep::new(
                    "complete step",
                    || {
                        project_repo::update_step_status(
                            self.conn,
                            &step.id,
                            StepStatus::Completed,
                            Some(&completed_at),
                        )
                    },
                    || project_repo::restore_step(self.conn, &step),
                ),
                WriteStep::last("advance project", || self.advance_after(&project, &step)),
            ])?;
        }

        project_repo::get_project_by_id(self.conn, project_id)
    }

    fn advance_after(&self, project: &Project, completed: &ProjectStep) -> Result<(), CadenceError> {
        if project.status == ProjectStatus::OnHold {
            debug!(project_id = %project.id, "project on hold, not advancing");
            self.update_project_progress(&project.id)?;
            return Ok(());
        }

        let steps = project_repo::list_steps(self.conn, &project.id)?;
        let next = steps
            .iter()
            .filter(|s| s.order_number > completed.order_number)
            .find(|s| !s.is_converted);

        match next {
            Some(step) => {
                self.create_task_for_step(step, &project.id)?;
                self.update_project_progress(&project.id)?;
            }
            None if steps.iter().all(|s| s.status == StepStatus::Completed) => {
                self.complete_project(&project.id)?;
            }
            None => {
                self.update_project_progress(&project.id)?;
            }
        }
        Ok(())
    }

    /// The linked task was reopened. The step goes back to in progress; tasks already
    /// created for later steps stay.
    pub fn handle_task_uncomplete(&self, task_id: &str) -> Result<Option<Project>, CadenceError> {
        let Some(step) = project_repo::find_step_by_task(self.conn, task_id)? else {
            debug!(task_id, "task is not linked to a step");
            return Ok(None);
        };
        let project = project_repo::get_project_by_id(self.conn, &step.project_id)?;

        let mut writes = vec![WriteStep::new(
            "reopen step",
            || project_repo::update_step_status(self.conn, &step.id, StepStatus::InProgress, None),
            || project_repo::restore_step(self.conn, &step),
        )];
        if project.status == ProjectStatus::Completed {
            writes.push(WriteStep::new(
                "reopen project",
                || project_repo::update_project_status(self.conn, &project.id, ProjectStatus::Active),
                || project_repo::update_project_status(self.conn, &project.id, ProjectStatus::Completed),
            ));
        }
        writes.push(WriteStep::last("update progress", || {
            self.update_project_progress(&project.id).map(|_| ())
        }));
        create_with_rollback(writes)?;

        info!(project_id = %project.id, step_id = %step.id, "step reopened");
        project_repo::get_project_by_id(self.conn, &project.id).map(Some)
    }

    /// The linked task is gone. Unlink the step (its status stays) and, unless the
    /// project is on hold, refill the frontier.
    pub fn handle_task_deletion(&self, task_id: &str) -> Result<Option<Project>, CadenceError> {
        let Some(step) = project_repo::find_step_by_task(self.conn, task_id)? else {
            debug!(task_id, "task is not linked to a step");
            return Ok(None);
        };
        project_repo::reset_step_conversion(self.conn, &step.id)?;
        debug!(step_id = %step.id, task_id, "step unlinked from deleted task");

        let project = project_repo::get_project_by_id(self.conn, &step.project_id)?;
        if project.status == ProjectStatus::OnHold {
            debug!(project_id = %project.id, "project on hold, no replacement task");
            return Ok(Some(project));
        }
        self.sync_project_steps(&project.id).map(Some)
    }

    /// Reconcile steps with their tasks, then make sure the frontier step has a task.
    pub fn sync_project_steps(&self, project_id: &str) -> Result<Project, CadenceError> {
        let project = project_repo::get_project_by_id(self.conn, project_id)?;
        if project.status == ProjectStatus::OnHold {
            debug!(project_id, "project on hold, sync skipped");
            return Ok(project);
        }

        let mut steps = project_repo::list_steps(self.conn, project_id)?;
        let linked: Vec<String> = steps
            .iter()
            .filter(|s| s.is_converted)
            .filter_map(|s| s.converted_task_id.clone())
            .collect();
        let tasks: HashMap<String, _> = task_repo::get_tasks_by_ids(self.conn, &linked)?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        for step in steps.iter_mut().filter(|s| s.is_converted) {
            let task = step.converted_task_id.as_ref().and_then(|id| tasks.get(id));
            let Some(task) = task else {
                project_repo::reset_step_conversion(self.conn, &step.id)?;
                info!(project_id, step_id = %step.id, "dangling task reference cleared");
                step.is_converted = false;
                step.converted_task_id = None;
                continue;
            };

            match (task.status == TaskStatus::Completed, step.status == StepStatus::Completed) {
                (true, false) => {
                    let completed_at = task
                        .completed_at
                        .clone()
                        .unwrap_or_else(|| self.clock.now().to_rfc3339());
                    project_repo::update_step_status(
                        self.conn,
                        &step.id,
                        StepStatus::Completed,
                        Some(&completed_at),
                    )?;
                    info!(project_id, step_id = %step.id, "step completed to match its task");
                    step.status = StepStatus::Completed;
                }
                (false, true) => {
                    task_repo::update_task_status(self.conn, &task.id, TaskStatus::Completed)?;
                    info!(project_id, task_id = %task.id, "task completed to match its step");
                }
                _ => {}
            }
        }

        match steps.iter().find(|s| s.status != StepStatus::Completed) {
            Some(frontier) if !frontier.is_converted => {
                self.create_task_for_step(frontier, project_id)?;
                self.update_project_progress(project_id)
            }
            Some(frontier) => {
                project_repo::set_current_step(self.conn, project_id, Some(frontier.order_number))?;
                self.update_project_progress(project_id)
            }
            None if !steps.is_empty() && project.status != ProjectStatus::Completed => {
                self.complete_project(project_id)
            }
            None => self.update_project_progress(project_id),
        }
    }

    /// Recompute `progress` from step statuses.
    pub fn update_project_progress(&self, project_id: &str) -> Result<Project, CadenceError> {
        let steps = project_repo::list_steps(self.conn, project_id)?;
        let completed = steps.iter().filter(|s| s.status == StepStatus::Completed).count();
        let progress = progress_percent(completed, steps.len());
        project_repo::update_project_progress(self.conn, project_id, progress)?;
        debug!(project_id, progress, "project progress updated");
        project_repo::get_project_by_id(self.conn, project_id)
    }

    /// Put a project on hold or make it active again. Resuming refills the frontier.
    pub fn set_project_status(&self, project_id: &str, status: ProjectStatus) -> Result<Project, CadenceError> {
        let project = project_repo::get_project_by_id(self.conn, project_id)?;
        match (project.status, status) {
            (from, to) if from == to => Ok(project),
            (ProjectStatus::Completed, to) | (_, to @ ProjectStatus::Completed) => Err(
                CadenceError::invalid_transition(project.status.as_str(), to.as_str()),
            ),
            (_, ProjectStatus::OnHold) => {
                project_repo::update_project_status(self.conn, project_id, ProjectStatus::OnHold)?;
                info!(project_id, "project put on hold");
                project_repo::get_project_by_id(self.conn, project_id)
            }
            (_, ProjectStatus::Active) => {
                project_repo::update_project_status(self.conn, project_id, ProjectStatus::Active)?;
                info!(project_id, "project resumed");
                self.sync_project_steps(project_id)
            }
        }
    }

    fn complete_project(&self, project_id: &str) -> Result<Project, CadenceError> {
        project_repo::update_project_status(self.conn, project_id, ProjectStatus::Completed)?;
        project_repo::update_project_progress(self.conn, project_id, 100)?;
        project_repo::set_current_step(self.conn, project_id, None)?;
        info!(project_id, "project completed");
        project_repo::get_project_by_id(self.conn, project_id)
    }

    fn step_for_task(&self, task_id: &str) -> Result<ProjectStep, CadenceError> {
        project_repo::find_step_by_task(self.conn, task_id)?
            .ok_or_else(|| CadenceError::step_not_found(task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::clock::FixedClock;
    use crate::db::connection;
    use crate::db::project_repo::NewStep;
    use crate::error::ErrorCode;
    use crate::models::Priority;

    fn clock() -> FixedClock {
        FixedClock::on(NaiveDate::from_ymd_opt(2024, 4, 2).unwrap())
    }

    fn project_with_steps(conn: &Connection, count: i64) {
        project_repo::create_project(conn, "p1", "u1", "launch", "Launch", None).unwrap();
        for n in 1..=count {
            let id = format!("s{n}");
            let title = format!("Step {n}");
            project_repo::create_step(
                conn,
                &NewStep {
                    id: &id,
                    project_id: "p1",
                    title: &title,
                    description: None,
                    order_number: n,
                    priority: Priority::Normal,
                    due_date: None,
                    assigned_date: None,
                },
            )
            .unwrap();
        }
    }

    fn step(conn: &Connection, id: &str) -> ProjectStep {
        project_repo::get_step_by_id(conn, id).unwrap()
    }

    fn finish(conn: &Connection, engine: &StepProgression<'_>, step_id: &str) -> Project {
        let task_id = step(conn, step_id).converted_task_id.unwrap();
        task_repo::update_task_status(conn, &task_id, TaskStatus::Completed).unwrap();
        engine.handle_task_completion(&task_id, "p1").unwrap()
    }

    #[test]
    fn sync_materializes_first_step_only() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        project_with_steps(&conn, 3);

        let project = engine.sync_project_steps("p1").unwrap();
        assert_eq!(project.current_step, Some(1));
        assert_eq!(project.progress, 0);

        let first = step(&conn, "s1");
        assert!(first.is_converted);
        assert_eq!(first.status, StepStatus::InProgress);
        let task = task_repo::get_task_by_id(&conn, first.converted_task_id.as_deref().unwrap()).unwrap();
        assert_eq!(task.status, TaskStatus::OnDeck);
        assert_eq!(task.source, SourceRef::Project("p1".into()));
        assert!(!step(&conn, "s2").is_converted);
    }

    #[test]
    fn three_steps_advance_to_completion() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        project_with_steps(&conn, 3);
        engine.sync_project_steps("p1").unwrap();

        let project = finish(&conn, &engine, "s1");
        assert_eq!(project.progress, 33);
        assert_eq!(project.current_step, Some(2));
        assert!(step(&conn, "s2").is_converted);
        assert!(!step(&conn, "s3").is_converted);

        let project = finish(&conn, &engine, "s2");
        assert_eq!(project.progress, 67);
        assert!(step(&conn, "s3").is_converted);

        let project = finish(&conn, &engine, "s3");
        assert_eq!(project.status, ProjectStatus::Completed);
        assert_eq!(project.progress, 100);
        assert_eq!(project.current_step, None);
        assert!(step(&conn, "s3").completed_at.is_some());
    }

    #[test]
    fn completion_skips_steps_converted_out_of_order() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        project_with_steps(&conn, 3);
        engine.sync_project_steps("p1").unwrap();
        engine.create_task_for_step(&step(&conn, "s2"), "p1").unwrap();

        finish(&conn, &engine, "s1");
        assert!(step(&conn, "s3").is_converted);
    }

    #[test]
    fn create_task_for_step_is_idempotent() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        project_with_steps(&conn, 1);

        let first = engine.create_task_for_step(&step(&conn, "s1"), "p1").unwrap();
        let second = engine.create_task_for_step(&step(&conn, "s1"), "p1").unwrap();
        assert_eq!(first, second);
        assert_eq!(task_repo::list_for_project(&conn, "p1").unwrap().len(), 1);
    }

    #[test]
    fn deleted_frontier_task_is_recreated_for_the_same_step() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        project_with_steps(&conn, 2);
        engine.sync_project_steps("p1").unwrap();

        let old = task_repo::get_task_by_id(&conn, &step(&conn, "s1").converted_task_id.unwrap()).unwrap();
        materialize::delete_task_record(&conn, &old).unwrap();
        engine.handle_task_deletion(&old.id).unwrap();

        let healed = step(&conn, "s1");
        assert!(healed.is_converted);
        assert_eq!(healed.status, StepStatus::InProgress);
        let new_id = healed.converted_task_id.unwrap();
        assert_ne!(new_id, old.id);
        assert!(task_repo::find_task(&conn, &new_id).unwrap().is_some());
        assert!(!step(&conn, "s2").is_converted);
    }

    #[test]
    fn on_hold_project_gets_no_replacement_task() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        project_with_steps(&conn, 2);
        engine.sync_project_steps("p1").unwrap();
        engine.set_project_status("p1", ProjectStatus::OnHold).unwrap();

        let old = task_repo::get_task_by_id(&conn, &step(&conn, "s1").converted_task_id.unwrap()).unwrap();
        materialize::delete_task_record(&conn, &old).unwrap();
        engine.handle_task_deletion(&old.id).unwrap();
        engine.sync_project_steps("p1").unwrap();

        assert!(!step(&conn, "s1").is_converted);
        assert!(task_repo::list_for_project(&conn, "p1").unwrap().is_empty());

        engine.set_project_status("p1", ProjectStatus::Active).unwrap();
        assert!(step(&conn, "s1").is_converted);
    }

    #[test]
    fn on_hold_completion_does_not_advance() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        project_with_steps(&conn, 2);
        engine.sync_project_steps("p1").unwrap();
        engine.set_project_status("p1", ProjectStatus::OnHold).unwrap();

        let project = finish(&conn, &engine, "s1");
        assert_eq!(project.progress, 50);
        assert_eq!(step(&conn, "s1").status, StepStatus::Completed);
        assert!(!step(&conn, "s2").is_converted);
    }

    #[test]
    fn sync_reconciles_drift_in_both_directions() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        project_with_steps(&conn, 3);
        engine.sync_project_steps("p1").unwrap();
        engine.create_task_for_step(&step(&conn, "s2"), "p1").unwrap();

        // task completed behind the engine's back
        let t1 = step(&conn, "s1").converted_task_id.unwrap();
        task_repo::update_task_status(&conn, &t1, TaskStatus::Completed).unwrap();
        // step completed while its task stayed open
        project_repo::update_step_status(&conn, "s2", StepStatus::Completed, Some("2024-04-01T09:00:00+00:00"))
            .unwrap();

        let project = engine.sync_project_steps("p1").unwrap();
        assert_eq!(step(&conn, "s1").status, StepStatus::Completed);
        let t2 = step(&conn, "s2").converted_task_id.unwrap();
        assert_eq!(task_repo::get_task_by_id(&conn, &t2).unwrap().status, TaskStatus::Completed);
        assert!(step(&conn, "s3").is_converted);
        assert_eq!(project.progress, 67);
    }

    #[test]
    fn sync_clears_dangling_reference_on_completed_step() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        project_with_steps(&conn, 2);
        engine.sync_project_steps("p1").unwrap();
        finish(&conn, &engine, "s1");

        conn.execute(
            "UPDATE project_steps SET converted_task_id = 'gone' WHERE id = 's1'",
            [],
        )
        .unwrap();
        engine.sync_project_steps("p1").unwrap();

        let s1 = step(&conn, "s1");
        assert!(!s1.is_converted);
        assert_eq!(s1.status, StepStatus::Completed);
        assert_eq!(task_repo::list_for_project(&conn, "p1").unwrap().len(), 2);
    }

    #[test]
    fn uncomplete_reopens_step_and_project() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        project_with_steps(&conn, 1);
        engine.sync_project_steps("p1").unwrap();
        let task_id = step(&conn, "s1").converted_task_id.unwrap();
        let done = finish(&conn, &engine, "s1");
        assert_eq!(done.status, ProjectStatus::Completed);

        let project = engine.handle_task_uncomplete(&task_id).unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Active);
        assert_eq!(project.progress, 0);
        let s1 = step(&conn, "s1");
        assert_eq!(s1.status, StepStatus::InProgress);
        assert!(s1.completed_at.is_none());
    }

    #[test]
    fn uncomplete_keeps_downstream_tasks() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        project_with_steps(&conn, 2);
        engine.sync_project_steps("p1").unwrap();
        let t1 = step(&conn, "s1").converted_task_id.unwrap();
        finish(&conn, &engine, "s1");

        engine.handle_task_uncomplete(&t1).unwrap();
        assert!(step(&conn, "s2").is_converted);
        assert_eq!(task_repo::list_for_project(&conn, "p1").unwrap().len(), 2);
    }

    #[test]
    fn unlinked_task_is_ignored() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        assert!(engine.handle_task_uncomplete("nope").unwrap().is_none());
        assert!(engine.handle_task_deletion("nope").unwrap().is_none());
        let err = engine.handle_task_completion("nope", "p1").unwrap_err();
        assert_eq!(err.code, ErrorCode::StepNotFound);
    }

    #[test]
    fn completed_project_cannot_be_put_on_hold() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        project_with_steps(&conn, 1);
        engine.sync_project_steps("p1").unwrap();
        finish(&conn, &engine, "s1");

        let err = engine.set_project_status("p1", ProjectStatus::OnHold).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStatusTransition);
    }

    #[test]
    fn failed_link_removes_new_task_and_item() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        project_with_steps(&conn, 2);
        conn.execute_batch(
            "CREATE TRIGGER fail_current_step BEFORE UPDATE OF current_step ON projects
             BEGIN SELECT RAISE(ABORT, 'current step locked'); END;",
        )
        .unwrap();

        let err = engine.create_task_for_step(&step(&conn, "s1"), "p1").unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);

        assert_eq!(crate::db::item_repo::count_items(&conn).unwrap(), 0);
        assert!(task_repo::list_for_project(&conn, "p1").unwrap().is_empty());
        let s1 = step(&conn, "s1");
        assert!(!s1.is_converted);
        assert!(s1.converted_task_id.is_none());
        assert_eq!(s1.status, StepStatus::Pending);
    }

    #[test]
    fn completion_with_wrong_project_is_rejected() {
        let conn = connection::open_in_memory().unwrap();
        let clock = clock();
        let engine = StepProgression::new(&conn, &clock);
        project_with_steps(&conn, 2);
        project_repo::create_project(&conn, "p2", "u1", "other", "Other", None).unwrap();
        engine.sync_project_steps("p1").unwrap();
        let t1 = step(&conn, "s1").converted_task_id.unwrap();

        let err = engine.handle_task_completion(&t1, "p2").unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(step(&conn, "s1").status, StepStatus::InProgress);
        assert!(!step(&conn, "s2").is_converted);
    }
}
