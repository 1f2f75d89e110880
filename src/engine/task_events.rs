//! Status changes on task instances, dispatched to the engine that owns the source.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::db::{completion_repo, habit_repo, task_repo};
use crate::error::CadenceError;
use crate::models::{NewTask, Priority, Project, SourceRef, TaskInstance, TaskStatus};

use super::habit_generator::HabitGenerator;
use super::materialize;
use super::rollback::{create_with_rollback, WriteStep};
use super::step_progression::StepProgression;

/// A task after a status change, with whatever the change caused downstream.
#[derive(Debug, Clone, Serialize)]
pub struct TaskUpdate {
    pub task: TaskInstance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_instance: Option<TaskInstance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<Project>,
}

pub struct TaskEvents<'a> {
    conn: &'a Connection,
    clock: &'a dyn Clock,
}

impl<'a> TaskEvents<'a> {
    pub fn new(conn: &'a Connection, clock: &'a dyn Clock) -> Self {
        Self { conn, clock }
    }

    pub fn add_task(
        &self,
        user_id: &str,
        title: &str,
        date: Option<NaiveDate>,
        priority: Priority,
    ) -> Result<TaskInstance, CadenceError> {
        if title.trim().is_empty() {
            return Err(CadenceError::validation("Task title must not be empty"));
        }
        let mut task = NewTask::new(user_id, title, TaskStatus::OnDeck, SourceRef::AdHoc);
        task.assigned_date = date;
        task.priority = priority;
        let created = materialize::create_task_record(self.conn, &task)?;
        info!(task_id = %created.id, "task added");
        Ok(created)
    }

    pub fn start_task(&self, task_id: &str) -> Result<TaskInstance, CadenceError> {
        let task = task_repo::get_task_by_id(self.conn, task_id)?;
        match task.status {
            TaskStatus::Active => Ok(task),
            TaskStatus::Completed => Err(CadenceError::invalid_transition(
                task.status.as_str(),
                TaskStatus::Active.as_str(),
            )),
            TaskStatus::OnDeck | TaskStatus::Habit => {
                task_repo::update_task_status(self.conn, task_id, TaskStatus::Active)?;
                debug!(task_id, "task started");
                task_repo::get_task_by_id(self.conn, task_id)
            }
        }
    }

    /// Complete a task. Habit instances append a completion record and schedule the
    /// next instance; project tasks advance their project.
    pub fn complete_task(&self, task_id: &str) -> Result<TaskUpdate, CadenceError> {
        let task = task_repo::get_task_by_id(self.conn, task_id)?;
        if task.status == TaskStatus::Completed {
            return Err(CadenceError::invalid_transition(
                task.status.as_str(),
                TaskStatus::Completed.as_str(),
            ));
        }

        let mut project = None;
        let mut writes = vec![WriteStep::new(
            "complete task",
            || task_repo::update_task_status(self.conn, task_id, TaskStatus::Completed),
            || task_repo::update_task_status(self.conn, task_id, task.status),
        )];
        match &task.source {
            SourceRef::Habit(habit_id) => {
                let now = self.clock.now();
                writes.push(WriteStep::last("record completion", move || {
                    completion_repo::record_completion(self.conn, habit_id, now).map(|_| ())
                }));
            }
            SourceRef::Project(project_id) => {
                let engine = StepProgression::new(self.conn, self.clock);
                let project = &mut project;
                writes.push(WriteStep::last("advance project", move || {
                    *project = Some(engine.handle_task_completion(task_id, project_id)?);
                    Ok(())
                }));
            }
            SourceRef::AdHoc => {}
        }
        create_with_rollback(writes)?;
        info!(task_id, "task completed");

        let next_instance = match &task.source {
            SourceRef::Habit(habit_id) => self.schedule_next(habit_id, &task)?,
            _ => None,
        };

        Ok(TaskUpdate {
            task: task_repo::get_task_by_id(self.conn, task_id)?,
            next_instance,
            project,
        })
    }

    fn schedule_next(&self, habit_id: &str, done: &TaskInstance) -> Result<Option<TaskInstance>, CadenceError> {
        let Some(habit) = habit_repo::find_habit(self.conn, habit_id)? else {
            debug!(habit_id, "habit no longer exists, no next instance");
            return Ok(None);
        };
        let today = self.clock.today();
        let from = done.assigned_date.map_or(today, |d| d.max(today));
        HabitGenerator::new(self.conn, self.clock)
            .generate_next_task(&habit, from, false)
            .map_err(|e| e.context("schedule next instance"))
    }

    /// Reopen a completed task. Completion records stay; they are history. A reopened
    /// habit instance is the habit's open instance again, so the one scheduled after it
    /// is removed.
    pub fn uncomplete_task(&self, task_id: &str) -> Result<TaskUpdate, CadenceError> {
        let task = task_repo::get_task_by_id(self.conn, task_id)?;
        if task.status != TaskStatus::Completed {
            return Err(CadenceError::invalid_transition(
                task.status.as_str(),
                TaskStatus::Active.as_str(),
            ));
        }
        let reopened = match task.source {
            SourceRef::Habit(_) => TaskStatus::Habit,
            _ => TaskStatus::Active,
        };
        let superseded = match &task.source {
            SourceRef::Habit(habit_id) => self.open_instance_snapshots(habit_id)?,
            _ => Vec::new(),
        };

        let mut project = None;
        let mut writes = Vec::new();
        if !superseded.is_empty() {
            writes.push(WriteStep::new(
                "drop scheduled instances",
                || {
                    superseded
                        .iter()
                        .try_for_each(|(open, _)| materialize::delete_task_record(self.conn, open))
                },
                || {
                    superseded
                        .iter()
                        .try_for_each(|(_, snapshot)| {
                            materialize::create_task_record(self.conn, snapshot).map(|_| ())
                        })
                },
            ));
        }
        writes.push(WriteStep::new(
            "reopen task",
            || task_repo::update_task_status(self.conn, task_id, reopened),
            || task_repo::update_task_status(self.conn, task_id, TaskStatus::Completed),
        ));
        if let SourceRef::Project(_) = task.source {
            let engine = StepProgression::new(self.conn, self.clock);
            let project = &mut project;
            writes.push(WriteStep::last("reopen step", move || {
                *project = engine.handle_task_uncomplete(task_id)?;
                Ok(())
            }));
        }
        create_with_rollback(writes)?;
        info!(
            task_id,
            status = reopened.as_str(),
            dropped = superseded.len(),
            "task reopened"
        );

        Ok(TaskUpdate {
            task: task_repo::get_task_by_id(self.conn, task_id)?,
            next_instance: None,
            project,
        })
    }

    /// The habit's open instances, each paired with what it takes to recreate it.
    fn open_instance_snapshots(&self, habit_id: &str) -> Result<Vec<(TaskInstance, NewTask)>, CadenceError> {
        let open = task_repo::list_open_for_habit(self.conn, habit_id)?;
        if open.is_empty() {
            return Ok(Vec::new());
        }
        let habit = habit_repo::get_habit_by_id(self.conn, habit_id)?;
        Ok(open
            .into_iter()
            .map(|t| {
                let snapshot = NewTask::from_instance(&t, &habit.user_id);
                (t, snapshot)
            })
            .collect())
    }

    /// Delete a task and its item. A project task leaves its step unlinked and the
    /// frontier is refilled.
    pub fn delete_task(&self, task_id: &str) -> Result<Option<Project>, CadenceError> {
        let task = task_repo::get_task_by_id(self.conn, task_id)?;
        materialize::delete_task_record(self.conn, &task)?;
        info!(task_id, "task deleted");

        match task.source {
            SourceRef::Project(_) => StepProgression::new(self.conn, self.clock).handle_task_deletion(task_id),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::clock::FixedClock;
    use crate::db::connection;
    use crate::db::habit_repo::NewHabit;
    use crate::db::project_repo::{self, NewStep};
    use crate::error::ErrorCode;
    use crate::models::{ProjectStatus, Recurrence, RecurrenceRule, StepStatus};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn daily_habit(conn: &Connection, clock: &dyn Clock) -> TaskInstance {
        let rule = RecurrenceRule::new(Recurrence::Daily { interval: 1 }, date(2024, 1, 1));
        let habit = habit_repo::create_habit(
            conn,
            &NewHabit {
                id: "h1",
                user_id: "u1",
                title: "Floss",
                description: None,
                priority: Priority::Normal,
                checklist_template_id: None,
                rule: &rule,
            },
        )
        .unwrap();
        HabitGenerator::new(conn, clock)
            .generate_next_task(&habit, clock.today(), true)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn completing_habit_instance_records_and_schedules_next() {
        let conn = connection::open_in_memory().unwrap();
        let clock = FixedClock::on(date(2024, 5, 10));
        let events = TaskEvents::new(&conn, &clock);
        let first = daily_habit(&conn, &clock);

        let update = events.complete_task(&first.id).unwrap();
        assert_eq!(update.task.status, TaskStatus::Completed);
        assert!(update.task.completed_at.is_some());
        let next = update.next_instance.unwrap();
        assert_eq!(next.assigned_date, Some(date(2024, 5, 11)));
        assert_eq!(next.status, TaskStatus::Habit);
        assert_eq!(completion_repo::list_completions(&conn, "h1").unwrap().len(), 1);
    }

    #[test]
    fn overdue_instance_schedules_from_today() {
        let conn = connection::open_in_memory().unwrap();
        let early = FixedClock::on(date(2024, 5, 1));
        let first = daily_habit(&conn, &early);

        let clock = FixedClock::on(date(2024, 5, 10));
        let update = TaskEvents::new(&conn, &clock).complete_task(&first.id).unwrap();
        assert_eq!(update.next_instance.unwrap().assigned_date, Some(date(2024, 5, 11)));
    }

    #[test]
    fn completing_twice_is_rejected() {
        let conn = connection::open_in_memory().unwrap();
        let clock = FixedClock::on(date(2024, 5, 10));
        let events = TaskEvents::new(&conn, &clock);
        let task = events.add_task("u1", "Call bank", None, Priority::High).unwrap();

        events.complete_task(&task.id).unwrap();
        let err = events.complete_task(&task.id).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStatusTransition);
    }

    #[test]
    fn uncomplete_returns_habit_instance_to_habit_status() {
        let conn = connection::open_in_memory().unwrap();
        let clock = FixedClock::on(date(2024, 5, 10));
        let events = TaskEvents::new(&conn, &clock);
        let first = daily_habit(&conn, &clock);
        events.complete_task(&first.id).unwrap();

        let update = events.uncomplete_task(&first.id).unwrap();
        assert_eq!(update.task.status, TaskStatus::Habit);
        assert!(update.task.completed_at.is_none());
        assert_eq!(completion_repo::list_completions(&conn, "h1").unwrap().len(), 1);
    }

    #[test]
    fn uncomplete_leaves_one_open_instance() {
        let conn = connection::open_in_memory().unwrap();
        let clock = FixedClock::on(date(2024, 5, 10));
        let events = TaskEvents::new(&conn, &clock);
        let first = daily_habit(&conn, &clock);
        let next = events.complete_task(&first.id).unwrap().next_instance.unwrap();

        events.uncomplete_task(&first.id).unwrap();

        let open = task_repo::list_open_for_habit(&conn, "h1").unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, first.id);
        assert_eq!(open[0].assigned_date, Some(date(2024, 5, 10)));
        assert!(task_repo::find_task(&conn, &next.id).unwrap().is_none());
        assert_eq!(crate::db::item_repo::count_items(&conn).unwrap(), 1);

        // completing again schedules the following day afresh
        let again = events.complete_task(&first.id).unwrap();
        assert_eq!(again.next_instance.unwrap().assigned_date, Some(date(2024, 5, 11)));
    }

    #[test]
    fn failed_reopen_restores_scheduled_instance() {
        let conn = connection::open_in_memory().unwrap();
        let clock = FixedClock::on(date(2024, 5, 10));
        let events = TaskEvents::new(&conn, &clock);
        let first = daily_habit(&conn, &clock);
        let next = events.complete_task(&first.id).unwrap().next_instance.unwrap();
        conn.execute_batch(
            "CREATE TRIGGER fail_reopen BEFORE UPDATE OF status ON task_instances
             WHEN OLD.status = 'completed'
             BEGIN SELECT RAISE(ABORT, 'reopen blocked'); END;",
        )
        .unwrap();

        let err = events.uncomplete_task(&first.id).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);

        assert_eq!(task_repo::get_task_by_id(&conn, &first.id).unwrap().status, TaskStatus::Completed);
        let open = task_repo::list_open_for_habit(&conn, "h1").unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, next.id);
        assert_eq!(open[0].assigned_date, Some(date(2024, 5, 11)));
        assert_eq!(crate::db::item_repo::count_items(&conn).unwrap(), 2);
    }

    #[test]
    fn start_moves_to_active() {
        let conn = connection::open_in_memory().unwrap();
        let clock = FixedClock::on(date(2024, 5, 10));
        let events = TaskEvents::new(&conn, &clock);
        let task = events.add_task("u1", "Write report", Some(date(2024, 5, 10)), Priority::Normal).unwrap();

        assert_eq!(events.start_task(&task.id).unwrap().status, TaskStatus::Active);
        events.complete_task(&task.id).unwrap();
        let err = events.start_task(&task.id).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStatusTransition);
    }

    #[test]
    fn empty_title_is_rejected() {
        let conn = connection::open_in_memory().unwrap();
        let clock = FixedClock::on(date(2024, 5, 10));
        let err = TaskEvents::new(&conn, &clock)
            .add_task("u1", "  ", None, Priority::Normal)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    fn two_step_project(conn: &Connection, clock: &dyn Clock) {
        project_repo::create_project(conn, "p1", "u1", "move", "Move house", None).unwrap();
        for n in 1..=2 {
            let id = format!("s{n}");
            project_repo::create_step(
                conn,
                &NewStep {
                    id: &id,
                    project_id: "p1",
                    title: "Pack",
                    description: None,
                    order_number: n,
                    priority: Priority::Normal,
                    due_date: None,
                    assigned_date: None,
                },
            )
            .unwrap();
        }
        StepProgression::new(conn, clock).sync_project_steps("p1").unwrap();
    }

    #[test]
    fn project_task_round_trip_through_events() {
        let conn = connection::open_in_memory().unwrap();
        let clock = FixedClock::on(date(2024, 5, 10));
        let events = TaskEvents::new(&conn, &clock);
        two_step_project(&conn, &clock);
        let t1 = project_repo::get_step_by_id(&conn, "s1").unwrap().converted_task_id.unwrap();

        let done = events.complete_task(&t1).unwrap();
        let project = done.project.unwrap();
        assert_eq!(project.progress, 50);
        assert!(project_repo::get_step_by_id(&conn, "s2").unwrap().is_converted);

        let reopened = events.uncomplete_task(&t1).unwrap();
        assert_eq!(reopened.task.status, TaskStatus::Active);
        assert_eq!(reopened.project.unwrap().status, ProjectStatus::Active);
        assert_eq!(
            project_repo::get_step_by_id(&conn, "s1").unwrap().status,
            StepStatus::InProgress
        );
    }

    #[test]
    fn failed_project_advance_restores_task_status() {
        let conn = connection::open_in_memory().unwrap();
        let clock = FixedClock::on(date(2024, 5, 10));
        let events = TaskEvents::new(&conn, &clock);
        two_step_project(&conn, &clock);
        let t1 = project_repo::get_step_by_id(&conn, "s1").unwrap().converted_task_id.unwrap();
        conn.execute_batch(
            "CREATE TRIGGER fail_step_completion BEFORE UPDATE OF status ON project_steps
             WHEN NEW.status = 'completed'
             BEGIN SELECT RAISE(ABORT, 'step locked'); END;",
        )
        .unwrap();

        let err = events.complete_task(&t1).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);

        let task = task_repo::get_task_by_id(&conn, &t1).unwrap();
        assert_eq!(task.status, TaskStatus::OnDeck);
        assert!(task.completed_at.is_none());
        assert_eq!(project_repo::get_step_by_id(&conn, "s1").unwrap().status, StepStatus::InProgress);
        assert!(!project_repo::get_step_by_id(&conn, "s2").unwrap().is_converted);
        assert_eq!(task_repo::list_for_project(&conn, "p1").unwrap().len(), 1);
    }

    #[test]
    fn deleting_project_task_recreates_it() {
        let conn = connection::open_in_memory().unwrap();
        let clock = FixedClock::on(date(2024, 5, 10));
        let events = TaskEvents::new(&conn, &clock);
        two_step_project(&conn, &clock);
        let t1 = project_repo::get_step_by_id(&conn, "s1").unwrap().converted_task_id.unwrap();

        events.delete_task(&t1).unwrap();
        let relinked = project_repo::get_step_by_id(&conn, "s1").unwrap();
        assert!(relinked.is_converted);
        assert_ne!(relinked.converted_task_id.as_deref(), Some(t1.as_str()));
    }

    #[test]
    fn deleting_habit_instance_does_not_regenerate() {
        let conn = connection::open_in_memory().unwrap();
        let clock = FixedClock::on(date(2024, 5, 10));
        let events = TaskEvents::new(&conn, &clock);
        let first = daily_habit(&conn, &clock);

        assert!(events.delete_task(&first.id).unwrap().is_none());
        assert!(task_repo::list_for_habit(&conn, "h1").unwrap().is_empty());
    }
}
