//! Materializes task instances for habits.
//!
//! A habit has at most one open (non-completed) instance at a time. Creation is
//! idempotent per `(habit, date)`: the existence check catches sequential retries and
//! the partial unique index on `task_instances(habit_id, assigned_date)` catches
//! concurrent ones.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::db::{habit_repo, task_repo};
use crate::error::{CadenceError, ErrorCode};
use crate::models::{Habit, NewTask, SourceRef, TaskInstance, TaskStatus};
use crate::schedule::recurrence;

use super::materialize;
use super::rollback::{create_with_rollback, WriteStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegenerationStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub habit_id: String,
    pub error: String,
}

/// Outcome of the maintenance pass for one user.
#[derive(Debug, Clone, Serialize)]
pub struct RegenerationSummary {
    pub user_id: String,
    pub status: RegenerationStatus,
    pub regenerated: usize,
    pub failures: Vec<SourceFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct HabitGenerator<'a> {
    conn: &'a Connection,
    clock: &'a dyn Clock,
}

impl<'a> HabitGenerator<'a> {
    pub fn new(conn: &'a Connection, clock: &'a dyn Clock) -> Self {
        Self { conn, clock }
    }

    /// Create the instance that follows `from`, or the one on `from` itself when
    /// `is_initial`. Inactive habits and rules without a next date are no-ops.
    pub fn generate_next_task(
        &self,
        habit: &Habit,
        from: NaiveDate,
        is_initial: bool,
    ) -> Result<Option<TaskInstance>, CadenceError> {
        if !habit.is_active {
            debug!(habit_id = %habit.id, "habit inactive, nothing to generate");
            return Ok(None);
        }

        let target = if is_initial {
            Some(from)
        } else {
            recurrence::next_occurrence(&habit.rule, from)
        };
        let Some(date) = target else {
            warn!(
                habit_id = %habit.id,
                rule = habit.rule.recurrence.kind(),
                %from,
                "recurrence rule has no next occurrence"
            );
            return Ok(None);
        };

        self.create_instance(habit, date).map(Some)
    }

    /// Return the habit's open instance if it has one, otherwise create one on `date`.
    pub fn create_instance(&self, habit: &Habit, date: NaiveDate) -> Result<TaskInstance, CadenceError> {
        if let Some(existing) = task_repo::find_open_for_habit_on(self.conn, &habit.id, date)? {
            debug!(habit_id = %habit.id, %date, task_id = %existing.id, "instance already exists");
            return Ok(existing);
        }
        if let Some(open) = task_repo::list_open_for_habit(self.conn, &habit.id)?.into_iter().next() {
            debug!(
                habit_id = %habit.id,
                %date,
                open_on = ?open.assigned_date,
                "habit already has an open instance"
            );
            return Ok(open);
        }

        let mut task = NewTask::new(
            &habit.user_id,
            &habit.title,
            TaskStatus::Habit,
            SourceRef::Habit(habit.id.clone()),
        );
        task.description = habit.description.clone();
        task.priority = habit.priority;
        task.assigned_date = Some(date);
        task.reminder_time = habit.rule.time_of_day;
        task.checklist_template_id = habit.checklist_template_id.clone();

        match materialize::create_task_record(self.conn, &task) {
            Ok(created) => {
                info!(habit_id = %habit.id, %date, task_id = %created.id, "habit instance created");
                Ok(created)
            }
            Err(err) if err.code == ErrorCode::DuplicateInstance => {
                // Another writer got there between the check and the insert.
                debug!(habit_id = %habit.id, %date, "lost creation race, using existing instance");
                task_repo::find_open_for_habit_on(self.conn, &habit.id, date)?.ok_or(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Delete every open instance of a habit. Completed instances are history and stay.
    pub fn delete_incomplete_instances(&self, habit_id: &str) -> Result<usize, CadenceError> {
        let open = task_repo::list_open_for_habit(self.conn, habit_id)?;
        for task in &open {
            materialize::delete_task_record(self.conn, task)?;
        }
        if !open.is_empty() {
            info!(habit_id, removed = open.len(), "open habit instances deleted");
        }
        Ok(open.len())
    }

    /// Throw away the habit's open instances and start again from today.
    pub fn regenerate(&self, habit: &Habit) -> Result<Option<TaskInstance>, CadenceError> {
        self.delete_incomplete_instances(&habit.id)?;
        let Some(date) = recurrence::occurrence_on_or_after(&habit.rule, self.clock.today()) else {
            warn!(habit_id = %habit.id, "recurrence rule has no upcoming occurrence");
            return Ok(None);
        };
        self.generate_next_task(habit, date, true)
    }

    /// Maintenance pass over every user's active habits.
    ///
    /// Each habit ends with exactly one open instance, on its first occurrence on or
    /// after today. Completed history is untouched. Re-running it changes nothing.
    /// A failing habit is recorded in its user's summary and the pass moves on.
    pub fn monthly_regeneration(&self) -> Result<Vec<RegenerationSummary>, CadenceError> {
        let today = self.clock.today();
        let users = habit_repo::list_user_ids(self.conn)?;
        let summaries: Vec<RegenerationSummary> = users
            .iter()
            .map(|user_id| self.regenerate_user(user_id, today))
            .collect();
        info!(
            users = summaries.len(),
            failed = summaries.iter().filter(|s| s.status == RegenerationStatus::Failed).count(),
            "monthly regeneration finished"
        );
        Ok(summaries)
    }

    fn regenerate_user(&self, user_id: &str, today: NaiveDate) -> RegenerationSummary {
        let mut summary = RegenerationSummary {
            user_id: user_id.to_string(),
            status: RegenerationStatus::Success,
            regenerated: 0,
            failures: Vec::new(),
            error: None,
        };

        let habits = match habit_repo::list_active_habits(self.conn, user_id) {
            Ok(habits) => habits,
            Err(err) => {
                warn!(user_id, error = %err, "cannot list habits for regeneration");
                summary.status = RegenerationStatus::Failed;
                summary.error = Some(err.message);
                return summary;
            }
        };

        for (habit_id, parsed) in habits {
            match parsed.and_then(|habit| self.refresh_habit(&habit, today)) {
                Ok(()) => summary.regenerated += 1,
                Err(err) => {
                    warn!(user_id, habit_id = %habit_id, error = %err, "habit regeneration failed");
                    summary.failures.push(SourceFailure {
                        habit_id,
                        error: err.message,
                    });
                }
            }
        }

        if !summary.failures.is_empty() {
            summary.status = RegenerationStatus::Failed;
            summary.error = Some(
                summary
                    .failures
                    .iter()
                    .map(|f| format!("{}: {}", f.habit_id, f.error))
                    .collect::<Vec<_>>()
                    .join("; "),
            );
        }
        summary
    }

    /// Drop open instances that are not on the target date, then make sure the target exists.
    fn refresh_habit(&self, habit: &Habit, today: NaiveDate) -> Result<(), CadenceError> {
        let target = recurrence::occurrence_on_or_after(&habit.rule, today);
        for task in task_repo::list_open_for_habit(self.conn, &habit.id)? {
            if target.is_none() || task.assigned_date != target {
                materialize::delete_task_record(self.conn, &task)?;
            }
        }
        match target {
            Some(date) => {
                self.create_instance(habit, date)?;
            }
            None => warn!(habit_id = %habit.id, "recurrence rule has no upcoming occurrence"),
        }
        Ok(())
    }

    /// Toggle a habit. Pausing deletes its open instances; resuming materializes the
    /// next one.
    pub fn set_active(&self, habit_id: &str, is_active: bool) -> Result<Habit, CadenceError> {
        let habit = habit_repo::get_habit_by_id(self.conn, habit_id)?;
        if habit.is_active == is_active {
            return Ok(habit);
        }

        let was_active = habit.is_active;
        let flag = WriteStep::new(
            "update habit",
            || habit_repo::set_active(self.conn, habit_id, is_active),
            || habit_repo::set_active(self.conn, habit_id, was_active),
        );
        let follow_up = if is_active {
            WriteStep::last("generate first instance", || {
                let resumed = Habit { is_active: true, ..habit.clone() };
                if let Some(date) = recurrence::occurrence_on_or_after(&resumed.rule, self.clock.today()) {
                    self.generate_next_task(&resumed, date, true)?;
                }
                Ok(())
            })
        } else {
            WriteStep::last("delete open instances", || {
                self.delete_incomplete_instances(habit_id).map(|_| ())
            })
        };
        create_with_rollback(vec![flag, follow_up])?;

        info!(habit_id, is_active, "habit toggled");
        habit_repo::get_habit_by_id(self.conn, habit_id)
    }

    /// Remove a habit together with all of its instances.
    pub fn delete_habit(&self, habit_id: &str) -> Result<usize, CadenceError> {
        let instances = task_repo::list_for_habit(self.conn, habit_id)?;
        for task in &instances {
            materialize::delete_task_record(self.conn, task)?;
        }
        habit_repo::delete_habit(self.conn, habit_id)?;
        info!(habit_id, removed = instances.len(), "habit deleted");
        Ok(instances.len())
    }
}
