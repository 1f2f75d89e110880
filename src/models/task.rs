use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::habit::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    OnDeck,
    Active,
    Completed,
    /// A recurring instance that has not been started yet.
    Habit,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnDeck => "on_deck",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Habit => "habit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "on_deck" => Some(Self::OnDeck),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "habit" => Some(Self::Habit),
            _ => None,
        }
    }
}

/// Back-reference to whatever materialized the task. Never an ownership pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum SourceRef {
    Habit(String),
    Project(String),
    AdHoc,
}

impl SourceRef {
    pub fn from_columns(habit_id: Option<String>, project_id: Option<String>) -> Self {
        match (habit_id, project_id) {
            (Some(h), _) => Self::Habit(h),
            (None, Some(p)) => Self::Project(p),
            (None, None) => Self::AdHoc,
        }
    }

    pub fn habit_id(&self) -> Option<&str> {
        match self {
            Self::Habit(id) => Some(id),
            _ => None,
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        match self {
            Self::Project(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: String,
    pub item_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assigned_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub reminder_time: Option<NaiveTime>,
    pub source: SourceRef,
    pub checklist_template_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// Everything needed to insert a task instance; ids are assigned by the caller.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub id: String,
    pub item_id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assigned_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub reminder_time: Option<NaiveTime>,
    pub source: SourceRef,
    pub checklist_template_id: Option<String>,
}

impl NewTask {
    pub fn new(user_id: &str, title: &str, status: TaskStatus, source: SourceRef) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            item_id: ulid::Ulid::new().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            description: None,
            status,
            priority: Priority::Normal,
            assigned_date: None,
            due_date: None,
            reminder_time: None,
            source,
            checklist_template_id: None,
        }
    }

    /// Insert form of an existing instance, ids included, for restoring a deleted row.
    pub fn from_instance(task: &TaskInstance, user_id: &str) -> Self {
        Self {
            id: task.id.clone(),
            item_id: task.item_id.clone(),
            user_id: user_id.to_string(),
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status,
            priority: task.priority,
            assigned_date: task.assigned_date,
            due_date: task.due_date,
            reminder_time: task.reminder_time,
            source: task.source.clone(),
            checklist_template_id: task.checklist_template_id.clone(),
        }
    }
}
