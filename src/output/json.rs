use serde_json::{json, Value};

use crate::engine::{CompletionRate, RegenerationSummary};
use crate::error::CadenceError;
use crate::models::{Habit, Project, ProjectStep, TaskInstance};

pub fn success(data: Value) -> Value {
    json!({
        "success": true,
        "data": data
    })
}

pub fn error(err: &CadenceError) -> Value {
    json!({
        "success": false,
        "error": {
            "code": err.code.as_str(),
            "message": err.message
        }
    })
}

pub fn print(v: &Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()));
}

pub fn habit_json(h: &Habit) -> Value {
    json!({
        "id": h.id,
        "title": h.title,
        "description": h.description,
        "priority": h.priority.as_str(),
        "is_active": h.is_active,
        "checklist_template_id": h.checklist_template_id,
        "rule": h.rule,
        "created_at": h.created_at,
        "updated_at": h.updated_at
    })
}

pub fn task_summary(t: &TaskInstance) -> Value {
    json!({
        "id": t.id,
        "title": t.title,
        "status": t.status.as_str(),
        "assigned_date": t.assigned_date
    })
}

pub fn task_json(t: &TaskInstance) -> Value {
    let mut v = json!({
        "id": t.id,
        "title": t.title,
        "description": t.description,
        "status": t.status.as_str(),
        "priority": t.priority.as_str(),
        "assigned_date": t.assigned_date,
        "due_date": t.due_date,
        "source": t.source,
        "created_at": t.created_at,
        "updated_at": t.updated_at
    });
    if let Some(ref time) = t.reminder_time {
        v["reminder_time"] = json!(time.format("%H:%M").to_string());
    }
    if let Some(ref checklist) = t.checklist_template_id {
        v["checklist_template_id"] = json!(checklist);
    }
    if let Some(ref completed) = t.completed_at {
        v["completed_at"] = json!(completed);
    }
    v
}

pub fn project_json(p: &Project) -> Value {
    json!({
        "id": p.id,
        "name": p.name,
        "title": p.title,
        "description": p.description,
        "status": p.status.as_str(),
        "progress": p.progress,
        "current_step": p.current_step,
        "created_at": p.created_at,
        "updated_at": p.updated_at
    })
}

pub fn step_json(s: &ProjectStep) -> Value {
    json!({
        "id": s.id,
        "order": s.order_number,
        "title": s.title,
        "status": s.status.as_str(),
        "priority": s.priority.as_str(),
        "due_date": s.due_date,
        "is_converted": s.is_converted,
        "task_id": s.converted_task_id,
        "completed_at": s.completed_at
    })
}

pub fn rate_json(r: &CompletionRate) -> Value {
    json!({
        "rate": (r.rate * 1000.0).round() / 1000.0,
        "completed": r.completed,
        "expected": r.expected,
        "window": { "start": r.window_start, "end": r.window_end }
    })
}

pub fn regeneration_json(summaries: &[RegenerationSummary]) -> Value {
    json!({ "users": summaries })
}
