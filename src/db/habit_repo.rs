use rusqlite::{params, Connection, OptionalExtension};

use crate::error::CadenceError;
use crate::models::{Habit, Priority, RecurrenceRule};

const HABIT_COLUMNS: &str = "id, user_id, title, description, priority, is_active,
    checklist_template_id, recurrence, created_at, updated_at";

pub struct NewHabit<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub priority: Priority,
    pub checklist_template_id: Option<&'a str>,
    pub rule: &'a RecurrenceRule,
}

pub fn create_habit(conn: &Connection, habit: &NewHabit<'_>) -> Result<Habit, CadenceError> {
    habit.rule.validate()?;
    conn.execute(
        "INSERT INTO habits (id, user_id, title, description, priority, checklist_template_id, recurrence)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            habit.id,
            habit.user_id,
            habit.title,
            habit.description,
            habit.priority.as_str(),
            habit.checklist_template_id,
            habit.rule.to_json()?,
        ],
    )?;
    get_habit_by_id(conn, habit.id)
}

pub fn get_habit_by_id(conn: &Connection, id: &str) -> Result<Habit, CadenceError> {
    find_habit(conn, id)?.ok_or_else(|| CadenceError::habit_not_found(id))
}

pub fn find_habit(conn: &Connection, id: &str) -> Result<Option<Habit>, CadenceError> {
    let raw = conn
        .query_row(
            &format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1"),
            params![id],
            row_to_raw,
        )
        .optional()?;
    raw.map(RawHabit::into_habit).transpose()
}

/// Resolve a habit by exact id or unique id prefix.
pub fn resolve_habit(conn: &Connection, reference: &str) -> Result<Habit, CadenceError> {
    if let Some(habit) = find_habit(conn, reference)? {
        return Ok(habit);
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {HABIT_COLUMNS} FROM habits WHERE id LIKE ?1"
    ))?;
    let prefix = format!("{reference}%");
    let mut raws: Vec<RawHabit> = stmt
        .query_map(params![prefix], row_to_raw)?
        .collect::<Result<Vec<_>, _>>()?;

    match raws.len() {
        0 => Err(CadenceError::habit_not_found(reference)),
        1 => raws.remove(0).into_habit(),
        _ => {
            let candidates: Vec<String> = raws.iter().map(|h| format!("{} ({})", h.title, h.id)).collect();
            Err(CadenceError::ambiguous_ref(reference, &candidates))
        }
    }
}

/// All habits of a user. A row whose stored rule no longer parses fails the whole call.
pub fn list_habits(conn: &Connection, user_id: &str) -> Result<Vec<Habit>, CadenceError> {
    list_raw(conn, user_id, false)?
        .into_iter()
        .map(RawHabit::into_habit)
        .collect()
}

/// Active habits of a user, each parsed on its own so one corrupt rule only fails that habit.
pub fn list_active_habits(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<(String, Result<Habit, CadenceError>)>, CadenceError> {
    Ok(list_raw(conn, user_id, true)?
        .into_iter()
        .map(|raw| (raw.id.clone(), raw.into_habit()))
        .collect())
}

/// Users that own at least one habit.
pub fn list_user_ids(conn: &Connection) -> Result<Vec<String>, CadenceError> {
    let mut stmt = conn.prepare("SELECT DISTINCT user_id FROM habits ORDER BY user_id")?;
    let users = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(users)
}

pub fn set_active(conn: &Connection, id: &str, is_active: bool) -> Result<(), CadenceError> {
    let changed = conn.execute(
        "UPDATE habits SET is_active = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![is_active, id],
    )?;
    if changed == 0 {
        return Err(CadenceError::habit_not_found(id));
    }
    Ok(())
}

pub fn delete_habit(conn: &Connection, id: &str) -> Result<(), CadenceError> {
    let changed = conn.execute("DELETE FROM habits WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(CadenceError::habit_not_found(id));
    }
    Ok(())
}

/// Habit row with the rule still in its stored form.
struct RawHabit {
    id: String,
    user_id: String,
    title: String,
    description: Option<String>,
    priority: String,
    is_active: bool,
    checklist_template_id: Option<String>,
    recurrence: String,
    created_at: String,
    updated_at: String,
}

impl RawHabit {
    fn into_habit(self) -> Result<Habit, CadenceError> {
        let rule = RecurrenceRule::from_json(&self.recurrence)
            .map_err(|e| e.context(format!("habit {}", self.id)))?;
        Ok(Habit {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            priority: Priority::from_str(&self.priority).unwrap_or(Priority::Normal),
            is_active: self.is_active,
            checklist_template_id: self.checklist_template_id,
            rule,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn list_raw(conn: &Connection, user_id: &str, active_only: bool) -> Result<Vec<RawHabit>, CadenceError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {HABIT_COLUMNS} FROM habits
         WHERE user_id = ?1 AND (?2 = 0 OR is_active = 1)
         ORDER BY created_at ASC, id ASC"
    ))?;
    let raws = stmt
        .query_map(params![user_id, active_only], row_to_raw)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(raws)
}

fn row_to_raw(row: &rusqlite::Row) -> rusqlite::Result<RawHabit> {
    Ok(RawHabit {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        priority: row.get(4)?,
        is_active: row.get(5)?,
        checklist_template_id: row.get(6)?,
        recurrence: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
