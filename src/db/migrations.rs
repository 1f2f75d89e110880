use rusqlite::Connection;

use crate::error::CadenceError;

pub fn run_migrations(conn: &Connection) -> Result<(), CadenceError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL DEFAULT 'task'
                CHECK (kind IN ('task')),
            title TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS habits (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            priority TEXT NOT NULL DEFAULT 'normal'
                CHECK (priority IN ('low', 'normal', 'high')),
            is_active INTEGER NOT NULL DEFAULT 1,
            checklist_template_id TEXT,
            recurrence TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS task_instances (
            id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL UNIQUE REFERENCES items(id),
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'on_deck'
                CHECK (status IN ('on_deck', 'active', 'completed', 'habit')),
            priority TEXT NOT NULL DEFAULT 'normal'
                CHECK (priority IN ('low', 'normal', 'high')),
            assigned_date TEXT,
            due_date TEXT,
            reminder_time TEXT,
            habit_id TEXT,
            project_id TEXT,
            checklist_template_id TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            completed_at TEXT,
            CHECK (habit_id IS NULL OR project_id IS NULL)
        );

        CREATE TABLE IF NOT EXISTS completions (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            completed_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'on_hold', 'completed')),
            progress INTEGER NOT NULL DEFAULT 0
                CHECK (progress BETWEEN 0 AND 100),
            current_step INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS project_steps (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            description TEXT,
            order_number INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'in_progress', 'completed')),
            priority TEXT NOT NULL DEFAULT 'normal'
                CHECK (priority IN ('low', 'normal', 'high')),
            due_date TEXT,
            assigned_date TEXT,
            is_converted INTEGER NOT NULL DEFAULT 0,
            converted_task_id TEXT,
            completed_at TEXT,
            UNIQUE (project_id, order_number)
        );

        -- One open instance per habit and day. Closes the check-then-insert race in
        -- the generator: the loser of a concurrent create hits this index.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_open_habit_day
            ON task_instances(habit_id, assigned_date)
            WHERE habit_id IS NOT NULL AND status != 'completed';

        CREATE INDEX IF NOT EXISTS idx_tasks_habit_status ON task_instances(habit_id, status);
        CREATE INDEX IF NOT EXISTS idx_tasks_project ON task_instances(project_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_assigned ON task_instances(assigned_date);
        CREATE INDEX IF NOT EXISTS idx_habits_user ON habits(user_id, is_active);
        CREATE INDEX IF NOT EXISTS idx_completions_source ON completions(source_id, completed_at);
        CREATE INDEX IF NOT EXISTS idx_steps_task ON project_steps(converted_task_id);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('items', 'habits', 'task_instances', 'completions', 'projects', 'project_steps')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 6);
    }
}
