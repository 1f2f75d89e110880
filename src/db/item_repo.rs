use rusqlite::{params, Connection};

use crate::error::CadenceError;

/// Phase one of every task creation: the generic item row.
pub fn create_item(conn: &Connection, id: &str, user_id: &str, title: &str) -> Result<(), CadenceError> {
    conn.execute(
        "INSERT INTO items (id, user_id, kind, title) VALUES (?1, ?2, 'task', ?3)",
        params![id, user_id, title],
    )?;
    Ok(())
}

pub fn delete_item(conn: &Connection, id: &str) -> Result<(), CadenceError> {
    conn.execute("DELETE FROM items WHERE id = ?1", params![id])?;
    Ok(())
}

pub fn item_exists(conn: &Connection, id: &str) -> Result<bool, CadenceError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM items WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn count_items(conn: &Connection) -> Result<i64, CadenceError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
    Ok(count)
}
