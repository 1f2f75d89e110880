use std::fs;
use std::path::PathBuf;

use rusqlite::Connection;

use crate::config;
use crate::error::CadenceError;

use super::migrations;

/// Open a connection to the database. Returns error if not initialized.
pub fn open_db() -> Result<Connection, CadenceError> {
    let path = config::db_path()?;
    if !path.exists() {
        return Err(CadenceError::not_initialized());
    }
    let conn = Connection::open(&path)?;
    configure_connection(&conn)?;
    // Older databases pick up new tables and indexes here.
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

/// Initialize the database: create the data home, the database, and run migrations.
pub fn init_db() -> Result<PathBuf, CadenceError> {
    let path = config::db_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CadenceError::database(e.to_string()))?;
    }
    let conn = Connection::open(&path)?;
    configure_connection(&conn)?;
    migrations::run_migrations(&conn)?;
    Ok(path)
}

/// Fresh in-memory database with the full schema.
pub fn open_in_memory() -> Result<Connection, CadenceError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> Result<(), CadenceError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA busy_timeout=5000;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}
