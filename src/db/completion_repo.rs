use chrono::{DateTime, FixedOffset};
use rusqlite::{params, Connection};

use crate::error::CadenceError;
use crate::models::CompletionRecord;

/// Append a completion. Records are never updated afterwards.
pub fn record_completion(
    conn: &Connection,
    source_id: &str,
    completed_at: DateTime<FixedOffset>,
) -> Result<CompletionRecord, CadenceError> {
    let record = CompletionRecord {
        id: ulid::Ulid::new().to_string(),
        source_id: source_id.to_string(),
        completed_at,
    };
    conn.execute(
        "INSERT INTO completions (id, source_id, completed_at) VALUES (?1, ?2, ?3)",
        params![record.id, record.source_id, record.completed_at.to_rfc3339()],
    )?;
    Ok(record)
}

pub fn list_completions(conn: &Connection, source_id: &str) -> Result<Vec<CompletionRecord>, CadenceError> {
    let mut stmt = conn.prepare(
        "SELECT id, source_id, completed_at FROM completions
         WHERE source_id = ?1 ORDER BY completed_at DESC",
    )?;
    let rows = stmt
        .query_map(params![source_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, source_id, raw)| {
            let completed_at = DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| CadenceError::database(format!("Bad completion timestamp '{raw}': {e}")))?;
            Ok(CompletionRecord { id, source_id, completed_at })
        })
        .collect()
}
