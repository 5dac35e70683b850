//! Append-only patch history per job.

use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;

#[derive(Debug, Clone)]
pub struct PatchRow {
    pub id: i64,
    pub job_id: String,
    pub patch_json: String,
    pub created_at: String,
}

/// Appends a patch record and returns its row id.
pub fn insert(
    conn: &Connection,
    job_id: &str,
    patch_json: &str,
    now: &str,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO patches (job_id, patch_json, created_at) VALUES (?1, ?2, ?3)",
        params![job_id, patch_json, now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent patch record of a job.
pub fn latest(conn: &Connection, job_id: &str) -> Result<Option<PatchRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, job_id, patch_json, created_at FROM patches
             WHERE job_id = ?1 ORDER BY id DESC LIMIT 1",
            params![job_id],
            |r| {
                Ok(PatchRow {
                    id: r.get(0)?,
                    job_id: r.get(1)?,
                    patch_json: r.get(2)?,
                    created_at: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn count(conn: &Connection, job_id: &str) -> Result<u64, DatabaseError> {
    let n: u64 = conn.query_row(
        "SELECT COUNT(*) FROM patches WHERE job_id = ?1",
        params![job_id],
        |r| r.get(0),
    )?;
    Ok(n)
}
