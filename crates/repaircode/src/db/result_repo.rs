//! Stage results: one `analysis_results` row per job holding the analysis
//! and, once planned, the fixes.

use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;

#[derive(Debug, Clone)]
pub struct ResultRow {
    pub job_id: String,
    pub analysis_json: String,
    pub fixes_json: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Stores the analysis for a job. A previous analysis is replaced and its
/// fixes are cleared, since they were planned against the old issues.
pub fn upsert_analysis(
    conn: &Connection,
    job_id: &str,
    analysis_json: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO analysis_results (job_id, analysis_json, fixes_json, created_at, updated_at)
         VALUES (?1, ?2, NULL, ?3, ?3)
         ON CONFLICT(job_id) DO UPDATE SET
             analysis_json = excluded.analysis_json,
             fixes_json = NULL,
             updated_at = excluded.updated_at",
        params![job_id, analysis_json, now],
    )?;
    Ok(())
}

/// Attaches fixes to an existing analysis row. Returns false if there is none.
pub fn set_fixes(
    conn: &Connection,
    job_id: &str,
    fixes_json: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE analysis_results SET fixes_json = ?2, updated_at = ?3 WHERE job_id = ?1",
        params![job_id, fixes_json, now],
    )?;
    Ok(changed > 0)
}

pub fn find(conn: &Connection, job_id: &str) -> Result<Option<ResultRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT job_id, analysis_json, fixes_json, created_at, updated_at
             FROM analysis_results WHERE job_id = ?1",
            params![job_id],
            |r| {
                Ok(ResultRow {
                    job_id: r.get(0)?,
                    analysis_json: r.get(1)?,
                    fixes_json: r.get(2)?,
                    created_at: r.get(3)?,
                    updated_at: r.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo::{self, JobRow};
    use crate::db::Database;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            job_repo::insert(
                conn,
                &JobRow {
                    id: "job-1".to_string(),
                    status: "running".to_string(),
                    error: None,
                    created_at: "t0".to_string(),
                    updated_at: "t0".to_string(),
                },
            )
        })
        .unwrap();
        db
    }

    #[test]
    fn test_fixes_require_an_analysis_row() {
        let db = setup();
        db.with_conn(|conn| {
            assert!(!set_fixes(conn, "job-1", "{}", "t1")?);
            assert!(find(conn, "job-1")?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_new_analysis_clears_fixes() {
        let db = setup();
        db.with_conn(|conn| {
            upsert_analysis(conn, "job-1", r#"{"v":1}"#, "t1")?;
            assert!(set_fixes(conn, "job-1", r#"{"fixes":[]}"#, "t2")?);
            assert!(find(conn, "job-1")?.unwrap().fixes_json.is_some());

            upsert_analysis(conn, "job-1", r#"{"v":2}"#, "t3")?;
            let row = find(conn, "job-1")?.unwrap();
            assert_eq!(row.analysis_json, r#"{"v":2}"#);
            assert!(row.fixes_json.is_none());
            assert_eq!(row.created_at, "t1");
            assert_eq!(row.updated_at, "t3");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_results_need_an_existing_job() {
        let db = setup();
        let result = db.with_conn(|conn| upsert_analysis(conn, "ghost", "{}", "t1"));
        assert!(matches!(result, Err(DatabaseError::Sqlite(_))));
    }
}
