use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;

use super::{Job, JobStatus, Stage};
use crate::db::job_repo::{self, JobRow};
use crate::db::{patch_repo, result_repo, Database, DatabaseError};
use crate::error::{RepairError, Result};
use crate::models::{AnalysisResult, FixPlan, PatchSet};

/// Persists job status and stage outputs.
///
/// Every status change is checked against [`JobStatus::can_transition_to`]
/// and stamped with an `updated_at` strictly later than the previous one.
#[derive(Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Creates a job in `pending`.
    pub fn create(&self) -> Result<Job> {
        let now = format_timestamp(now_micros());
        let row = JobRow {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Pending.as_str().to_string(),
            error: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.db.with_conn(|conn| job_repo::insert(conn, &row))?;
        log::info!("Created job {}", row.id);
        Ok(row_to_job(row)?)
    }

    pub fn get_job(&self, id: &str) -> Result<Job> {
        let row = self.db.with_conn(|conn| job_repo::find_by_id(conn, id))?;
        match row {
            Some(row) => Ok(row_to_job(row)?),
            None => Err(RepairError::JobNotFound { id: id.to_string() }),
        }
    }

    /// Moves a job to `status`, clearing any previous error.
    pub fn set_status(&self, id: &str, status: JobStatus) -> Result<Job> {
        self.transition(id, status, None)
    }

    /// Moves a running job to `failed` and records `message`.
    pub fn mark_failed(&self, id: &str, message: &str) -> Result<Job> {
        self.transition(id, JobStatus::Failed, Some(message))
    }

    fn transition(&self, id: &str, to: JobStatus, error: Option<&str>) -> Result<Job> {
        let outcome = self.db.with_conn(|conn| {
            let Some(current) = job_repo::find_by_id(conn, id)? else {
                return Ok(Err(RepairError::JobNotFound { id: id.to_string() }));
            };
            let from = parse_status(&current.status)?;
            if !from.can_transition_to(to) {
                return Ok(Err(RepairError::InvalidTransition {
                    id: id.to_string(),
                    from,
                    to,
                }));
            }

            let updated_at = next_timestamp(&current.updated_at)?;
            job_repo::update_status(conn, id, to.as_str(), error, &updated_at)?;
            Ok(Ok(JobRow {
                status: to.as_str().to_string(),
                error: error.map(str::to_string),
                updated_at,
                ..current
            }))
        })?;

        let row = outcome?;
        log::debug!("Job {} is now {}", id, to);
        Ok(row_to_job(row)?)
    }

    /// Stores the analysis, replacing any previous one and its fixes.
    pub fn save_analysis(&self, id: &str, analysis: &AnalysisResult) -> Result<()> {
        let json = serde_json::to_string(analysis)?;
        self.write_for_job(id, |conn, now| {
            result_repo::upsert_analysis(conn, id, &json, now)?;
            Ok(true)
        })?;
        log::info!(
            "Saved analysis for job {} ({} issues)",
            id,
            analysis.issues.len()
        );
        Ok(())
    }

    pub fn get_analysis(&self, id: &str) -> Result<Option<AnalysisResult>> {
        let row = self.db.with_conn(|conn| result_repo::find(conn, id))?;
        row.map(|r| decode_column("analysis_json", &r.analysis_json))
            .transpose()
    }

    /// Stores the fix plan. Requires an analysis for the job.
    pub fn save_fixes(&self, id: &str, fixes: &FixPlan) -> Result<()> {
        let json = serde_json::to_string(fixes)?;
        let stored = self.write_for_job(id, |conn, now| result_repo::set_fixes(conn, id, &json, now))?;
        if !stored {
            return Err(RepairError::MissingStageOutput {
                id: id.to_string(),
                stage: Stage::Analysis,
            });
        }
        log::info!("Saved {} fixes for job {}", fixes.fixes.len(), id);
        Ok(())
    }

    pub fn get_fixes(&self, id: &str) -> Result<Option<FixPlan>> {
        let row = self.db.with_conn(|conn| result_repo::find(conn, id))?;
        row.and_then(|r| r.fixes_json)
            .map(|json| decode_column("fixes_json", &json))
            .transpose()
    }

    /// Appends a patch record to the job's history.
    pub fn save_patch(&self, id: &str, patch_set: &PatchSet) -> Result<()> {
        let json = serde_json::to_string(patch_set)?;
        self.write_for_job(id, |conn, now| {
            patch_repo::insert(conn, id, &json, now)?;
            Ok(true)
        })?;
        log::info!(
            "Saved patch for job {} ({} files)",
            id,
            patch_set.patches.len()
        );
        Ok(())
    }

    pub fn latest_patch(&self, id: &str) -> Result<Option<PatchSet>> {
        let row = self.db.with_conn(|conn| patch_repo::latest(conn, id))?;
        row.map(|r| decode_column("patch_json", &r.patch_json))
            .transpose()
    }

    pub fn patch_count(&self, id: &str) -> Result<u64> {
        Ok(self.db.with_conn(|conn| patch_repo::count(conn, id))?)
    }

    /// Stores the analysis of a running job and marks it `done`.
    pub fn complete_analysis(&self, id: &str, analysis: &AnalysisResult) -> Result<Job> {
        let json = serde_json::to_string(analysis)?;
        self.complete(id, Stage::Analysis, |conn, now| {
            result_repo::upsert_analysis(conn, id, &json, now)?;
            Ok(true)
        })
    }

    /// Stores the fix plan of a running job and marks it `done`.
    pub fn complete_fixes(&self, id: &str, fixes: &FixPlan) -> Result<Job> {
        let json = serde_json::to_string(fixes)?;
        self.complete(id, Stage::Analysis, |conn, now| {
            result_repo::set_fixes(conn, id, &json, now)
        })
    }

    /// Appends a patch record for a running job and marks it `done`.
    pub fn complete_patch(&self, id: &str, patch_set: &PatchSet) -> Result<Job> {
        let json = serde_json::to_string(patch_set)?;
        self.complete(id, Stage::Patch, |conn, now| {
            patch_repo::insert(conn, id, &json, now)?;
            Ok(true)
        })
    }

    /// Runs `write` and moves the job from `running` to `done` in one
    /// transaction. When `write` stores nothing the prerequisite `requires`
    /// is reported missing and the transaction is rolled back.
    fn complete<F>(&self, id: &str, requires: Stage, write: F) -> Result<Job>
    where
        F: FnOnce(&Connection, &str) -> std::result::Result<bool, DatabaseError>,
    {
        let outcome = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let conn: &Connection = &tx;
            let Some(current) = job_repo::find_by_id(conn, id)? else {
                return Ok(Err(RepairError::JobNotFound { id: id.to_string() }));
            };
            let from = parse_status(&current.status)?;
            if !from.can_transition_to(JobStatus::Done) {
                return Ok(Err(RepairError::InvalidTransition {
                    id: id.to_string(),
                    from,
                    to: JobStatus::Done,
                }));
            }

            let updated_at = next_timestamp(&current.updated_at)?;
            if !write(conn, updated_at.as_str())? {
                return Ok(Err(RepairError::MissingStageOutput {
                    id: id.to_string(),
                    stage: requires,
                }));
            }
            job_repo::update_status(conn, id, JobStatus::Done.as_str(), None, &updated_at)?;
            tx.commit()?;

            Ok(Ok(JobRow {
                status: JobStatus::Done.as_str().to_string(),
                error: None,
                updated_at,
                ..current
            }))
        })?;

        let row = outcome?;
        log::debug!("Job {} is now {}", id, JobStatus::Done);
        Ok(row_to_job(row)?)
    }

    /// Number of jobs per status.
    pub fn status_counts(&self) -> Result<Vec<(JobStatus, u64)>> {
        let rows = self.db.with_conn(job_repo::count_by_status)?;
        rows.into_iter()
            .map(|(status, n)| -> Result<(JobStatus, u64)> { Ok((parse_status(&status)?, n)) })
            .collect()
    }

    /// Runs `write` for an existing job and bumps its `updated_at`, all under
    /// one lock. `write` returns whether it stored anything.
    fn write_for_job<F>(&self, id: &str, write: F) -> Result<bool>
    where
        F: FnOnce(&Connection, &str) -> std::result::Result<bool, DatabaseError>,
    {
        let outcome = self.db.with_conn(|conn| {
            let Some(current) = job_repo::find_by_id(conn, id)? else {
                return Ok(None);
            };
            let now = next_timestamp(&current.updated_at)?;
            let stored = write(conn, now.as_str())?;
            if stored {
                job_repo::touch(conn, id, &now)?;
            }
            Ok(Some(stored))
        })?;

        outcome.ok_or_else(|| RepairError::JobNotFound { id: id.to_string() })
    }
}

fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &'static str, value: &str) -> std::result::Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidValue {
            column,
            value: value.to_string(),
        })
}

/// The current time, or one microsecond after `previous` when the clock has
/// not moved past it.
fn next_timestamp(previous: &str) -> std::result::Result<String, DatabaseError> {
    let previous = parse_timestamp("updated_at", previous)?;
    let now = now_micros();
    let next = if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    };
    Ok(format_timestamp(next))
}

fn parse_status(value: &str) -> std::result::Result<JobStatus, DatabaseError> {
    JobStatus::parse(value).ok_or_else(|| DatabaseError::InvalidValue {
        column: "status",
        value: value.to_string(),
    })
}

fn row_to_job(row: JobRow) -> std::result::Result<Job, DatabaseError> {
    Ok(Job {
        status: parse_status(&row.status)?,
        created_at: parse_timestamp("created_at", &row.created_at)?,
        updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        id: row.id,
        error: row.error,
    })
}

fn decode_column<T: DeserializeOwned>(column: &'static str, json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| {
        RepairError::Database(DatabaseError::InvalidValue {
            column,
            value: e.to_string(),
        })
    })
}
