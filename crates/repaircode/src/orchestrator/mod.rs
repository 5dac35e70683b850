//! Stage orchestration: analysis, fix planning and patching of a job.
//!
//! Every stage follows the same envelope (see [`Pipeline::run_stage`]):
//! claim the job, mark it running, emit `<stage>_start`, do the work, store
//! its result and mark the job done in one transaction, then emit
//! `<stage>_done`. Any failure marks the job failed and emits an `error`
//! event before the error is returned.

mod analysis;
mod fixes;
pub mod guard;
mod patch;

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{info_span, Instrument};

use crate::broadcast::ProgressBus;
use crate::chunking::{DEFAULT_MAX_CHARS_PER_CHUNK, DEFAULT_MAX_FILES_PER_CHUNK};
use crate::config::schema::DEFAULT_MAX_RETRIES;
use crate::config::Config;
use crate::error::{RepairError, Result};
use crate::jobs::{Job, JobStatus, JobStore, Stage};
use crate::llm::{call_with_retry, ModelClient};
use crate::models::{AnalysisResult, FixPlan, PatchSet};
use crate::patch::read_archive;
use crate::storage::ArchiveStore;
use crate::validation::{SchemaKind, Schemas};

use guard::ActiveStages;

/// Limits applied by the stages.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_files_per_chunk: usize,
    pub max_chars_per_chunk: usize,
    /// Attempts per model call, including the first.
    pub max_retries: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_files_per_chunk: DEFAULT_MAX_FILES_PER_CHUNK,
            max_chars_per_chunk: DEFAULT_MAX_CHARS_PER_CHUNK,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_files_per_chunk: config.chunking.max_files_per_chunk,
            max_chars_per_chunk: config.chunking.max_chars_per_chunk,
            max_retries: config.retry.max_retries,
        }
    }
}

/// Result of the patch stage.
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub patch_set: PatchSet,
    /// Rebuilt archive bytes, also persisted in the archive store.
    pub bytes: Vec<u8>,
    pub entries: usize,
    pub patched: usize,
    pub created: usize,
}

pub struct Pipeline {
    settings: PipelineSettings,
    model: Arc<dyn ModelClient>,
    store: Arc<dyn ArchiveStore>,
    jobs: JobStore,
    progress: ProgressBus,
    schemas: Schemas,
    active: ActiveStages,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        model: Arc<dyn ModelClient>,
        store: Arc<dyn ArchiveStore>,
        jobs: JobStore,
        progress: ProgressBus,
    ) -> Result<Self> {
        Ok(Self {
            settings,
            model,
            store,
            jobs,
            progress,
            schemas: Schemas::load()?,
            active: ActiveStages::new(),
        })
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    pub fn progress(&self) -> &ProgressBus {
        &self.progress
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Stage currently executing for `job_id` in this process.
    pub fn active_stage(&self, job_id: &str) -> Option<Stage> {
        self.active.current(job_id)
    }

    /// Registers an uploaded archive as a new `pending` job.
    ///
    /// The bytes must be a readable zip; nothing is stored otherwise.
    pub fn submit_archive(&self, bytes: &[u8]) -> Result<Job> {
        let entries = read_archive(bytes)?;
        let binary = entries.iter().filter(|e| e.as_text().is_none()).count();
        let job = self.jobs.create()?;
        self.store.save_original(&job.id, bytes)?;
        log::info!(
            "Accepted archive for job {} ({} text files, {} binary, {} bytes)",
            job.id,
            entries.len() - binary,
            binary,
            bytes.len()
        );
        Ok(job)
    }

    /// The rebuilt archive of a job whose patch stage has completed.
    pub fn fixed_archive(&self, job_id: &str) -> Result<Vec<u8>> {
        self.jobs.get_job(job_id)?;
        self.store.load_archive(job_id)
    }

    pub async fn run_analysis(&self, job_id: &str) -> Result<AnalysisResult> {
        self.run_stage(
            job_id,
            Stage::Analysis,
            "Starting analysis...",
            self.analyze(job_id),
            |jobs, analysis| jobs.complete_analysis(job_id, analysis),
            |analysis| json!({ "summary": analysis.summary, "issues": analysis.issues.len() }),
        )
        .await
    }

    pub async fn run_fixes(&self, job_id: &str) -> Result<FixPlan> {
        self.run_stage(
            job_id,
            Stage::Fixes,
            "Generating repair plans...",
            self.plan_fixes(job_id),
            |jobs, plan| jobs.complete_fixes(job_id, plan),
            |plan| json!({ "message": "Repair plans ready.", "fixes": plan.fixes.len() }),
        )
        .await
    }

    pub async fn run_patch(&self, job_id: &str) -> Result<PatchOutcome> {
        self.run_stage(
            job_id,
            Stage::Patch,
            "Generating patches...",
            self.patch(job_id),
            |jobs, outcome| jobs.complete_patch(job_id, &outcome.patch_set),
            |outcome| {
                json!({
                    "entries": outcome.entries,
                    "patched": outcome.patched,
                    "created": outcome.created,
                })
            },
        )
        .await
    }

    /// Runs analysis, fixes and patch in order, stopping at the first failure.
    pub async fn run_full(&self, job_id: &str) -> Result<PatchOutcome> {
        self.run_analysis(job_id).await?;
        self.run_fixes(job_id).await?;
        self.run_patch(job_id).await
    }

    pub fn spawn_analysis(self: &Arc<Self>, job_id: &str) -> JoinHandle<Result<AnalysisResult>> {
        let pipeline = Arc::clone(self);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            let result = pipeline.run_analysis(&job_id).await;
            log_outcome(&job_id, Stage::Analysis.as_str(), &result);
            result
        })
    }

    pub fn spawn_fixes(self: &Arc<Self>, job_id: &str) -> JoinHandle<Result<FixPlan>> {
        let pipeline = Arc::clone(self);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            let result = pipeline.run_fixes(&job_id).await;
            log_outcome(&job_id, Stage::Fixes.as_str(), &result);
            result
        })
    }

    pub fn spawn_patch(self: &Arc<Self>, job_id: &str) -> JoinHandle<Result<PatchOutcome>> {
        let pipeline = Arc::clone(self);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            let result = pipeline.run_patch(&job_id).await;
            log_outcome(&job_id, Stage::Patch.as_str(), &result);
            result
        })
    }

    /// Chains all three stages in one background task.
    pub fn spawn_full(self: &Arc<Self>, job_id: &str) -> JoinHandle<Result<PatchOutcome>> {
        let pipeline = Arc::clone(self);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            let result = pipeline.run_full(&job_id).await;
            log_outcome(&job_id, "pipeline", &result);
            result
        })
    }

    /// Common stage envelope. `work` is not polled until the job has been
    /// claimed and moved to `running`. `complete` persists the stage result
    /// and moves the job to `done`; nothing of the stage is recorded when it
    /// fails.
    async fn run_stage<T, Fut, C, D>(
        &self,
        job_id: &str,
        stage: Stage,
        start_message: &str,
        work: Fut,
        complete: C,
        done_payload: D,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
        C: FnOnce(&JobStore, &T) -> Result<Job>,
        D: FnOnce(&T) -> Value,
    {
        let tracker = self.progress.tracker(job_id);
        let _claim = match self.active.claim(job_id, stage) {
            Ok(claim) => claim,
            Err(e) => {
                tracker.error(stage.as_str(), &e.to_string());
                return Err(e);
            }
        };

        let span = info_span!("stage", job_id = %job_id, stage = %stage);
        async move {
            if let Err(e) = self.jobs.set_status(job_id, JobStatus::Running) {
                // The job was never started, so its status is left as is.
                let e = match e {
                    RepairError::InvalidTransition {
                        id,
                        from: JobStatus::Running,
                        ..
                    } => RepairError::StageAlreadyRunning { id, stage },
                    other => other,
                };
                tracker.error(stage.as_str(), &e.to_string());
                return Err(e);
            }
            tracker.emit(&stage.event("start"), json!({ "message": start_message }));

            let result: Result<T> = async {
                let value = work.await?;
                complete(&self.jobs, &value)?;
                Ok(value)
            }
            .await;

            match result {
                Ok(value) => {
                    tracker.emit(&stage.event("done"), done_payload(&value));
                    log::info!("{} finished for job {}", stage, job_id);
                    Ok(value)
                }
                Err(e) => {
                    let message = e.to_string();
                    if let Err(mark) = self.jobs.mark_failed(job_id, &message) {
                        log::error!("Could not mark job {} as failed: {}", job_id, mark);
                    }
                    tracker.error(stage.as_str(), &message);
                    log::error!("{} failed for job {}: {}", stage, job_id, message);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// One validated model call: retried until the output matches the
    /// `kind` schema, then decoded.
    async fn generate<T: DeserializeOwned>(
        &self,
        kind: SchemaKind,
        instruction: &str,
        prompt: &str,
    ) -> Result<T> {
        let validator = self.schemas.get(kind);
        let value = call_with_retry(
            self.settings.max_retries,
            || self.model.generate(instruction, prompt, validator.document()),
            |value: &Value| validator.validate(value),
        )
        .await?;
        Ok(validator.decode(value)?)
    }
}

fn log_outcome<T>(job_id: &str, what: &str, result: &Result<T>) {
    if let Err(e) = result {
        log::error!("Background {} task for job {} ended with error: {}", what, job_id, e);
    }
}
