use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{RepairError, Result};
use crate::jobs::Stage;

/// In-process registry of stages currently executing, at most one per job.
#[derive(Default)]
pub struct ActiveStages {
    running: Mutex<HashMap<String, Stage>>,
}

impl ActiveStages {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Stage>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Active stage registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Reserves `job_id` for `stage`. The reservation lasts until the
    /// returned claim is dropped.
    pub fn claim(&self, job_id: &str, stage: Stage) -> Result<StageClaim<'_>> {
        let mut running = self.lock();
        if let Some(current) = running.get(job_id) {
            log::warn!(
                "Refusing {} for job {}: {} is still running",
                stage,
                job_id,
                current
            );
            return Err(RepairError::StageAlreadyRunning {
                id: job_id.to_string(),
                stage,
            });
        }
        running.insert(job_id.to_string(), stage);
        Ok(StageClaim {
            stages: self,
            job_id: job_id.to_string(),
        })
    }

    /// Stage currently holding `job_id`, if any.
    pub fn current(&self, job_id: &str) -> Option<Stage> {
        self.lock().get(job_id).copied()
    }
}

/// Releases the job when dropped.
pub struct StageClaim<'a> {
    stages: &'a ActiveStages,
    job_id: String,
}

impl Drop for StageClaim<'_> {
    fn drop(&mut self) {
        self.stages.lock().remove(&self.job_id);
    }
}
