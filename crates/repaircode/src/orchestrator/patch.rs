use super::{PatchOutcome, Pipeline};
use crate::error::{RepairError, Result};
use crate::jobs::Stage;
use crate::llm::prompts::{patch_prompt, PATCH_INSTRUCTION};
use crate::models::PatchSet;
use crate::patch::{build_archive, text_files};
use crate::validation::SchemaKind;

impl Pipeline {
    /// Generates edit instructions from the stored analysis and fixes, then
    /// rebuilds and stores the archive. The patch record itself is written
    /// by the stage envelope once the archive is in place.
    pub(super) async fn patch(&self, job_id: &str) -> Result<PatchOutcome> {
        let missing = |stage| RepairError::MissingStageOutput {
            id: job_id.to_string(),
            stage,
        };
        let analysis = self
            .jobs
            .get_analysis(job_id)?
            .ok_or_else(|| missing(Stage::Analysis))?;
        let fixes = self
            .jobs
            .get_fixes(job_id)?
            .ok_or_else(|| missing(Stage::Fixes))?;
        let entries = self.store.load_entries(job_id)?;
        let files = text_files(&entries);

        let prompt = patch_prompt(&analysis, &fixes, &files)?;
        let patch_set: PatchSet = self
            .generate(SchemaKind::Patches, PATCH_INSTRUCTION, &prompt)
            .await?;

        let rebuilt = build_archive(job_id, &entries, &patch_set, self.store.as_ref())?;
        Ok(PatchOutcome {
            patch_set,
            bytes: rebuilt.bytes,
            entries: rebuilt.entries,
            patched: rebuilt.patched,
            created: rebuilt.created,
        })
    }
}
