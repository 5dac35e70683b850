use serde_json::json;

use super::Pipeline;
use crate::chunking::chunk_files;
use crate::error::Result;
use crate::jobs::Stage;
use crate::llm::prompts::{analysis_prompt, ANALYSIS_INSTRUCTION};
use crate::models::AnalysisResult;
use crate::validation::SchemaKind;

impl Pipeline {
    /// Analyzes the job's files chunk by chunk and merges the results.
    pub(super) async fn analyze(&self, job_id: &str) -> Result<AnalysisResult> {
        let files = self.store.load_files(job_id)?;
        let chunks = chunk_files(
            &files,
            self.settings.max_files_per_chunk,
            self.settings.max_chars_per_chunk,
        );
        let total = chunks.len();
        let tracker = self.progress.tracker(job_id);
        log::info!(
            "Analyzing {} file(s) of job {} in {} chunk(s)",
            files.len(),
            job_id,
            total
        );

        let mut parts = Vec::with_capacity(total);
        for (index, chunk) in chunks.into_iter().enumerate() {
            let number = index + 1;
            tracker.emit(
                &Stage::Analysis.event("chunk_start"),
                json!({
                    "chunk": number,
                    "total": total,
                    "message": format!("Analyzing chunk {} of {}...", number, total),
                }),
            );

            let part: AnalysisResult = self
                .generate(
                    SchemaKind::Analysis,
                    ANALYSIS_INSTRUCTION,
                    &analysis_prompt(chunk),
                )
                .await?;
            log::debug!(
                "Chunk {}/{} of job {} reported {} issue(s)",
                number,
                total,
                job_id,
                part.issues.len()
            );
            parts.push(part);

            tracker.emit(
                &Stage::Analysis.event("chunk_done"),
                json!({ "chunk": number, "total": total }),
            );
        }

        Ok(AnalysisResult::merge(parts))
    }
}
