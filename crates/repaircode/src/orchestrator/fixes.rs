use super::Pipeline;
use crate::error::{RepairError, Result};
use crate::jobs::Stage;
use crate::llm::prompts::{fixes_prompt, FIXES_INSTRUCTION};
use crate::models::FixPlan;
use crate::validation::SchemaKind;

impl Pipeline {
    /// Asks the model for a remediation per issue of the stored analysis.
    pub(super) async fn plan_fixes(&self, job_id: &str) -> Result<FixPlan> {
        let analysis =
            self.jobs
                .get_analysis(job_id)?
                .ok_or_else(|| RepairError::MissingStageOutput {
                    id: job_id.to_string(),
                    stage: Stage::Analysis,
                })?;

        let plan: FixPlan = self
            .generate(SchemaKind::Fixes, FIXES_INSTRUCTION, &fixes_prompt(&analysis)?)
            .await?;

        for issue_id in plan.dangling_issue_ids(&analysis) {
            log::warn!(
                "Fix for job {} references unknown issue '{}'",
                job_id,
                issue_id
            );
        }

        Ok(plan)
    }
}
