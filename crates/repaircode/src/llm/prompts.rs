//! System instructions and prompt rendering for the three stages.

use crate::models::{AnalysisResult, FixPlan, SourceFile};

pub const ANALYSIS_INSTRUCTION: &str = "You are a senior full-stack architect and security expert. \
Analyze the provided files and identify problems in security, performance and code quality. \
Every issue needs a unique id, the file path exactly as given, the line number when known, \
a severity and a concise message. Output strictly valid JSON following the provided schema.";

pub const FIXES_INSTRUCTION: &str = "You are a senior engineer. Propose a solution for each issue \
found by the analysis. For every issueId return a short description of the fix and its impact. \
Output strictly valid JSON following the provided schema.";

pub const PATCH_INSTRUCTION: &str = "You are a code transformation engine. Generate precise, minimal \
and safe patch instructions for the provided repository.

Rules for patch generation:
1. Only generate patches for files that were explicitly provided in the FILES section, unless a fix requires a new file; mark such patches with newFile=true.
2. Never modify code outside the specified line ranges.
3. All line numbers are 1-indexed and must correspond exactly to the provided file content.
4. All patches must be minimal: change only what is necessary to implement the fix.
5. Preserve existing indentation, formatting and code style.
6. newCode must contain ONLY code: no explanations and no markdown.
7. If a fix cannot be applied safely, skip it rather than guessing.
8. Do not merge unrelated changes into a single change block, and never emit overlapping line ranges for one file.
9. Do not include any text outside the final JSON object.";

/// Renders files as `FILE: <path>` blocks separated by blank lines.
pub fn render_files<'a>(files: impl IntoIterator<Item = &'a SourceFile>) -> String {
    files
        .into_iter()
        .map(|f| format!("FILE: {}\n---\n{}", f.path, f.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn analysis_prompt(files: &[SourceFile]) -> String {
    format!(
        "Analyze the following repository files:\n\n{}",
        render_files(files)
    )
}

pub fn fixes_prompt(analysis: &AnalysisResult) -> Result<String, serde_json::Error> {
    Ok(format!(
        "Propose solutions for this analysis:\n\n{}",
        serde_json::to_string_pretty(analysis)?
    ))
}

pub fn patch_prompt(
    analysis: &AnalysisResult,
    fixes: &FixPlan,
    files: &[SourceFile],
) -> Result<String, serde_json::Error> {
    Ok(format!(
        "ANALYSIS:\n{}\n\nFIXES:\n{}\n\nFILES:\n{}\n",
        serde_json::to_string_pretty(analysis)?,
        serde_json::to_string_pretty(fixes)?,
        render_files(files)
    ))
}
