//! Stage payloads shared by the model client, the job store and the patch engine.
//!
//! Field names follow the JSON contracts in `schema/*.json` (camelCase), so
//! the same types deserialize model output and persisted stage results.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One text file extracted from an uploaded archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path inside the archive, `/`-separated.
    pub path: String,
    /// Full UTF-8 content.
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Size used for chunk budgeting, in characters.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// One file entry of an uploaded archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEntry {
    /// UTF-8 content, shown to the model and open to patches.
    Text(SourceFile),
    /// Anything else, carried into the rebuilt archive byte for byte.
    Binary { path: String, bytes: Vec<u8> },
}

impl ArchiveEntry {
    pub fn path(&self) -> &str {
        match self {
            ArchiveEntry::Text(file) => &file.path,
            ArchiveEntry::Binary { path, .. } => path,
        }
    }

    pub fn as_text(&self) -> Option<&SourceFile> {
        match self {
            ArchiveEntry::Text(file) => Some(file),
            ArchiveEntry::Binary { .. } => None,
        }
    }
}

/// Issue severity as reported by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A detected problem with a source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Model-assigned identifier, referenced by fixes.
    pub id: String,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub severity: Severity,
    pub message: String,
}

/// Result of the analysis stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub issues: Vec<Issue>,
}

impl AnalysisResult {
    /// Merges per-chunk results: summaries joined by a blank line, issues
    /// concatenated in chunk order without de-duplication.
    pub fn merge(parts: impl IntoIterator<Item = AnalysisResult>) -> Self {
        let mut summaries = Vec::new();
        let mut issues = Vec::new();
        for part in parts {
            summaries.push(part.summary);
            issues.extend(part.issues);
        }
        Self {
            summary: summaries.join("\n\n"),
            issues,
        }
    }
}

/// Remediation proposed for one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    pub issue_id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
}

/// Result of the fix-planning stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixPlan {
    pub fixes: Vec<Fix>,
}

impl FixPlan {
    /// Issue ids referenced by a fix but absent from the analysis.
    pub fn dangling_issue_ids<'a>(&'a self, analysis: &AnalysisResult) -> Vec<&'a str> {
        let known: HashSet<&str> = analysis.issues.iter().map(|i| i.id.as_str()).collect();
        self.fixes
            .iter()
            .map(|f| f.issue_id.as_str())
            .filter(|id| !known.contains(id))
            .collect()
    }
}

/// Kind of a line edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Delete,
    Replace,
    /// Anything else the model emitted. Skipped by the applier.
    #[serde(other)]
    Unknown,
}

/// One line-range edit instruction. Lines are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub start_line: u32,
    /// Inclusive end; defaults to `start_line`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub new_code: String,
}

impl Change {
    pub fn insert(start_line: u32, new_code: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Insert,
            start_line,
            end_line: None,
            new_code: new_code.into(),
        }
    }

    pub fn delete(start_line: u32, end_line: u32) -> Self {
        Self {
            kind: ChangeKind::Delete,
            start_line,
            end_line: Some(end_line),
            new_code: String::new(),
        }
    }

    pub fn replace(start_line: u32, end_line: u32, new_code: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Replace,
            start_line,
            end_line: Some(end_line),
            new_code: new_code.into(),
        }
    }

    /// Inclusive end line, falling back to the start line.
    pub fn last_line(&self) -> u32 {
        self.end_line.unwrap_or(self.start_line)
    }
}

/// Edits targeting one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePatch {
    pub file: String,
    #[serde(default)]
    pub new_file: bool,
    #[serde(default)]
    pub changes: Vec<Change>,
}

/// Edit instructions for a whole job, as returned by the patch stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
    #[serde(default)]
    pub patches: Vec<FilePatch>,
}
