//! Builders for archives and model responses.

#![allow(dead_code)]

use serde_json::{json, Value};

use repaircode::patch::{write_archive, write_zip};
use repaircode::{ArchiveEntry, SourceFile};

/// Zips `(path, content)` pairs in order.
pub fn zip_of(files: &[(&str, &str)]) -> Vec<u8> {
    let files: Vec<SourceFile> = files
        .iter()
        .map(|(path, content)| SourceFile::new(*path, *content))
        .collect();
    write_zip(&files).expect("Failed to build test archive")
}

/// Zips text `(path, content)` pairs followed by one binary entry.
pub fn zip_with_binary(files: &[(&str, &str)], binary_path: &str, bytes: &[u8]) -> Vec<u8> {
    let mut entries: Vec<ArchiveEntry> = files
        .iter()
        .map(|(path, content)| ArchiveEntry::Text(SourceFile::new(*path, *content)))
        .collect();
    entries.push(ArchiveEntry::Binary {
        path: binary_path.to_string(),
        bytes: bytes.to_vec(),
    });
    write_archive(&entries).expect("Failed to build test archive")
}

/// One issue entry of an analysis response.
pub fn issue(id: &str, file: &str, line: u32, severity: &str) -> Value {
    json!({
        "id": id,
        "file": file,
        "line": line,
        "severity": severity,
        "message": format!("Problem {} in {}", id, file),
    })
}

pub fn analysis_response(summary: &str, issues: Vec<Value>) -> Value {
    json!({ "summary": summary, "issues": issues })
}

/// A fix plan with one fix per issue id.
pub fn fixes_response(issue_ids: &[&str]) -> Value {
    let fixes: Vec<Value> = issue_ids
        .iter()
        .map(|id| json!({ "issueId": id, "description": format!("Fix {}", id) }))
        .collect();
    json!({ "fixes": fixes })
}

/// Builder for a patches response.
#[derive(Default)]
pub struct PatchResponseBuilder {
    patches: Vec<Value>,
}

impl PatchResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(mut self, file: &str, start: u32, end: u32, code: &str) -> Self {
        self.patches.push(json!({
            "file": file,
            "changes": [{ "type": "replace", "startLine": start, "endLine": end, "newCode": code }],
        }));
        self
    }

    pub fn delete(mut self, file: &str, start: u32, end: u32) -> Self {
        self.patches.push(json!({
            "file": file,
            "changes": [{ "type": "delete", "startLine": start, "endLine": end, "newCode": "" }],
        }));
        self
    }

    pub fn new_file(mut self, file: &str, code: &str) -> Self {
        self.patches.push(json!({
            "file": file,
            "newFile": true,
            "changes": [{ "type": "insert", "startLine": 1, "newCode": code }],
        }));
        self
    }

    /// Adds a patch whose changes are given verbatim.
    pub fn raw(mut self, file: &str, changes: Value) -> Self {
        self.patches.push(json!({ "file": file, "changes": changes }));
        self
    }

    pub fn build(self) -> Value {
        json!({ "patches": self.patches })
    }
}
