//! Test harness for isolated pipeline runs.
//!
//! Every harness owns a temp data directory, an in-memory database and a
//! `ScriptedClient`, so tests never touch the network or each other.

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

use repaircode::db::Database;
use repaircode::patch::{read_archive, read_zip};
use repaircode::{
    ArchiveEntry, ArchiveStore, FilesystemStore, Job, JobStore, Pipeline, PipelineSettings,
    ProgressBus, ProgressEvent, ScriptedClient, SourceFile, StorageError,
};

use super::builders::zip_of;

pub struct TestHarness {
    temp_dir: TempDir,
    pub model: Arc<ScriptedClient>,
    pub store: Arc<dyn ArchiveStore>,
    pub pipeline: Arc<Pipeline>,
}

impl TestHarness {
    /// Harness with default chunking and retry limits.
    pub fn new() -> Self {
        Self::with_settings(PipelineSettings::default())
    }

    pub fn with_settings(settings: PipelineSettings) -> Self {
        Self::build(settings, |dir| -> Arc<dyn ArchiveStore> {
            Arc::new(FilesystemStore::new(dir))
        })
    }

    /// Harness whose store accepts uploads but fails every rebuilt-archive
    /// write.
    pub fn with_read_only_output() -> Self {
        Self::build(PipelineSettings::default(), |dir| -> Arc<dyn ArchiveStore> {
            Arc::new(ReadOnlyOutputStore(FilesystemStore::new(dir)))
        })
    }

    fn build<F>(settings: PipelineSettings, make_store: F) -> Self
    where
        F: FnOnce(&Path) -> Arc<dyn ArchiveStore>,
    {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let model = Arc::new(ScriptedClient::new());
        let store = make_store(temp_dir.path());
        let database = Database::open_in_memory().expect("Failed to open database");

        let pipeline = Pipeline::new(
            settings,
            model.clone(),
            store.clone(),
            JobStore::new(database),
            ProgressBus::new(),
        )
        .expect("Failed to build pipeline");

        Self {
            temp_dir,
            model,
            store,
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn jobs(&self) -> &JobStore {
        self.pipeline.jobs()
    }

    /// Queues model responses, consumed one per call.
    pub fn respond(&self, responses: impl IntoIterator<Item = Value>) {
        for response in responses {
            self.model.push_response(response);
        }
    }

    /// Submits an archive built from `(path, content)` pairs.
    pub fn submit(&self, files: &[(&str, &str)]) -> Job {
        self.pipeline
            .submit_archive(&zip_of(files))
            .expect("Failed to submit archive")
    }

    /// Submits raw archive bytes.
    pub fn submit_bytes(&self, bytes: &[u8]) -> Job {
        self.pipeline
            .submit_archive(bytes)
            .expect("Failed to submit archive")
    }

    pub fn subscribe(&self, job_id: &str) -> UnboundedReceiver<ProgressEvent> {
        self.pipeline.progress().subscribe_channel(job_id).1
    }

    /// Files of the rebuilt archive of `job_id`.
    pub fn fixed_files(&self, job_id: &str) -> Vec<SourceFile> {
        let bytes = self
            .pipeline
            .fixed_archive(job_id)
            .expect("Fixed archive missing");
        read_zip(&bytes).expect("Fixed archive unreadable")
    }

    /// Every entry of the rebuilt archive of `job_id`, binary ones included.
    pub fn fixed_entries(&self, job_id: &str) -> Vec<ArchiveEntry> {
        let bytes = self
            .pipeline
            .fixed_archive(job_id)
            .expect("Fixed archive missing");
        read_archive(&bytes).expect("Fixed archive unreadable")
    }
}

/// Filesystem store that refuses to write rebuilt archives.
pub struct ReadOnlyOutputStore(FilesystemStore);

impl ArchiveStore for ReadOnlyOutputStore {
    fn save_original(&self, job_id: &str, bytes: &[u8]) -> repaircode::Result<()> {
        self.0.save_original(job_id, bytes)
    }

    fn load_entries(&self, job_id: &str) -> repaircode::Result<Vec<ArchiveEntry>> {
        self.0.load_entries(job_id)
    }

    fn save_archive(&self, job_id: &str, _bytes: &[u8]) -> repaircode::Result<()> {
        Err(StorageError::WriteFile {
            path: PathBuf::from(job_id).join("fixed.zip"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "output is read-only"),
        }
        .into())
    }

    fn load_archive(&self, job_id: &str) -> repaircode::Result<Vec<u8>> {
        self.0.load_archive(job_id)
    }
}

/// Drains every event already published to `rx`.
pub fn drain(rx: &mut UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Event names, in delivery order.
pub fn names(events: &[ProgressEvent]) -> Vec<&str> {
    events.iter().map(|e| e.event.as_str()).collect()
}
