pub mod broadcast;
pub mod chunking;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod patch;
pub mod secrets;
pub mod storage;
pub mod telemetry;
pub mod validation;

pub use broadcast::{
    ChannelSink, ProgressBus, ProgressEvent, ProgressSink, ProgressTracker, SubscriptionId,
};
pub use chunking::chunk_files;
pub use config::{load_config, Config};
pub use error::{ArchiveError, ConfigError, RepairError, Result, StorageError};
pub use jobs::{Job, JobStatus, JobStore, Stage};
pub use llm::{call_with_retry, GeminiClient, LlmError, ModelClient, RetryExhausted, ScriptedClient};
pub use models::{
    AnalysisResult, ArchiveEntry, Change, ChangeKind, FilePatch, Fix, FixPlan, Issue, PatchSet, Severity,
    SourceFile,
};
pub use orchestrator::{PatchOutcome, Pipeline, PipelineSettings};
pub use patch::{apply_patch, build_archive, read_archive, render_archive};
pub use secrets::{resolve_secret, SecretError, SecretSource};
pub use storage::{ArchiveStore, FilesystemStore};
pub use validation::{SchemaError, SchemaKind, Schemas};
