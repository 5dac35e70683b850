use std::path::PathBuf;
use thiserror::Error;

use crate::jobs::{JobStatus, Stage};

#[derive(Error, Debug)]
pub enum RepairError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Schema validation failed: {0}")]
    Validation(#[from] crate::validation::SchemaError),

    #[error("Model call failed: {0}")]
    Model(#[from] crate::llm::RetryExhausted),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Job {id} not found")]
    JobNotFound { id: String },

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("A stage is already running for job {id} (requested {stage})")]
    StageAlreadyRunning { id: String, stage: Stage },

    #[error("Job {id} has no {stage} output yet")]
    MissingStageOutput { id: String, stage: Stage },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Nothing stored at '{0}'")]
    NotFound(PathBuf),

    #[error("Invalid job id for storage: '{0}'")]
    InvalidJobId(String),
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error while handling archive: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive entry '{path}' exceeds {limit} bytes")]
    EntryTooLarge { path: String, limit: u64 },
}

pub type Result<T> = std::result::Result<T, RepairError>;
