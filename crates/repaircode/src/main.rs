use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde_json::Value;

use repaircode::config::{load_config, Config};
use repaircode::db::Database;
use repaircode::telemetry::init_logging;
use repaircode::{
    FilesystemStore, GeminiClient, JobStore, ModelClient, Pipeline, PipelineSettings, ProgressBus,
    ScriptedClient,
};

#[derive(Parser)]
#[command(name = "repaircode")]
#[command(version, about = "Analyze a zipped repository and write a repaired copy")]
struct Cli {
    /// Zip archive of the repository to repair
    archive: PathBuf,

    /// Path to repaircode.json. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write the repaired archive (defaults to <archive>.fixed.zip)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Replay model responses from a JSON array instead of calling the model
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    init_logging(cli.log_json).context("Failed to initialize logging")?;

    info!("Starting repaircode v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let database = Database::open(&config.database_path()).context("Failed to open database")?;
    let store = Arc::new(FilesystemStore::new(config.data_dir()));
    let model = model_client(&cli, &config)?;

    let pipeline = Arc::new(Pipeline::new(
        PipelineSettings::from_config(&config),
        model,
        store,
        JobStore::new(database),
        ProgressBus::new(),
    )?);

    let bytes = std::fs::read(&cli.archive)
        .with_context(|| format!("Failed to read {}", cli.archive.display()))?;
    let job = pipeline.submit_archive(&bytes)?;
    info!("Created job {}", job.id);

    let (subscription, mut events) = pipeline.progress().subscribe_channel(&job.id);
    let mut task = pipeline.spawn_full(&job.id);

    let outcome = loop {
        tokio::select! {
            Some(event) = events.recv() => print!("{}", event.to_sse()),
            joined = &mut task => break joined,
        }
    };
    // Flush whatever was published between the last recv and task exit.
    while let Ok(event) = events.try_recv() {
        print!("{}", event.to_sse());
    }
    pipeline.progress().unsubscribe(&job.id, subscription);

    let outcome = outcome.context("Pipeline task panicked")??;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.archive));
    std::fs::write(&output, &outcome.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        "Wrote {} ({} entries, {} patched, {} new)",
        output.display(),
        outcome.entries,
        outcome.patched,
        outcome.created
    );
    info!(
        "Job {} has {} recorded patch set(s)",
        job.id,
        pipeline.jobs().patch_count(&job.id)?
    );
    for (status, count) in pipeline.jobs().status_counts()? {
        info!("Jobs {}: {}", status, count);
    }

    Ok(())
}

fn model_client(cli: &Cli, config: &Config) -> Result<Arc<dyn ModelClient>> {
    if let Some(path) = &cli.replay {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let responses: Vec<Value> = serde_json::from_str(&content)
            .with_context(|| format!("{} must hold a JSON array", path.display()))?;
        info!("Replaying {} recorded model response(s)", responses.len());
        return Ok(Arc::new(ScriptedClient::with_responses(responses)));
    }

    let api_key = config
        .model
        .resolve_api_key()
        .context("No model API key configured")?;
    let client = GeminiClient::new(&config.model, api_key)?;
    info!("Using model {}", config.model.name);
    Ok(Arc::new(client))
}

fn default_output_path(archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    archive.with_file_name(format!("{}.fixed.zip", stem))
}
