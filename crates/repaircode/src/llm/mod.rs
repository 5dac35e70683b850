//! Structured-output model access.
//!
//! [`ModelClient`] is the seam to the model vendor. The pipeline only ever
//! calls it through [`call_with_retry`], which re-checks every response
//! against the stage schema.

pub mod gemini;
pub mod prompts;
pub mod retry;
pub mod scripted;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use gemini::GeminiClient;
pub use retry::{call_with_retry, AttemptError, RetryExhausted};
pub use scripted::ScriptedClient;

/// Errors raised while talking to a model endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model returned no content")]
    EmptyResponse,

    #[error("Model returned invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("No scripted response left for call {call}")]
    ScriptExhausted { call: usize },

    #[error("{0}")]
    Other(String),
}

/// Produces JSON shaped by a schema.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Runs one model call with a system `instruction`, a user `prompt` and
    /// the JSON schema the answer must follow.
    async fn generate(
        &self,
        instruction: &str,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, LlmError>;
}
