//! Replays canned model responses.
//!
//! Used for offline runs (`repaircode --replay responses.json`) and by the
//! test-suite. Responses are consumed in order, one per `generate` call.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{LlmError, ModelClient};

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub instruction: String,
    pub prompt: String,
}

#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<Value, LlmError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client that answers with `responses`, in order.
    pub fn with_responses(responses: impl IntoIterator<Item = Value>) -> Self {
        let client = Self::new();
        for response in responses {
            client.push_response(response);
        }
        client
    }

    pub fn push_response(&self, response: Value) {
        self.queue().push_back(Ok(response));
    }

    pub fn push_error(&self, error: LlmError) {
        self.queue().push_back(Err(error));
    }

    /// Number of `generate` calls seen so far.
    pub fn call_count(&self) -> usize {
        self.recorded().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.recorded().clone()
    }

    pub fn remaining(&self) -> usize {
        self.queue().len()
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<Value, LlmError>>> {
        match self.responses.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn recorded(&self) -> std::sync::MutexGuard<'_, Vec<RecordedCall>> {
        match self.calls.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn generate(
        &self,
        instruction: &str,
        prompt: &str,
        _schema: &Value,
    ) -> Result<Value, LlmError> {
        let call = {
            let mut calls = self.recorded();
            calls.push(RecordedCall {
                instruction: instruction.to_string(),
                prompt: prompt.to_string(),
            });
            calls.len()
        };

        self.queue()
            .pop_front()
            .unwrap_or(Err(LlmError::ScriptExhausted { call }))
    }
}
