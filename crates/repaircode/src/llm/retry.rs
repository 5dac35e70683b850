use std::future::Future;

use thiserror::Error;

use super::LlmError;
use crate::validation::SchemaError;

/// Why a single attempt did not produce an accepted result.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Call(#[from] LlmError),

    #[error(transparent)]
    Validation(#[from] SchemaError),
}

/// Every attempt failed; `last` is the failure of the final attempt.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {last}")]
pub struct RetryExhausted {
    pub attempts: u32,
    #[source]
    pub last: AttemptError,
}

/// Runs `call` until it both succeeds and passes `validate`, at most
/// `max_retries` times (at least once). Attempts run back to back with no
/// delay and stop at the first accepted result.
pub async fn call_with_retry<T, F, Fut, V>(
    max_retries: u32,
    mut call: F,
    validate: V,
) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
    V: Fn(&T) -> Result<(), SchemaError>,
{
    let attempts = max_retries.max(1);
    let mut attempt = 1;

    loop {
        let failure = match call().await {
            Ok(value) => match validate(&value) {
                Ok(()) => return Ok(value),
                Err(e) => AttemptError::Validation(e),
            },
            Err(e) => AttemptError::Call(e),
        };

        log::warn!("Model attempt {}/{} failed: {}", attempt, attempts, failure);

        if attempt >= attempts {
            return Err(RetryExhausted {
                attempts,
                last: failure,
            });
        }
        attempt += 1;
    }
}
