use crate::error::{HarnessError, ToolError};
use regex::Regex;
use std::{collections::BTreeMap, future::Future, time::Duration};

/// Bounded retry of provisioning steps whose failure matches a known
/// transient pattern.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries:          usize,
    time_between_retries: Duration,
    retryable_errors:     Vec<(Regex, String)>,
}

impl RetryPolicy {
    pub fn new(
        max_retries: usize,
        time_between_retries: Duration,
        retryable_errors: &BTreeMap<String, String>,
    ) -> Result<Self, HarnessError> {
        let retryable_errors = retryable_errors
            .iter()
            .map(|(pattern, reason)| {
                Regex::new(pattern)
                    .map(|regex| (regex, reason.clone()))
                    .map_err(|e| {
                        HarnessError::Config(format!("invalid retryable error `{pattern}`: {e}"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            max_retries,
            time_between_retries,
            retryable_errors,
        })
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries:          0,
            time_between_retries: Duration::ZERO,
            retryable_errors:     Vec::new(),
        }
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Returns the justification of the first pattern matching `message`.
    pub fn retry_reason(&self, message: &str) -> Option<&str> {
        self.retryable_errors
            .iter()
            .find(|(regex, _)| regex.is_match(message))
            .map(|(_, reason)| reason.as_str())
    }

    /// Runs `op`, re-running it at most `max_retries` more times while its
    /// failure is retryable.
    pub async fn run<T, F, Fut>(&self, step: &str, mut op: F) -> Result<T, HarnessError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match op().await {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::info!(step, attempts, "Succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let message = err.message();
            let reason = if err.is_retryable_kind() {
                self.retry_reason(&message)
            } else {
                None
            };

            match reason {
                Some(reason) if attempts <= self.max_retries => {
                    tracing::warn!(
                        step,
                        attempt = attempts,
                        max_retries = self.max_retries,
                        reason,
                        "Retryable error, trying again in {:?}",
                        self.time_between_retries
                    );
                    tokio::time::sleep(self.time_between_retries).await;
                }
                Some(_) => {
                    tracing::error!(step, attempts, "Giving up after exhausting retries");
                    return Err(HarnessError::ProvisioningFailed {
                        step: step.to_owned(),
                        attempts,
                        message,
                    });
                }
                None => {
                    tracing::error!(step, attempts, error = %err, "Non-retryable error");
                    return Err(HarnessError::ProvisioningFailed {
                        step: step.to_owned(),
                        attempts,
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}
