//! Retry with exponential backoff, jitter, and cancellation.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::classify::{Classify, ErrorClass, ErrorClassifier};
use crate::types::RetrySettings;

/// Relative jitter applied to every backoff (±20%).
pub const BACKOFF_JITTER: f64 = 0.2;

/// Outcome of an operation that did not succeed under the retry policy.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Cancelled before or between attempts.
    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    /// Every attempt failed with a transient error.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: E,
    },

    /// Failed with a terminal or cancellation-class error.
    #[error(transparent)]
    NotRetryable(E),
}

impl<E> RetryError<E> {
    /// Whether the retry loop stopped because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// The last error returned by the operation, if any attempt ran.
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Cancelled { .. } => None,
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::NotRetryable(source) => Some(source),
        }
    }
}

/// Retry policy: settings plus the classifier deciding what is worth retrying.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    settings: RetrySettings,
    classifier: ErrorClassifier,
}

impl RetryPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self {
            settings,
            classifier: ErrorClassifier::default(),
        }
    }

    /// Replace the error classifier.
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Backoff before retry number `attempt + 1`, without jitter.
    ///
    /// `initial * multiplier^attempt`, capped at the maximum backoff.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let initial: f64 = self.settings.initial_backoff_ms as f64;
        let max: f64 = self.settings.max_backoff_ms as f64;
        let exponent: i32 = attempt.min(i32::MAX as u32) as i32;
        let raw: f64 = initial * self.settings.backoff_multiplier.powi(exponent);

        let capped: f64 = if raw.is_finite() { raw.min(max) } else { max };
        Duration::from_secs_f64(capped.max(0.0) / 1_000.0)
    }

    /// Backoff before retry number `attempt + 1`, with ±20% jitter.
    ///
    /// The result is never negative and never exceeds the maximum backoff.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::rng().random_range(-BACKOFF_JITTER..=BACKOFF_JITTER);
        self.jittered(self.base_backoff(attempt), jitter)
    }

    fn jittered(&self, base: Duration, jitter: f64) -> Duration {
        let max_secs: f64 = self.settings.max_backoff().as_secs_f64();
        let secs: f64 = (base.as_secs_f64() * (1.0 + jitter)).clamp(0.0, max_secs);
        Duration::from_secs_f64(secs)
    }

    /// Run `op` until it succeeds, fails terminally, exhausts retries, or is cancelled.
    ///
    /// Cancellation is checked before every attempt and interrupts backoff sleeps.
    ///
    /// # Arguments
    /// * `cancel` - Token that aborts the loop
    /// * `operation` - Name used in log lines and errors
    /// * `op` - Produces one attempt per call
    ///
    /// # Returns
    /// The first successful result.
    ///
    /// # Errors
    /// * [`RetryError::NotRetryable`] on a terminal or cancellation-class error
    /// * [`RetryError::Exhausted`] after `max_retries + 1` transient failures
    /// * [`RetryError::Cancelled`] when `cancel` fires
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Classify,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    operation: operation.to_string(),
                });
            }

            let err: E = match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(operation, retries = attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            match self.classifier.classify(&err) {
                ErrorClass::Transient => {}
                ErrorClass::Terminal | ErrorClass::Cancelled => {
                    tracing::debug!(operation, error = %err, "Error is not retryable");
                    return Err(RetryError::NotRetryable(err));
                }
            }

            if attempt >= self.settings.max_retries {
                tracing::warn!(
                    operation,
                    attempts = attempt + 1,
                    error = %err,
                    "Giving up after repeated transient errors"
                );
                return Err(RetryError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt + 1,
                    source: err,
                });
            }

            let delay: Duration = self.backoff(attempt);
            tracing::warn!(
                operation,
                attempt = attempt + 1,
                max_retries = self.settings.max_retries,
                backoff_ms = delay.as_millis() as u64,
                error = %err,
                "Transient error, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled {
                        operation: operation.to_string(),
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
