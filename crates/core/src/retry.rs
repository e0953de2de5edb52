//! Bounded exponential backoff for calls to remote backends.

use crate::error::{AnswerError, EmbeddingError};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for EmbeddingError {
    fn is_transient(&self) -> bool {
        EmbeddingError::is_transient(self)
    }
}

impl Retryable for AnswerError {
    fn is_transient(&self) -> bool {
        AnswerError::is_transient(self)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, fails permanently, or `max_attempts`
/// is reached. The last error is returned unchanged.
pub async fn with_backoff<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

/// How an HTTP status from a remote backend should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    RateLimited,
    Unavailable,
    Rejected,
}

pub fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        StatusClass::RateLimited
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        StatusClass::Unavailable
    } else {
        StatusClass::Rejected
    }
}

/// Transport errors that are worth another attempt.
pub fn is_transient_transport(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}
