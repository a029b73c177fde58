//! Bounded retry for collaborator lookups.
//!
//! Each attempt runs under its own timeout. Retriable failures back off exponentially with
//! ±25% jitter; after `max_retries` extra attempts the last failure is wrapped in
//! [`CollaboratorError::Exhausted`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use super::collaborators::CollaboratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_millis(1_500),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, retry: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let computed = base_ms.saturating_mul(1u64 << retry.saturating_sub(1).min(10));
        let capped = computed.min(max_ms);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let jittered = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
        Duration::from_millis(jittered)
    }
}

pub(crate) async fn retry_with_backoff<T, F, Fut>(
    collaborator: &'static str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, CollaboratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let mut retries = 0u32;
    loop {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(policy.attempt_timeout, operation()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CollaboratorError::Timeout {
                collaborator,
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retriable() {
            return Err(err);
        }
        if retries >= policy.max_retries {
            return Err(CollaboratorError::Exhausted {
                collaborator,
                attempts: retries + 1,
                last: Box::new(err),
            });
        }

        retries += 1;
        let delay = policy.delay_for(retries);
        warn!(
            collaborator,
            attempt = retries,
            max_retries = policy.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "collaborator lookup failed; retrying after back-off"
        );
        tokio::time::sleep(delay).await;
    }
}
