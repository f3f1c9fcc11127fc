//! Bounded confirmation polling.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{ProbeError, ProbeResult};

/// Poll cadence and hard deadline for a confirmation wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Call `check` every `policy.interval` until it yields a value.
///
/// `Ok(None)` and [`ProbeError::NotFoundYet`] mean "not there yet" and
/// are retried; any other error ends the wait immediately. The whole
/// wait, including an in-flight `check`, is abandoned once
/// `policy.timeout` elapses and reported as
/// [`ProbeError::TimeoutExceeded`].
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, mut check: F) -> ProbeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeResult<Option<T>>>,
{
    let attempts = async {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match check().await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => debug!(attempt, "confirmation pending"),
                Err(e) if e.is_retryable() => debug!(attempt, error = %e, "not found yet, retrying"),
                Err(e) => return Err(e),
            }
            tokio::time::sleep(policy.interval).await;
        }
    };

    match tokio::time::timeout(policy.timeout, attempts).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::TimeoutExceeded(policy.timeout)),
    }
}
