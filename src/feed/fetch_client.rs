//! Retrying fetch of the calendar feed.
//!
//! This module provides the [`FetchClient`] which wraps a [`FeedRequester`]
//! with a per-attempt timeout, exponential backoff with jitter between
//! transient failures, and cancellation.

use std::{sync::Arc, time::Duration};

use log::{info, warn};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::feed::{FeedRequester, NetworkError, RawPayload};

/// Upper bound of a single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Retry policy for fetching the feed.
///
/// Delays grow as `backoff_base * 2^(attempt - 1)`, capped at five minutes,
/// plus a random jitter of up to 10% of the delay.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub backoff_base: Duration,
    /// Bound of each individual attempt.
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(max_attempts: u32, backoff_base: Duration, timeout: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            backoff_base,
            timeout,
        }
    }

    /// Delay to wait after the failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exp = 2f64.powi(attempt as i32 - 1);
        let delay = (self.backoff_base.as_secs_f64() * exp).min(MAX_BACKOFF.as_secs_f64());

        // Jitter of 0-10% keeps clients from retrying in lockstep
        let jitter = delay * (rand::random::<f64>() * 0.1);

        Duration::from_secs_f64(delay + jitter)
    }
}

/// Fetches the feed payload, retrying transient failures.
///
/// The client holds no mutable state; concurrent calls are independent.
pub struct FetchClient {
    /// Performs a single round trip
    requester: Arc<dyn FeedRequester>,
    policy: RetryPolicy,
}

impl FetchClient {
    /// Create a new [FetchClient].
    ///
    /// # Arguments
    ///
    /// * `requester` - Performs the actual network round trip.
    /// * `policy` - Attempt cap, backoff base and per-attempt timeout.
    pub fn new(requester: Arc<dyn FeedRequester>, policy: RetryPolicy) -> Self {
        FetchClient { requester, policy }
    }

    /// Url of the feed being fetched.
    pub fn source_url(&self) -> String {
        self.requester.source_url()
    }

    /// Fetches the raw payload.
    ///
    /// Transient errors are retried until `max_attempts` attempts have been
    /// made. Permanent errors are returned right away. When `cancel` fires the
    /// in-flight attempt or the backoff sleep is dropped and
    /// [`NetworkError::Cancelled`] is returned.
    pub async fn fetch(&self, cancel: &CancellationToken) -> Result<RawPayload, NetworkError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(NetworkError::Cancelled),
                result = time::timeout(self.policy.timeout, self.requester.get_calendar()) => {
                    match result {
                        Ok(result) => result,
                        Err(_) => Err(NetworkError::Transient(format!(
                            "attempt timed out after {:?}",
                            self.policy.timeout
                        ))),
                    }
                }
            };

            match result {
                Ok(payload) => {
                    if attempt > 1 {
                        info!("calendar fetch succeeded on attempt {}", attempt);
                    }
                    return Ok(payload);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        "calendar fetch attempt {}/{} failed: {}, retrying in {:?}",
                        attempt, max_attempts, e, delay
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(NetworkError::Cancelled),
                        _ = time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        "calendar fetch attempt {}/{} failed: {}",
                        attempt, max_attempts, e
                    );
                    return Err(e);
                }
            }
        }
    }
}
