//! Retry logic with exponential backoff on rate limiting
//!
//! Each item runs through a small state machine:
//!
//! ```text
//! Attempting(1) ──ok──────────────────────────────▶ Done(Success)
//!      │
//!      ├─ 429 and n < max ── sleep base·2^(n-1) ──▶ Attempting(n+1)
//!      ├─ transient transport error and n < max ──▶ Attempting(n+1)   (policy permitting)
//!      └─ anything else, or attempts exhausted ───▶ Done(Failure)
//! ```
//!
//! The backoff sleep is local to the item's task and never blocks siblings.
//!
//! # Example
//!
//! ```no_run
//! use photo_dl::config::RetryConfig;
//! use photo_dl::fetcher::Fetcher;
//! use photo_dl::retry::fetch_with_retry;
//! use photo_dl::types::WorkItem;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(fetcher: &dyn Fetcher) {
//! let item = WorkItem::new("alpha", "places/a/photos/1", "Alpha");
//! let outcome = fetch_with_retry(
//!     fetcher,
//!     &item,
//!     &RetryConfig::default(),
//!     &CancellationToken::new(),
//!     None,
//! )
//! .await;
//! println!("{} -> {:?}", outcome.id, outcome.status);
//! # }
//! ```

use crate::config::{RetryConfig, RetryPolicy};
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::types::{Event, Outcome, WorkItem};
use rand::Rng;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// What the retry loop does after a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryAction {
    /// Wait for the backoff delay, then try again
    Backoff,
    /// Try again without waiting
    Immediate,
    /// Give up on this item
    Stop,
}

/// Trait for errors that can be classified for the retry loop
pub trait IsRetryable {
    /// How the retry loop should react to this error under `policy`
    fn retry_action(&self, policy: RetryPolicy) -> RetryAction;
}

impl IsRetryable for FetchError {
    fn retry_action(&self, policy: RetryPolicy) -> RetryAction {
        match self {
            // Rate limiting always backs off
            e if e.is_rate_limited() => RetryAction::Backoff,
            // Timeouts and connect failures, only under the enhanced policy
            e if e.is_transient() && policy == RetryPolicy::RateLimitAndTransient => {
                RetryAction::Immediate
            }
            // Other HTTP statuses (404, 403, 5xx) are final
            FetchError::HttpStatus { .. } => RetryAction::Stop,
            FetchError::Transport { .. } => RetryAction::Stop,
            // Bad input stays bad
            FetchError::InvalidReference { .. } => RetryAction::Stop,
            // Disk problems will not fix themselves between attempts
            FetchError::Filesystem { .. } => RetryAction::Stop,
            FetchError::MaxRetriesExceeded { .. } => RetryAction::Stop,
            FetchError::Cancelled => RetryAction::Stop,
            FetchError::TaskAborted(_) => RetryAction::Stop,
        }
    }
}

/// Backoff before attempt `attempt + 1`, after attempt `attempt` was rate limited
///
/// `backoff_base * 2^(attempt-1)`, capped at `max_delay`, jittered if enabled.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let delay = config
        .backoff_base
        .checked_mul(1u32 << exponent)
        .unwrap_or(config.max_delay)
        .min(config.max_delay);

    if config.jitter {
        add_jitter(delay)
    } else {
        delay
    }
}

/// Fetch one item, retrying according to `config`, and fold the result into an [`Outcome`]
///
/// Never returns an error: every failure becomes a failed outcome. Cancellation
/// is observed before each attempt, during the request and during the backoff
/// sleep; an aborted item is reported as [`FetchError::Cancelled`].
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    item: &WorkItem,
    config: &RetryConfig,
    cancel: &CancellationToken,
    events: Option<&broadcast::Sender<Event>>,
) -> Outcome {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = fetcher.fetch(item) => result,
        };

        let error = match result {
            Ok(bytes) => {
                if attempt > 1 {
                    tracing::info!(id = %item.id, attempts = attempt, "Fetch succeeded after retry");
                }
                return Outcome::success(item, bytes, attempt);
            }
            Err(e) => e,
        };

        let action = error.retry_action(config.policy);
        if action == RetryAction::Stop {
            if error != FetchError::Cancelled {
                tracing::warn!(id = %item.id, attempt, error = %error, "Fetch failed with non-retryable error");
            }
            return Outcome::failure(item, error, attempt);
        }

        if attempt >= max_attempts {
            tracing::error!(
                id = %item.id,
                attempts = attempt,
                error = %error,
                "Fetch failed after all retry attempts exhausted"
            );
            let exhausted = FetchError::MaxRetriesExceeded {
                attempts: attempt,
                last: Box::new(error),
            };
            return Outcome::failure(item, exhausted, attempt);
        }

        if action == RetryAction::Backoff {
            let delay = backoff_delay(config, attempt);
            tracing::warn!(
                id = %item.id,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Rate limited, waiting before retry {}/{}",
                attempt + 1,
                max_attempts
            );
            if let Some(tx) = events {
                tx.send(Event::RateLimited {
                    id: item.id.clone(),
                    attempt,
                    max_attempts,
                    delay,
                })
                .ok();
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Outcome::failure(item, FetchError::Cancelled, attempt);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        } else {
            tracing::warn!(id = %item.id, attempt, error = %error, "Transient failure, retrying immediately");
        }

        attempt += 1;
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay.
/// This means the actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
