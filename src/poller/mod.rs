//! Convergence waits for resources whose state changes asynchronously.
//!
//! A wait sleeps one interval before the first fetch so that a resource is
//! not read back immediately after the call that mutated it. Each iteration
//! checks cancellation first, then the deadline, then issues exactly one
//! fetch; fetches never overlap.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::ClientError;
use crate::model::Observation;

/// Default delay between two fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default time limit for a single wait.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);
/// Longest span the poller ever adds to an instant. Larger intervals and
/// timeouts are clamped to it so deadline arithmetic cannot overflow.
pub const MAX_WAIT_SPAN: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Cadence and time limit of a convergence wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitPolicy {
    /// Delay before the first fetch and between subsequent fetches.
    pub poll_interval: Duration,
    /// Total time the wait may take, measured from its start.
    pub timeout: Duration,
}

impl WaitPolicy {
    /// Creates a policy from an interval and a timeout.
    #[must_use]
    pub const fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT)
    }
}

/// Reasons a wait ended without the condition holding.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PollError {
    /// The deadline passed first.
    #[error("condition not met within {waited:?}")]
    Timeout {
        /// Configured time limit that was exhausted.
        waited: Duration,
    },
    /// The caller cancelled the wait.
    #[error("wait cancelled after {waited:?}")]
    Cancelled {
        /// Time spent waiting before cancellation was observed.
        waited: Duration,
    },
    /// A fetch failed with something other than an expected "not found".
    #[error("status fetch failed: {0}")]
    Fetch(#[source] ClientError),
}

/// Repeatedly fetches a resource until a condition holds.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConvergencePoller {
    policy: WaitPolicy,
}

impl ConvergencePoller {
    /// Creates a poller with the given policy.
    #[must_use]
    pub const fn new(policy: WaitPolicy) -> Self {
        Self { policy }
    }

    /// Policy applied to every wait.
    #[must_use]
    pub const fn policy(&self) -> WaitPolicy {
        self.policy
    }

    /// Waits until `satisfied` accepts an observation of the resource.
    ///
    /// Returns the satisfying snapshot, or `None` when the condition was
    /// met by the resource being gone. A "not found" fetch is handed to the
    /// condition as [`Observation::Gone`]; when the condition rejects it, the
    /// fetch error is returned as is.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Cancelled`] as soon as `cancel` fires,
    /// [`PollError::Timeout`] once the policy's timeout has elapsed, and
    /// [`PollError::Fetch`] for any fetch failure the condition does not
    /// accept.
    pub async fn wait_until<T, F, Fut, P>(
        &self,
        resource: &str,
        mut fetch: F,
        mut satisfied: P,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
        P: FnMut(Observation<'_, T>) -> bool,
    {
        let started = Instant::now();
        let deadline = started + self.policy.timeout.min(MAX_WAIT_SPAN);
        let interval = self.policy.poll_interval.min(MAX_WAIT_SPAN);
        let mut attempt: u32 = 0;

        loop {
            let wake = deadline.min(Instant::now() + interval);
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(PollError::Cancelled { waited: started.elapsed() });
                }
                () = sleep_until(wake) => {}
            }

            if cancel.is_cancelled() {
                return Err(PollError::Cancelled {
                    waited: started.elapsed(),
                });
            }
            if Instant::now() >= deadline {
                return Err(PollError::Timeout {
                    waited: self.policy.timeout,
                });
            }

            attempt = attempt.saturating_add(1);
            debug!(resource, attempt, "polling for convergence");
            let fetched = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(PollError::Cancelled { waited: started.elapsed() });
                }
                result = fetch() => result,
            };

            match fetched {
                Ok(snapshot) => {
                    if satisfied(Observation::Present(&snapshot)) {
                        return Ok(Some(snapshot));
                    }
                }
                Err(err) if err.is_not_found() && satisfied(Observation::Gone) => {
                    return Ok(None);
                }
                Err(err) => return Err(PollError::Fetch(err)),
            }
        }
    }
}
