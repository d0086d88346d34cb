//! Fixed-interval polling with an optional upper bound.
//!
//! Long-running warehouse jobs are awaited by repeatedly asking for their
//! status. The loop sleeps `interval` between checks and gives up with a
//! [`PollTimeout`] once `timeout` has elapsed.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::PollTimeout;

/// What a single poll observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The condition settled with a value.
    Ready(T),
    /// Not there yet; check again after the interval.
    Pending,
}

/// Interval and bound for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the condition settles, however long that takes.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: None,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    /// The same policy with its bound shortened by the time since `started`,
    /// so several polls in a row share one deadline.
    pub fn remaining_since(&self, started: Instant) -> Self {
        Self {
            interval: self.interval,
            timeout: self
                .timeout
                .map(|timeout| timeout.saturating_sub(started.elapsed())),
        }
    }

    /// Build from config values where a zero timeout means "unbounded".
    pub fn from_millis_and_secs(interval_ms: u64, timeout_secs: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }
}

/// Run `check` until it reports [`PollOutcome::Ready`].
///
/// Errors returned by `check` end the loop immediately. When the policy's
/// timeout elapses before the condition settles the loop fails with a
/// [`PollTimeout`] converted into the caller's error type.
pub async fn poll_until<T, E, F, Fut>(policy: &PollPolicy, target: &str, mut check: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollOutcome<T>, E>>,
    E: From<PollTimeout>,
{
    let started = Instant::now();
    let mut attempts: u64 = 0;

    loop {
        attempts += 1;
        if let PollOutcome::Ready(value) = check().await? {
            debug!(poll_target = target, attempts, "Poll settled");
            return Ok(value);
        }

        let elapsed = started.elapsed();
        if let Some(timeout) = policy.timeout
            && elapsed + policy.interval > timeout
        {
            return Err(PollTimeout {
                target: target.to_string(),
                attempts,
                elapsed,
            }
            .into());
        }

        trace!(poll_target = target, attempts, "Still pending, sleeping {:?}", policy.interval);
        tokio::time::sleep(policy.interval).await;
    }
}
