//! Bounded Waits
//!
//! Single primitive for every blocking wait: poll a step until it yields a
//! value, fails, or the policy's timeout expires.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Timeout and poll cadence for a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    pub timeout: Duration,
    /// Sleep between unsuccessful attempts; zero when the step blocks itself
    pub poll_interval: Duration,
}

impl WaitPolicy {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// No sleep between attempts
    pub fn busy(timeout: Duration) -> Self {
        Self::new(timeout, Duration::ZERO)
    }
}

/// Why a wait ended without a value
#[derive(Debug, Error)]
pub enum WaitError<E> {
    /// Timeout expired before the step produced a value
    #[error("Timed out after {elapsed:?} ({attempts} attempts)")]
    Timeout { elapsed: Duration, attempts: u32 },

    /// Step returned an error
    #[error("Wait aborted: {0}")]
    Aborted(E),
}

/// Run `step` until it returns `Some`, returns an error, or time runs out.
///
/// The step always runs at least once, and a step that has started is never
/// interrupted; the deadline is checked between attempts.
pub fn poll_until<T, E, F>(policy: &WaitPolicy, mut step: F) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Result<Option<T>, E>,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Some(value) = step().map_err(WaitError::Aborted)? {
            return Ok(value);
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            debug!("Wait expired after {:?} and {} attempts", elapsed, attempts);
            return Err(WaitError::Timeout { elapsed, attempts });
        }

        if !policy.poll_interval.is_zero() {
            let remaining = policy.timeout.saturating_sub(start.elapsed());
            std::thread::sleep(policy.poll_interval.min(remaining));
        }
    }
}

/// Wait for `predicate` to hold
pub fn wait_until<F>(policy: &WaitPolicy, mut predicate: F) -> Result<(), WaitError<Infallible>>
where
    F: FnMut() -> bool,
{
    poll_until(policy, || Ok::<_, Infallible>(predicate().then_some(())))
}
