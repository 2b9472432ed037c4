//! Bounded retry of operations that may report "not yet done".
//!
//! [`RetryPolicy`] drives a zero-argument probe until it yields a result or
//! a deadline passes. The probe distinguishes, at the type level, between
//! [`Probe::Pending`] (the only retryable signal) and a definitive error:
//! retrying on failure is never correct, so a probe error ends the loop
//! immediately. Time is read through an injected [`Clock`] so the loop is
//! testable without real sleeps.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;
use tracing::debug;

/// Future returned by [`Clock::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Time source used by the poll loop.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Suspends the caller for `duration`.
    fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

/// Wall-clock [`Clock`] backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Outcome of a single probe invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Probe<T> {
    /// The operation finished and produced a value.
    Done(T),
    /// The operation has not finished yet; try again later.
    Pending,
}

/// Terminal outcome of a retry loop that did not produce a value.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The deadline passed while the probe still reported pending. The true
    /// state of the underlying operation is unknown.
    #[error("timed out after {elapsed:?} waiting for completion")]
    TimedOut {
        /// Wall-clock time spent polling before giving up.
        elapsed: Duration,
    },
    /// The probe reported a definitive failure; no retry was attempted.
    #[error("operation failed before completing")]
    Failed(#[source] E),
}

/// Fixed-interval retry configuration.
///
/// Stateless: each [`RetryPolicy::run`] invocation carries its own attempt
/// counter and deadline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    timeout: Duration,
    poll_interval: Duration,
    jitter: f64,
}

impl RetryPolicy {
    /// Creates a policy with deterministic spacing (zero jitter).
    #[must_use]
    pub const fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            jitter: 0.0,
        }
    }

    /// Sets the jitter fraction, clamped to `0.0..=1.0`. Each sleep is
    /// lengthened by up to `jitter * poll_interval`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Returns the total timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the base interval between attempts.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the configured jitter fraction.
    #[must_use]
    pub const fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Runs `probe` on the wall clock until it completes or the timeout
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Failed`] as soon as the probe errors, or
    /// [`RetryError::TimedOut`] when the deadline passes without a
    /// definitive result.
    pub async fn run<T, E, F, Fut>(&self, probe: F) -> Result<T, RetryError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<T>, E>>,
    {
        self.run_with_clock(&SystemClock, probe).await
    }

    /// Runs `probe` against an explicit [`Clock`].
    ///
    /// # Errors
    ///
    /// Same contract as [`RetryPolicy::run`].
    pub async fn run_with_clock<C, T, E, F, Fut>(
        &self,
        clock: &C,
        mut probe: F,
    ) -> Result<T, RetryError<E>>
    where
        C: Clock + ?Sized,
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<T>, E>>,
    {
        let start = clock.now();
        let deadline = start + self.timeout;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match probe().await {
                Ok(Probe::Done(value)) => {
                    debug!(attempts, "probe completed");
                    return Ok(value);
                }
                Ok(Probe::Pending) => {}
                Err(err) => return Err(RetryError::Failed(err)),
            }

            let now = clock.now();
            if now >= deadline {
                return Err(RetryError::TimedOut {
                    elapsed: now.saturating_duration_since(start),
                });
            }

            let delay = self.jittered_interval();
            debug!(
                attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "probe pending, retrying"
            );
            clock.sleep(delay).await;
        }
    }

    #[expect(
        clippy::float_arithmetic,
        reason = "jitter is an inherently fractional perturbation of the interval"
    )]
    fn jittered_interval(&self) -> Duration {
        if self.jitter <= 0.0 {
            return self.poll_interval;
        }
        let fuzz = rand::thread_rng().gen_range(0.0..self.jitter);
        self.poll_interval.mul_f64(1.0 + fuzz)
    }
}
