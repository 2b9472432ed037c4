//! Ordered concurrent fan-out over homogeneous targets.
//!
//! [`ConcurrentRunner`] is the single primitive for acting on many remote
//! targets at once. Results come back aligned to input order regardless of
//! completion order, and a failing target never interrupts its peers: every
//! invocation runs to completion before the first failure (in input order)
//! is surfaced, so concurrently-started work is never abandoned half-done.

use std::future::Future;
use std::num::NonZeroUsize;

use futures::future::join_all;
use tokio::sync::Semaphore;

/// Default number of targets allowed in flight at once.
pub const DEFAULT_PARALLELISM: usize = 16;

/// Bounded fan-out executor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConcurrentRunner {
    limit: NonZeroUsize,
}

impl Default for ConcurrentRunner {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_PARALLELISM).unwrap_or(NonZeroUsize::MIN))
    }
}

impl ConcurrentRunner {
    /// Creates a runner that keeps at most `limit` targets in flight.
    #[must_use]
    pub const fn new(limit: NonZeroUsize) -> Self {
        Self { limit }
    }

    /// Returns the concurrency bound.
    #[must_use]
    pub const fn limit(&self) -> NonZeroUsize {
        self.limit
    }

    /// Applies `func` to every target concurrently and returns the results
    /// in input order.
    ///
    /// Callers that need the individual outcome of every target must report
    /// or swallow failures inside `func`; this method keeps only the first
    /// failing target's error.
    ///
    /// # Errors
    ///
    /// Returns the error of the first target (in input order) whose `func`
    /// failed, after all targets have finished.
    pub async fn run_all<T, R, E, F, Fut>(
        &self,
        targets: impl IntoIterator<Item = T>,
        func: F,
    ) -> Result<Vec<R>, E>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let semaphore = Semaphore::new(self.limit.get());
        let tasks = targets.into_iter().map(|target| {
            let permits = &semaphore;
            let apply = &func;
            async move {
                // The semaphore is never closed, so acquisition cannot fail.
                let _permit = permits.acquire().await.ok();
                apply(target).await
            }
        });

        let mut results = Vec::new();
        let mut first_failure = None;
        for outcome in join_all(tasks).await {
            match outcome {
                Ok(value) => results.push(value),
                Err(err) => {
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }

        first_failure.map_or(Ok(results), Err)
    }
}

#[cfg(test)]
mod tests;
