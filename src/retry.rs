//! Bounded retry for reads from a rendered page
//!
//! Rendering timing is not deterministic: a selector that is missing on the
//! first read is often there a moment later. Every DOM read of the engine is
//! wrapped in [`DomRetry`]. Retries are immediate; pacing between
//! navigations is handled by [`crate::Pacing`].

use crate::{HarvestError, HarvestMetrics};
use std::future::Future;
use tracing::warn;

pub const DEFAULT_DOM_QUERY_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct DomRetry {
    attempts: usize,
}

impl Default for DomRetry {
    fn default() -> Self {
        Self::new(DEFAULT_DOM_QUERY_ATTEMPTS)
    }
}

impl DomRetry {
    pub fn new(attempts: usize) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Run `op` until it succeeds or the attempt budget is spent
    ///
    /// Fails with [`HarvestError::QueryExhausted`] carrying the last error.
    /// An error that is not [retryable](HarvestError::is_retryable) is
    /// returned as is, without spending the rest of the budget.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, HarvestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HarvestError>>,
    {
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!("DOM query failed (attempt {}/{}): {}", attempt, self.attempts, e);
                    HarvestMetrics::record_dom_retry();
                    last_error = e.to_string();
                }
            }
        }

        Err(HarvestError::QueryExhausted {
            attempts: self.attempts,
            last_error,
        })
    }

    /// Like [`DomRetry::run`], but calls `fallback` and yields `None` once the
    /// budget is spent instead of failing
    pub async fn run_or_else<T, F, Fut, H>(&self, op: F, fallback: H) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HarvestError>>,
        H: FnOnce(),
    {
        match self.run(op).await {
            Ok(value) => Some(value),
            Err(_) => {
                fallback();
                None
            }
        }
    }
}
