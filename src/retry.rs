//! The retry policy shared by every read.

use std::{future::Future, time::Duration};

use crate::Error;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Decides whether a failed read should be attempted again, and after how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The number of retries after the first failed attempt.
    pub max_retries: u32,
    /// The delay before the first retry. Doubles for each retry after that.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Whether to retry after `error`, given `retries` retries have already been made.
    ///
    /// A 401 is a definitive answer and is never retried, nor is any other
    /// non-transient error.
    pub fn should_retry(&self, retries: u32, error: &Error) -> bool {
        if *error == Error::Unauthenticated {
            return false;
        }

        error.is_transient() && retries < self.max_retries
    }

    /// The delay before retry number `retries + 1`.
    pub fn delay(&self, retries: u32) -> Duration {
        let factor = 2u32.saturating_pow(retries);

        self.base_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }

    /// Run `operation` until it succeeds or the policy gives up.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if self.should_retry(retries, &error) => {
                    let delay = self.delay(retries);
                    tracing::warn!(
                        "read failed with \"{error}\", retrying in {delay:?} ({} of {})",
                        retries + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
