use crate::common::DEFAULT_RETRY_ATTEMPTS;
use crate::errors::DocketResult;
use std::sync::Arc;
use std::time::Duration;

type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Retries operations that fail with a throttling error.
///
/// The policy waits for the delay carried by
/// [crate::errors::ErrorKind::Throttled] and calls the operation again, up to
/// `max_attempts` calls in total. Any other error is returned immediately. A
/// throttling error that is only the *cause* of another error is not retried.
///
/// The sleeper is pluggable so tests can record delays instead of waiting.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    sleeper: Sleeper,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            sleeper: Arc::new(std::thread::sleep),
        }
    }

    /// Replaces the function used to wait between attempts.
    pub fn with_sleeper<F>(mut self, sleeper: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `operation`, retrying while it reports throttling.
    ///
    /// # Returns
    ///
    /// The first successful result, the first non-throttling error, or the last
    /// throttling error once all attempts are used.
    pub fn execute<T, F>(&self, mut operation: F) -> DocketResult<T>
    where
        F: FnMut() -> DocketResult<T>,
    {
        let mut attempt = 1;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) => match err.retry_after() {
                    Some(delay) if attempt < self.max_attempts => {
                        log::warn!(
                            "Request throttled on attempt {}/{}, retry in {:?}",
                            attempt,
                            self.max_attempts,
                            delay
                        );
                        (self.sleeper)(delay);
                        attempt += 1;
                    }
                    _ => return Err(err),
                },
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(DEFAULT_RETRY_ATTEMPTS)
    }
}
