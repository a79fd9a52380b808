use crate::errors::{DocketError, DocketResult};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Fixed-window request rate limiter.
///
/// Each call to [RequestThrottle::acquire] counts one request against the
/// current window. Once the window's budget is spent, further requests fail
/// with [crate::errors::ErrorKind::Throttled] carrying the time left until the
/// window rolls over. A throttle without a limit never rejects.
pub struct RequestThrottle {
    limit: Option<u32>,
    window: Duration,
    state: Mutex<WindowState>,
}

struct WindowState {
    started: Instant,
    used: u32,
}

impl RequestThrottle {
    pub fn new(limit: Option<u32>, window: Duration) -> Self {
        RequestThrottle {
            limit,
            window,
            state: Mutex::new(WindowState {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    /// A throttle that admits every request.
    pub fn unlimited() -> Self {
        RequestThrottle::new(None, Duration::from_secs(1))
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Counts one request, or returns a throttling error if the window is full.
    pub fn acquire(&self) -> DocketResult<()> {
        let limit = match self.limit {
            Some(limit) => limit,
            None => return Ok(()),
        };

        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.started);
        if elapsed >= self.window {
            state.started = now;
            state.used = 0;
        }

        if state.used >= limit {
            let retry_after = self.window.saturating_sub(now.duration_since(state.started));
            log::warn!(
                "Request rate limit of {} per {:?} exceeded, retry after {:?}",
                limit,
                self.window,
                retry_after
            );
            return Err(DocketError::throttled(retry_after));
        }

        state.used += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use test_retry::retry;

    #[test]
    fn unlimited_throttle_never_rejects() {
        let throttle = RequestThrottle::unlimited();
        for _ in 0..10_000 {
            assert!(throttle.acquire().is_ok());
        }
    }

    #[test]
    fn rejects_after_limit_within_window() {
        let throttle = RequestThrottle::new(Some(3), Duration::from_secs(60));
        assert!(throttle.acquire().is_ok());
        assert!(throttle.acquire().is_ok());
        assert!(throttle.acquire().is_ok());

        let err = throttle.acquire().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Throttled(_)));
        let delay = err.retry_after().unwrap();
        assert!(delay <= Duration::from_secs(60));
        assert!(delay > Duration::from_secs(50));
    }

    #[test]
    #[retry]
    fn window_rollover_resets_budget() {
        let throttle = RequestThrottle::new(Some(1), Duration::from_millis(20));
        assert!(throttle.acquire().is_ok());
        assert!(throttle.acquire().is_err());
        awaitility::at_most(Duration::from_millis(500)).until(|| throttle.acquire().is_ok());
    }
}
