//! Sliding-window rate limiting for suggestion ingestion.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use foreman_core::{ForemanError, ForemanResult};
use parking_lot::Mutex;

/// Per-scope sliding-window limiter with a short burst window and a
/// longer sustained window. A denied call is not recorded, so being
/// throttled never extends the throttle.
pub struct RateLimiter {
    burst_limit: usize,
    burst_window: Duration,
    sustained_limit: usize,
    sustained_window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `burst_limit` hits per `burst_window`
    /// and `sustained_limit` hits per `sustained_window`, per scope.
    pub fn new(
        burst_limit: usize,
        burst_window: Duration,
        sustained_limit: usize,
        sustained_window: Duration,
    ) -> Self {
        Self {
            burst_limit,
            burst_window,
            sustained_limit,
            sustained_window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Records a hit for `scope`, or refuses with
    /// [`ForemanError::RateLimited`] when either window is full.
    pub fn check(&self, scope: &str) -> ForemanResult<()> {
        self.check_at(scope, Instant::now())
    }

    fn check_at(&self, scope: &str, now: Instant) -> ForemanResult<()> {
        let mut hits = self.hits.lock();
        let window = hits.entry(scope.to_string()).or_default();

        while window
            .front()
            .is_some_and(|hit| now.duration_since(*hit) > self.sustained_window)
        {
            window.pop_front();
        }

        let burst = window
            .iter()
            .filter(|hit| now.duration_since(**hit) <= self.burst_window)
            .count();
        if burst >= self.burst_limit || window.len() >= self.sustained_limit {
            return Err(ForemanError::RateLimited {
                scope: scope.to_string(),
            });
        }

        window.push_back(now);
        Ok(())
    }
}
