//! Sliding-window rate limiting for backend status queries.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Admits at most `calls` acquisitions in any rolling window of `period`.
///
/// Acquisitions over budget are delayed, never rejected. The window state is
/// behind an async mutex, so every task sharing the limiter is serialized
/// through the same budget.
#[derive(Debug)]
pub struct RateLimiter {
    calls: usize,
    period: Duration,
    history: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter. A budget of zero calls is treated as one.
    pub fn new(calls: u32, period: Duration) -> Self {
        let calls = (calls as usize).max(1);
        Self {
            calls,
            period,
            history: Mutex::new(VecDeque::with_capacity(calls)),
        }
    }

    /// Calls admitted per window.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Window length.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait until the window admits one more call, then record it.
    pub async fn acquire(&self) {
        let mut history = self.history.lock().await;
        loop {
            let now = Instant::now();
            while history
                .front()
                .is_some_and(|&t| now.duration_since(t) >= self.period)
            {
                history.pop_front();
            }

            if history.len() < self.calls {
                history.push_back(now);
                return;
            }

            // Budget exhausted: sleep until the oldest call leaves the window.
            // The lock is held so that waiters are admitted in order.
            let Some(&oldest) = history.front() else {
                continue;
            };
            let wait = self.period.saturating_sub(now.duration_since(oldest));
            debug!(
                "Status query budget exhausted ({} per {:?}), sleeping {:?}",
                self.calls, self.period, wait
            );
            sleep(wait).await;
        }
    }

    /// Acquire a slot, then drive `fut` to completion.
    pub async fn run<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        self.acquire().await;
        fut.await
    }
}
