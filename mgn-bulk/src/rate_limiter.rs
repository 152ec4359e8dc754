use std::collections::VecDeque;
use std::time::Duration;

use log::info;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window admission control: at most `max_calls` admissions in
/// any `window`.
///
/// Waiting callers suspend without holding the lock, so other callers keep
/// going. There is no fairness beyond timestamp order and a caller can
/// starve under sustained contention.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            max_calls,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a call can be made without exceeding the limit, then
    /// record it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while calls
                    .front()
                    .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
                {
                    calls.pop_front();
                }

                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return;
                }

                match calls.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            info!("Rate limit reached, waiting {:.2} seconds", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of admissions still inside the window
    pub async fn active_calls(&self) -> usize {
        let calls = self.calls.lock().await;
        let now = Instant::now();
        calls
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }

    /// Forget all recorded calls. Meant for use between operations.
    pub async fn reset(&self) {
        self.calls.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_fourth_and_fifth_calls_wait_for_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let start = Instant::now();
        let mut admitted = Vec::new();

        for _ in 0..5 {
            limiter.acquire().await;
            admitted.push(start.elapsed());
            assert!(limiter.active_calls().await <= 3);
        }

        for elapsed in &admitted[..3] {
            assert!(*elapsed < Duration::from_millis(10));
        }
        assert!(admitted[3] >= Duration::from_secs(1));
        assert!(admitted[4] >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();

        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(4)).await;
        limiter.acquire().await;

        // the first call ages out at t=10, the second not until t=14
        limiter.acquire().await;
        let third = start.elapsed();
        assert!(third >= Duration::from_secs(10));
        assert!(third < Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_respect_limit() {
        let limiter = Arc::new(RateLimiter::new(3, Duration::from_secs(1)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                start.elapsed()
            }));
        }

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();

        assert!(times[2] < Duration::from_secs(1));
        assert!(times[3] >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.reset().await;
        limiter.acquire().await;

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(limiter.active_calls().await, 1);
    }

    #[test]
    fn test_zero_max_calls_is_clamped() {
        assert_eq!(RateLimiter::new(0, Duration::from_secs(1)).max_calls(), 1);
    }
}
