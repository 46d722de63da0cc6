//! Sliding-window rate limiter
//!
//! Polling admission control: callers re-check the window every
//! `poll_interval` instead of being woken by a timer queue. The lock only
//! covers prune-and-check and is never held across a sleep.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::FetchSettings;
use crate::metrics;

/// Admits at most `max_requests` calls within any trailing `window`
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    poll_interval: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration, poll_interval: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            max_requests,
            window,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            admitted: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn from_settings(settings: &FetchSettings) -> Self {
        Self::new(settings.max_requests, settings.window, settings.poll_interval)
    }

    /// Wait until one more request fits in the window, then record it
    pub async fn acquire(&self) {
        let mut waited = false;
        loop {
            if self.try_acquire() {
                return;
            }
            if !waited {
                waited = true;
                metrics::get().rate_limit_waits.inc();
                debug!(
                    max_requests = self.max_requests,
                    window_ms = self.window.as_millis() as u64,
                    "Rate limit window full, waiting"
                );
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Admit immediately if the window has room
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut admitted = self.admitted.lock();

        while let Some(&oldest) = admitted.front() {
            if now.duration_since(oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }

        if admitted.len() < self.max_requests {
            admitted.push_back(now);
            true
        } else {
            false
        }
    }

    /// Admissions currently inside the window
    pub fn in_window(&self) -> usize {
        let now = Instant::now();
        self.admitted
            .lock()
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_fills_window() {
        let limiter = RateLimiter::new(3, Duration::from_millis(1000), Duration::from_millis(10));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.in_window(), 3);

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(limiter.try_acquire());
        assert_eq!(limiter.in_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_bound_under_concurrency() {
        let window = Duration::from_millis(1000);
        let limiter = Arc::new(RateLimiter::new(10, window, Duration::from_millis(10)));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut admissions = Vec::with_capacity(handles.len());
        for handle in handles {
            admissions.push(handle.await.unwrap());
        }
        admissions.sort();

        for (i, start) in admissions.iter().enumerate() {
            let in_slice = admissions[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < window)
                .count();
            assert!(in_slice <= 10, "{} admissions within one window", in_slice);
        }

        let span = admissions[admissions.len() - 1].duration_since(admissions[0]);
        assert!(span >= Duration::from_millis(9000));
    }
}
