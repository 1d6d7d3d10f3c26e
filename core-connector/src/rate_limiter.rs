//! Sliding-window request budget
//!
//! Each connection gets its own limiter. [`SlidingWindowLimiter::acquire`]
//! records the send time of every request; when the window already holds the
//! full budget the caller sleeps until the oldest entry leaves the window.

use core_directory::ApiConnectionConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub struct SlidingWindowLimiter {
    /// Requests allowed per window; zero disables limiting
    max_requests: usize,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests as usize,
            window,
            sent: Mutex::new(VecDeque::new()),
        }
    }

    /// Limiter sized from the connection's `rate_limit_requests` per `rate_limit_window`.
    pub fn for_connection(connection: &ApiConnectionConfig) -> Self {
        let max_requests = u32::try_from(connection.rate_limit_requests.max(0)).unwrap_or(u32::MAX);
        Self::new(max_requests, connection.rate_limit_window.duration())
    }

    /// Unlimited budget.
    pub fn unlimited() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until the window has room, then record a send at the current instant.
    pub async fn acquire(&self) {
        if self.max_requests == 0 {
            return;
        }

        loop {
            let wait_until = {
                let mut sent = self.sent.lock().await;
                let now = Instant::now();
                while let Some(oldest) = sent.front() {
                    if now.duration_since(*oldest) >= self.window {
                        sent.pop_front();
                    } else {
                        break;
                    }
                }

                if sent.len() < self.max_requests {
                    sent.push_back(now);
                    return;
                }

                match sent.front() {
                    Some(oldest) => *oldest + self.window,
                    None => now,
                }
            };

            debug!(
                wait_ms = wait_until
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u64,
                budget = self.max_requests,
                "Rate limit reached, waiting for window"
            );
            tokio::time::sleep_until(wait_until).await;
        }
    }

    /// Sends recorded inside the current window.
    pub async fn in_window(&self) -> usize {
        let sent = self.sent.lock().await;
        let now = Instant::now();
        sent.iter()
            .filter(|ts| now.duration_since(**ts) < self.window)
            .count()
    }
}
