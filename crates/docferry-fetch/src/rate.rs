//! Fixed-window request rate limiting.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::info;

const WINDOW: Duration = Duration::from_secs(60);

struct WindowState {
    calls_made: u32,
    window_start: Instant,
}

/// Admits at most `calls_per_minute` requests per rolling window.
///
/// `acquire` suspends the caller until the next window opens when the
/// budget is spent; the counter resets wholesale at the window boundary
/// rather than draining gradually. Cannot fail, only delay. Concurrent
/// callers queue on the internal lock, so the check-and-increment is
/// atomic and a sleeping holder stalls later arrivals past the same
/// boundary.
pub struct RateLimiter {
    calls_per_minute: u32,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(calls_per_minute: u32) -> Self {
        Self {
            // A zero budget would admit nothing and wedge the batch.
            calls_per_minute: calls_per_minute.max(1),
            state: Mutex::new(WindowState {
                calls_made: 0,
                window_start: Instant::now(),
            }),
        }
    }

    /// Returns once it is safe to issue one more request.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        if now.duration_since(state.window_start) >= WINDOW {
            state.calls_made = 0;
            state.window_start = now;
        }

        if state.calls_made >= self.calls_per_minute {
            let next_window = state.window_start + WINDOW;
            let wait = next_window.duration_since(now);
            if wait > Duration::ZERO {
                info!(wait_secs = wait.as_secs_f64(), "rate limit reached, waiting");
                sleep(wait).await;
            }
            state.calls_made = 0;
            state.window_start = Instant::now();
        }

        state.calls_made += 1;
    }
}
