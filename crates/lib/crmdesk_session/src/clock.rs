//! Wall-clock sources used for expiry arithmetic.

use chrono::Utc;

/// Supplies "now" as milliseconds since the Unix epoch.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> i64;
}

/// Real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock anchored at a fixed epoch instant that advances with tokio's timer.
///
/// Under a paused tokio runtime, `tokio::time::advance` moves this clock by
/// exactly the same amount as it moves pending sleeps.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin_ms: i64,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(origin_ms: i64) -> Self {
        Self {
            origin_ms,
            started: tokio::time::Instant::now(),
        }
    }

    /// Milliseconds elapsed since the clock was created.
    pub fn elapsed_ms(&self) -> i64 {
        self.started.elapsed().as_millis() as i64
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> i64 {
        self.origin_ms + self.elapsed_ms()
    }
}
