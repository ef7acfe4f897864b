//! Time source used by every polling loop.
//!
//! Waits never read the system clock directly: they go through [`Clock`] so
//! that tests can drive time with tokio's paused clock or a hand-rolled fake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic instant used for deadline arithmetic.
    fn now(&self) -> Instant;

    /// Wall-clock timestamp recorded on events.
    fn wall_clock(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by `tokio::time`.
///
/// Wall-clock readings are derived from the monotonic clock relative to the
/// moment the clock was created, so a paused tokio runtime advances both.
#[derive(Debug, Clone)]
pub struct TokioClock {
    anchor_instant: Instant,
    anchor_wall: DateTime<Utc>,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            anchor_instant: Instant::now(),
            anchor_wall: Utc::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.anchor_instant);
        self.anchor_wall + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
