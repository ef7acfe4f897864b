use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::browser::driver::{check_liveness, AutomationDriver, DriverError, DriverErrorKind};
use crate::core::clock::Clock;
use crate::features::challenge_detector::first_visible_probe;
use crate::features::event_log::EventLog;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(5);

/// Why a guarded wait had to stop before a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DriverLoss {
    #[error("browser crashed")]
    Crashed,

    #[error("browser closed by operator")]
    Closed,
}

/// Which success signal ended the wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionSignal {
    LocationMatched(String),
    ChallengeCleared,
}

enum PollStatus {
    Complete(CompletionSignal),
    Pending,
    Failed(DriverError),
}

#[derive(Debug, Clone)]
pub struct CompletionWaiter {
    poll_interval: Duration,
    liveness_interval: Duration,
}

impl Default for CompletionWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_LIVENESS_INTERVAL)
    }
}

impl CompletionWaiter {
    pub fn new(poll_interval: Duration, liveness_interval: Duration) -> Self {
        Self {
            poll_interval,
            liveness_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Poll until the location contains `destination_pattern` or no challenge
    /// probe is visible. Polling errors never end the wait.
    pub async fn wait(
        &self,
        driver: &dyn AutomationDriver,
        clock: &dyn Clock,
        destination_pattern: &str,
        deadline: Duration,
    ) -> bool {
        if !driver.has_page() {
            return false;
        }

        let started = clock.now();
        loop {
            let elapsed = clock.now().saturating_duration_since(started);
            if elapsed >= deadline {
                warn!(
                    "Manual verification timed out after {:.1} seconds",
                    elapsed.as_secs_f64()
                );
                return false;
            }

            match self.poll(driver, destination_pattern).await {
                PollStatus::Complete(signal) => {
                    info!("Verification complete - {}", describe(&signal));
                    return true;
                }
                PollStatus::Pending => {}
                PollStatus::Failed(e) => warn!("Error during verification monitoring: {}", e),
            }

            self.pause(clock, started, deadline).await;
        }
    }

    /// Like [`wait`](Self::wait), but watches the driver: a liveness probe
    /// every `liveness_interval` (two consecutive failures mean a crash), and
    /// polling errors are classified into crash / closed / transient.
    pub async fn wait_guarded(
        &self,
        driver: &dyn AutomationDriver,
        clock: &dyn Clock,
        log: &mut EventLog,
        destination_pattern: &str,
        deadline: Duration,
    ) -> Result<bool, DriverLoss> {
        if !driver.has_page() {
            log.error("Cannot wait for verification - no browser page available");
            return Ok(false);
        }

        let started = clock.now();
        let mut last_liveness = started;
        loop {
            if !driver.has_page() {
                log.error("Browser page detached during manual verification");
                return Err(DriverLoss::Closed);
            }

            let now = clock.now();
            let elapsed = now.saturating_duration_since(started);
            if elapsed >= deadline {
                log.warn(format!(
                    "Manual verification timed out after {:.1} seconds",
                    elapsed.as_secs_f64()
                ));
                return Ok(false);
            }

            if now.saturating_duration_since(last_liveness) >= self.liveness_interval {
                self.confirm_liveness(driver, clock, log).await?;
                last_liveness = clock.now();
            }

            match self.poll(driver, destination_pattern).await {
                PollStatus::Complete(signal) => {
                    log.info(format!("Verification complete - {}", describe(&signal)));
                    return Ok(true);
                }
                PollStatus::Pending => {}
                PollStatus::Failed(err) if err.kind() == DriverErrorKind::SessionClosed => {
                    log.error(format!("Browser page access error: {}", err));
                    return Err(DriverLoss::Closed);
                }
                PollStatus::Failed(err) => {
                    log.warn(format!("Error during verification monitoring: {}", err));
                    if err.suggests_driver_loss() && check_liveness(driver).await.is_err() {
                        return Err(DriverLoss::Crashed);
                    }
                }
            }

            self.pause(clock, started, deadline).await;
        }
    }

    async fn confirm_liveness(
        &self,
        driver: &dyn AutomationDriver,
        clock: &dyn Clock,
        log: &mut EventLog,
    ) -> Result<(), DriverLoss> {
        let first = match check_liveness(driver).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if first.kind() == DriverErrorKind::SessionClosed {
            log.error(format!("Browser page access error: {}", first));
            return Err(DriverLoss::Closed);
        }

        log.warn(format!("Browser liveness probe failed ({}), re-checking", first));
        clock.sleep(self.poll_interval).await;
        match check_liveness(driver).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == DriverErrorKind::SessionClosed => {
                log.error(format!("Browser page access error: {}", e));
                Err(DriverLoss::Closed)
            }
            Err(e) => {
                log.error(format!("Browser liveness probe failed twice: {}", e));
                Err(DriverLoss::Crashed)
            }
        }
    }

    async fn poll(&self, driver: &dyn AutomationDriver, destination_pattern: &str) -> PollStatus {
        let location = match driver.current_location().await {
            Ok(location) => location,
            Err(e) => return PollStatus::Failed(e),
        };
        if location.contains(destination_pattern) {
            return PollStatus::Complete(CompletionSignal::LocationMatched(location));
        }
        if first_visible_probe(driver).await.is_none() {
            return PollStatus::Complete(CompletionSignal::ChallengeCleared);
        }
        PollStatus::Pending
    }

    /// Sleep one interval, but never past the deadline.
    async fn pause(&self, clock: &dyn Clock, started: Instant, deadline: Duration) {
        let elapsed = clock.now().saturating_duration_since(started);
        let remaining = deadline.saturating_sub(elapsed);
        if !remaining.is_zero() {
            clock.sleep(self.poll_interval.min(remaining)).await;
        }
    }
}

fn describe(signal: &CompletionSignal) -> String {
    match signal {
        CompletionSignal::LocationMatched(location) => format!("URL changed to: {}", location),
        CompletionSignal::ChallengeCleared => "challenge elements disappeared".to_string(),
    }
}
