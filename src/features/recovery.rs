use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::browser::driver::{check_liveness, AutomationDriver, DriverErrorKind};
use crate::core::clock::Clock;
use crate::core::error::VerificationError;
use crate::core::types::{Completion, FailureReason};
use crate::features::challenge_detector::first_visible_probe;
use crate::features::completion_waiter::DriverLoss;
use crate::features::event_log::{EventId, EventLog};

pub const DEFAULT_RECOVERY_SETTLE: Duration = Duration::from_secs(2);

/// Result of checking the page after a verification wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCheck {
    Verified { location: String },
    LocationMismatch { location: String },
    ChallengeStillVisible { selector: &'static str },
    Unavailable { reason: String },
}

impl PageCheck {
    pub fn is_verified(&self) -> bool {
        matches!(self, PageCheck::Verified { .. })
    }

    fn describe(&self) -> String {
        match self {
            PageCheck::Verified { location } => format!("page verified at {}", location),
            PageCheck::LocationMismatch { location } => {
                format!("unexpected location {}", location)
            }
            PageCheck::ChallengeStillVisible { selector } => {
                format!("challenge element still visible ({})", selector)
            }
            PageCheck::Unavailable { reason } => format!("page unavailable: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed,
    RecoveredResumed,
    Aborted,
}

impl ResumeOutcome {
    pub fn can_continue(&self) -> bool {
        !matches!(self, ResumeOutcome::Aborted)
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryHandler {
    settle: Duration,
}

impl Default for RecoveryHandler {
    fn default() -> Self {
        Self::new(DEFAULT_RECOVERY_SETTLE)
    }
}

impl RecoveryHandler {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Location must contain the destination pattern and no probe may be visible.
    pub async fn verify_page_state(
        &self,
        driver: &dyn AutomationDriver,
        destination_pattern: &str,
    ) -> PageCheck {
        if !driver.has_page() {
            return PageCheck::Unavailable {
                reason: "no page attached".to_string(),
            };
        }
        let location = match driver.current_location().await {
            Ok(location) => location,
            Err(e) => {
                return PageCheck::Unavailable {
                    reason: e.to_string(),
                }
            }
        };
        if !location.contains(destination_pattern) {
            return PageCheck::LocationMismatch { location };
        }
        if let Some(selector) = first_visible_probe(driver).await {
            return PageCheck::ChallengeStillVisible { selector };
        }
        PageCheck::Verified { location }
    }

    /// One refresh-based retry after a state mismatch. Never loops.
    ///
    /// Returns `Ok(true)` when the page reaches the destination after the
    /// refresh, `Ok(false)` when it does not, and `Err` only when the page was
    /// structurally closed underneath us.
    pub async fn recover_from_mismatch(
        &self,
        driver: &dyn AutomationDriver,
        clock: &dyn Clock,
        log: &mut EventLog,
        destination_pattern: &str,
        mismatch: &PageCheck,
    ) -> Result<bool, VerificationError> {
        log.warn(format!(
            "Page state mismatch after verification: {}. Attempting recovery",
            mismatch.describe()
        ));

        if !driver.has_page() {
            log.error("Browser page is gone, cannot recover");
            return Err(VerificationError::DriverClosed);
        }

        if let Err(e) = check_liveness(driver).await {
            if e.kind() == DriverErrorKind::SessionClosed {
                log.error(format!("Browser page access error during recovery: {}", e));
                return Err(VerificationError::DriverClosed);
            }
            log.error(format!("Recovery failed: browser not responsive ({})", e));
            return Ok(false);
        }

        if let Err(e) = driver.refresh().await {
            if e.kind() == DriverErrorKind::SessionClosed {
                log.error(format!("Browser page access error during recovery: {}", e));
                return Err(VerificationError::DriverClosed);
            }
            log.error(format!("Recovery failed: refresh error ({})", e));
            return Ok(false);
        }
        clock.sleep(self.settle).await;

        match driver.current_location().await {
            Ok(location) if location.contains(destination_pattern) => {
                log.info(format!("Recovery successful, page now at {}", location));
                Ok(true)
            }
            Ok(location) => {
                log.error(format!(
                    "Recovery failed: still at {} after refresh (expected {})",
                    location, destination_pattern
                ));
                Ok(false)
            }
            Err(e) => {
                log.error(format!("Recovery failed: {}", e));
                Ok(false)
            }
        }
    }

    /// Close the open event for a lost driver and build the matching error.
    pub fn fail_driver_loss(
        &self,
        log: &mut EventLog,
        id: EventId,
        loss: DriverLoss,
        at: DateTime<Utc>,
    ) -> VerificationError {
        let (reason, err) = match loss {
            DriverLoss::Crashed => (
                FailureReason::BrowserCrashed,
                VerificationError::DriverCrashed,
            ),
            DriverLoss::Closed => (
                FailureReason::BrowserClosedByUser,
                VerificationError::DriverClosed,
            ),
        };
        if let Err(e) = log.complete(id, Completion::Failed(reason), at) {
            log.error(format!("Could not close event after driver loss: {}", e));
            return VerificationError::Event(e);
        }
        log.error(format!("Automation should stop: {}", err));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ChallengeKind;

    #[test]
    fn test_fail_driver_loss_closes_event() {
        let handler = RecoveryHandler::default();
        let mut log = EventLog::default();
        let now = Utc::now();

        let crashed = log.open(ChallengeKind::Captcha, "/a", now);
        let err = handler.fail_driver_loss(&mut log, crashed, DriverLoss::Crashed, now);
        assert!(matches!(err, VerificationError::DriverCrashed));
        assert_eq!(log.get(crashed).unwrap().failure_reason(), "browser_crashed");

        let closed = log.open(ChallengeKind::Captcha, "/b", now);
        let err = handler.fail_driver_loss(&mut log, closed, DriverLoss::Closed, now);
        assert!(matches!(err, VerificationError::DriverClosed));
        assert_eq!(
            log.get(closed).unwrap().failure_reason(),
            "browser_closed_by_user"
        );
        assert_eq!(log.open_events().count(), 0);
    }

    #[test]
    fn test_fail_driver_loss_on_closed_event_reports_bookkeeping_error() {
        let handler = RecoveryHandler::default();
        let mut log = EventLog::default();
        let now = Utc::now();
        let id = log.open(ChallengeKind::Captcha, "/a", now);
        log.complete(id, Completion::Succeeded, now).unwrap();

        let err = handler.fail_driver_loss(&mut log, id, DriverLoss::Crashed, now);
        assert!(matches!(err, VerificationError::Event(_)));
        assert!(log.get(id).unwrap().succeeded());
    }

    #[test]
    fn test_outcome_can_continue() {
        assert!(ResumeOutcome::Resumed.can_continue());
        assert!(ResumeOutcome::RecoveredResumed.can_continue());
        assert!(!ResumeOutcome::Aborted.can_continue());
    }
}
