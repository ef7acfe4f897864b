//! Human-in-the-loop verification gate.
//!
//! [`VerificationHandler`] ties detection, attempt counting, waiting, recovery
//! and event logging together for one automation session. The caller drives it
//! at checkpoints in its own flow:
//!
//! ```ignore
//! let mut gate = VerificationHandler::new(driver, load_config().resolve());
//! match gate.checkpoint("/account/profile", "fill_profile").await? {
//!     CheckpointOutcome::NoChallenge | CheckpointOutcome::Resumed => { /* continue */ }
//!     other => { /* skip this iteration */ }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::browser::driver::AutomationDriver;
use crate::core::clock::{Clock, TokioClock};
use crate::core::config::VerificationSettings;
use crate::core::error::VerificationError;
use crate::core::event::VerificationEvent;
use crate::core::log_sink::{FanoutSink, FileSink, LogSink, TracingSink};
use crate::core::types::{ChallengeKind, Completion, FailureReason, VerificationState};
use crate::features::attempt_tracker::AttemptTracker;
use crate::features::challenge_detector::ChallengeDetector;
use crate::features::completion_waiter::CompletionWaiter;
use crate::features::event_log::{EventId, EventLog, EventSummary};
use crate::features::notification::OperatorNotifier;
use crate::features::recovery::{PageCheck, RecoveryHandler, ResumeOutcome};

/// What a single [`VerificationHandler::checkpoint`] call ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOutcome {
    NoChallenge,
    Resumed,
    RecoveredResumed,
    TimedOut,
    AttemptsExhausted,
    Aborted,
}

impl CheckpointOutcome {
    /// Whether the surrounding flow may go on to its next step.
    pub fn can_continue(&self) -> bool {
        matches!(
            self,
            CheckpointOutcome::NoChallenge
                | CheckpointOutcome::Resumed
                | CheckpointOutcome::RecoveredResumed
        )
    }
}

pub struct VerificationHandler {
    driver: Arc<dyn AutomationDriver>,
    clock: Arc<dyn Clock>,
    settings: VerificationSettings,
    detector: ChallengeDetector,
    waiter: CompletionWaiter,
    tracker: AttemptTracker,
    recovery: RecoveryHandler,
    notifier: OperatorNotifier,
    log: EventLog,
    state: VerificationState,
    last_event: Option<EventId>,
}

impl VerificationHandler {
    /// Handler on the tokio clock, logging through `tracing` and, when
    /// `settings.log_file` is set, also to that file.
    pub fn new(driver: Arc<dyn AutomationDriver>, settings: VerificationSettings) -> Self {
        let sink = default_sink(&settings);
        Self::with_parts(driver, Arc::new(TokioClock::new()), sink, settings)
    }

    pub fn with_parts(
        driver: Arc<dyn AutomationDriver>,
        clock: Arc<dyn Clock>,
        sink: Box<dyn LogSink>,
        settings: VerificationSettings,
    ) -> Self {
        let max_attempts = settings.max_attempts.max(1);
        Self {
            driver,
            clock,
            detector: ChallengeDetector::new(settings.detection_budget),
            waiter: CompletionWaiter::new(settings.poll_interval, settings.liveness_interval),
            tracker: AttemptTracker::new(max_attempts),
            recovery: RecoveryHandler::new(settings.recovery_settle),
            notifier: OperatorNotifier::new(settings.notifications_enabled),
            log: EventLog::new(sink).with_fallback_capacity(settings.fallback_log_capacity),
            state: VerificationState::Idle,
            last_event: None,
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the log sink. Meant for construction time, before any event exists.
    pub fn with_sink(mut self, sink: Box<dyn LogSink>) -> Self {
        self.log = EventLog::new(sink).with_fallback_capacity(self.settings.fallback_log_capacity);
        self
    }

    pub fn settings(&self) -> &VerificationSettings {
        &self.settings
    }

    pub fn state(&self) -> VerificationState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.tracker.count()
    }

    pub fn events(&self) -> &[VerificationEvent] {
        self.log.events()
    }

    pub fn last_event(&self) -> Option<&VerificationEvent> {
        self.last_event.and_then(|id| self.log.get(id))
    }

    pub fn event_summary(&self) -> EventSummary {
        self.log.summary()
    }

    pub fn events_json(&self) -> serde_json::Result<String> {
        self.log.to_json()
    }

    pub fn fallback_logs(&self) -> Vec<String> {
        self.log.fallback_logs()
    }

    pub fn clear_fallback_logs(&mut self) {
        self.log.clear_fallback_logs();
    }

    pub async fn detect_challenge(&self) -> Option<ChallengeKind> {
        self.detector
            .detect(self.driver.as_ref(), self.clock.as_ref())
            .await
            .map(|detection| detection.kind)
    }

    /// Run one verification attempt for a detected challenge.
    ///
    /// `Ok(true)` once the operator has cleared it, `Ok(false)` on timeout or
    /// when the attempt ceiling rejects the occurrence, `Err` when the browser
    /// crashed or was closed.
    pub async fn handle_verification_attempt(
        &mut self,
        kind: ChallengeKind,
        page_location: &str,
        destination_pattern: &str,
    ) -> Result<bool, VerificationError> {
        self.tracker.increment(&mut self.log);

        if self.tracker.exceeded(&mut self.log) {
            let now = self.clock.wall_clock();
            let id = self.log.open(kind, page_location, now);
            self.last_event = Some(id);
            self.log.complete(
                id,
                Completion::Failed(FailureReason::MaxAttemptsExceeded),
                now,
            )?;
            self.set_state(VerificationState::Rejected);
            return Ok(false);
        }

        let id = self.log.open(kind, page_location, self.clock.wall_clock());
        self.last_event = Some(id);
        self.set_state(VerificationState::Detected);

        let timeout = self.settings.timeout;
        self.notifier.notify(&mut self.log, kind, timeout, timeout);
        self.log.info(format!(
            "Entering manual verification mode (timeout {}s)",
            timeout.as_secs()
        ));
        self.set_state(VerificationState::Waiting);

        let result = self
            .waiter
            .wait_guarded(
                self.driver.as_ref(),
                self.clock.as_ref(),
                &mut self.log,
                destination_pattern,
                timeout,
            )
            .await;

        let now = self.clock.wall_clock();
        match result {
            Ok(true) => {
                self.log.complete(id, Completion::Succeeded, now)?;
                self.set_state(VerificationState::Completed);
                Ok(true)
            }
            Ok(false) => {
                self.log.complete(id, Completion::TimedOut, now)?;
                self.set_state(VerificationState::TimedOut);
                Ok(false)
            }
            Err(loss) => {
                let err = self.recovery.fail_driver_loss(&mut self.log, id, loss, now);
                self.set_state(if matches!(err, VerificationError::DriverClosed) {
                    VerificationState::Closed
                } else {
                    VerificationState::Crashed
                });
                Err(err)
            }
        }
    }

    /// Only call at iteration boundaries.
    pub fn reset_attempts(&mut self) {
        self.tracker.reset(&mut self.log);
    }

    /// Start a new logical iteration: fresh attempt count, idle state.
    pub fn begin_iteration(&mut self) {
        self.tracker.reset(&mut self.log);
        self.last_event = None;
        self.set_state(VerificationState::Idle);
        self.log.info("Starting new verification iteration");
    }

    pub async fn verify_page_state(&self, destination_pattern: &str) -> bool {
        self.recovery
            .verify_page_state(self.driver.as_ref(), destination_pattern)
            .await
            .is_verified()
    }

    /// Confirm the page after a successful wait and hand control back.
    ///
    /// A mismatch gets exactly one refresh-based recovery before aborting.
    pub async fn resume_flow_after_verification(
        &mut self,
        destination_pattern: &str,
        next_step: &str,
    ) -> Result<ResumeOutcome, VerificationError> {
        let check = self
            .recovery
            .verify_page_state(self.driver.as_ref(), destination_pattern)
            .await;

        if let PageCheck::Verified { location } = &check {
            self.set_state(VerificationState::StateVerified);
            self.log_resume_success(next_step);
            self.log
                .debug(format!("Post-verification monitoring: page at {}", location));
            self.set_state(VerificationState::Resumed);
            return Ok(ResumeOutcome::Resumed);
        }

        self.set_state(VerificationState::StateMismatch);
        let recovered = match self
            .recovery
            .recover_from_mismatch(
                self.driver.as_ref(),
                self.clock.as_ref(),
                &mut self.log,
                destination_pattern,
                &check,
            )
            .await
        {
            Ok(recovered) => recovered,
            Err(e) => {
                self.set_state(VerificationState::Closed);
                return Err(e);
            }
        };

        if recovered {
            self.log_resume_success(next_step);
            self.set_state(VerificationState::RecoveredResumed);
            Ok(ResumeOutcome::RecoveredResumed)
        } else {
            self.log.error(format!(
                "Could not restore page state, aborting before step '{}'",
                next_step
            ));
            self.set_state(VerificationState::Aborted);
            Ok(ResumeOutcome::Aborted)
        }
    }

    /// Detect, verify and resume in one call at a flow checkpoint.
    pub async fn checkpoint(
        &mut self,
        destination_pattern: &str,
        next_step: &str,
    ) -> Result<CheckpointOutcome, VerificationError> {
        let kind = match self.detect_challenge().await {
            Some(kind) => kind,
            None => return Ok(CheckpointOutcome::NoChallenge),
        };

        let location = match self.driver.current_location().await {
            Ok(location) => location,
            Err(e) => {
                self.log.warn(format!(
                    "Could not read page location before verification: {}",
                    e
                ));
                String::new()
            }
        };

        if !self
            .handle_verification_attempt(kind, &location, destination_pattern)
            .await?
        {
            return Ok(if self.tracker.is_exceeded() {
                CheckpointOutcome::AttemptsExhausted
            } else {
                CheckpointOutcome::TimedOut
            });
        }

        Ok(
            match self
                .resume_flow_after_verification(destination_pattern, next_step)
                .await?
            {
                ResumeOutcome::Resumed => CheckpointOutcome::Resumed,
                ResumeOutcome::RecoveredResumed => CheckpointOutcome::RecoveredResumed,
                ResumeOutcome::Aborted => CheckpointOutcome::Aborted,
            },
        )
    }

    /// Repeat checkpoints every `interval` until the flow cannot go on.
    ///
    /// The attempt count spans checkpoints and is only reset once a challenge
    /// has been cleared and the flow resumed, so `max_attempts` bounds a run
    /// of consecutive failures. Returns the stopping outcome.
    pub async fn watch(
        &mut self,
        destination_pattern: &str,
        next_step: &str,
        interval: Duration,
    ) -> Result<CheckpointOutcome, VerificationError> {
        self.begin_iteration();
        loop {
            let outcome = self.checkpoint(destination_pattern, next_step).await?;
            match outcome {
                CheckpointOutcome::Resumed | CheckpointOutcome::RecoveredResumed => {
                    self.begin_iteration()
                }
                CheckpointOutcome::NoChallenge | CheckpointOutcome::TimedOut => {}
                CheckpointOutcome::AttemptsExhausted | CheckpointOutcome::Aborted => {
                    self.log
                        .warn(format!("Stopping watch after outcome {:?}", outcome));
                    return Ok(outcome);
                }
            }
            self.clock.sleep(interval).await;
        }
    }

    fn log_resume_success(&mut self, next_step: &str) {
        let (kind, duration) = match self.last_event() {
            Some(event) => (event.challenge_kind(), event.duration_seconds()),
            None => (ChallengeKind::Unknown, 0.0),
        };
        self.log.info(format!(
            "Flow resumed after {} verification ({:.1}s), next step: {}",
            kind, duration, next_step
        ));
    }

    fn set_state(&mut self, state: VerificationState) {
        self.state = state;
        self.log.debug(format!("verification_state={:?}", state));
    }
}

fn default_sink(settings: &VerificationSettings) -> Box<dyn LogSink> {
    let Some(path) = settings.log_file.as_ref() else {
        return Box::new(TracingSink);
    };
    match FileSink::open(path) {
        Ok(file) => {
            info!("verification events also logged to {}", path.display());
            Box::new(FanoutSink::new(vec![Box::new(TracingSink), Box::new(file)]))
        }
        Err(e) => {
            warn!("could not open verification log {}: {}", path.display(), e);
            Box::new(TracingSink)
        }
    }
}
