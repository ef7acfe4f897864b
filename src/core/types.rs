use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification tag attached to a detected challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeKind {
    Captcha,
    Challenge,
    Unknown,
}

impl ChallengeKind {
    /// Classify a probe selector. `captcha` wins over `challenge` when both appear.
    pub fn classify(selector: &str) -> Self {
        let lower = selector.to_lowercase();
        if lower.contains("captcha") {
            ChallengeKind::Captcha
        } else if lower.contains("challenge") {
            ChallengeKind::Challenge
        } else {
            ChallengeKind::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeKind::Captcha => "captcha",
            ChallengeKind::Challenge => "challenge",
            ChallengeKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical failure reasons written into completed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    MaxAttemptsExceeded,
    BrowserCrashed,
    BrowserClosedByUser,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::MaxAttemptsExceeded => "max_attempts_exceeded",
            FailureReason::BrowserCrashed => "browser_crashed",
            FailureReason::BrowserClosedByUser => "browser_closed_by_user",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FailureReason> for String {
    fn from(reason: FailureReason) -> Self {
        reason.as_str().to_string()
    }
}

/// How an open verification event is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Succeeded,
    TimedOut,
    Failed(FailureReason),
}

impl Completion {
    /// `(succeeded, timed_out, failure_reason)` as stored on the event.
    pub fn parts(&self) -> (bool, bool, &'static str) {
        match self {
            Completion::Succeeded => (true, false, ""),
            Completion::TimedOut => (false, true, FailureReason::Timeout.as_str()),
            Completion::Failed(reason) => (false, false, reason.as_str()),
        }
    }
}

/// Lifecycle of a single challenge occurrence.
///
/// `Idle → Detected → Waiting → {Completed | TimedOut | Crashed | Closed}`;
/// from `Completed` either `StateVerified → Resumed` or
/// `StateMismatch → {RecoveredResumed | Aborted}`. `Rejected` marks an
/// occurrence refused by the attempt ceiling before any wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerificationState {
    Idle,
    Detected,
    Rejected,
    Waiting,
    Completed,
    TimedOut,
    Crashed,
    Closed,
    StateVerified,
    Resumed,
    StateMismatch,
    RecoveredResumed,
    Aborted,
}

impl VerificationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VerificationState::Rejected
                | VerificationState::TimedOut
                | VerificationState::Crashed
                | VerificationState::Closed
                | VerificationState::Resumed
                | VerificationState::RecoveredResumed
                | VerificationState::Aborted
        )
    }
}
