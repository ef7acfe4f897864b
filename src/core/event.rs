use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::types::ChallengeKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("verification event {0} is already completed")]
    AlreadyCompleted(Uuid),

    #[error("no verification event with index {0}")]
    UnknownEvent(usize),
}

/// Record of one challenge occurrence and its outcome.
///
/// Created open at detection time and completed exactly once; a completed
/// event rejects any further completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationEvent {
    id: Uuid,
    challenge_kind: ChallengeKind,
    started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    page_location: String,
    #[serde(default)]
    succeeded: bool,
    #[serde(default)]
    timed_out: bool,
    #[serde(default)]
    failure_reason: String,
    #[serde(default)]
    duration_seconds: f64,
}

impl VerificationEvent {
    pub fn open(
        challenge_kind: ChallengeKind,
        page_location: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            challenge_kind,
            started_at,
            ended_at: None,
            page_location: page_location.into(),
            succeeded: false,
            timed_out: false,
            failure_reason: String::new(),
            duration_seconds: 0.0,
        }
    }

    /// Complete the event now.
    pub fn complete(
        &mut self,
        succeeded: bool,
        timed_out: bool,
        failure_reason: impl Into<String>,
    ) -> Result<(), EventError> {
        self.complete_at(Utc::now(), succeeded, timed_out, failure_reason)
    }

    /// Complete the event at `ended_at`. Duration is clamped to zero when
    /// `ended_at` precedes `started_at`.
    pub fn complete_at(
        &mut self,
        ended_at: DateTime<Utc>,
        succeeded: bool,
        timed_out: bool,
        failure_reason: impl Into<String>,
    ) -> Result<(), EventError> {
        if self.ended_at.is_some() {
            return Err(EventError::AlreadyCompleted(self.id));
        }
        self.ended_at = Some(ended_at);
        self.succeeded = succeeded;
        self.timed_out = timed_out;
        self.failure_reason = failure_reason.into();
        self.duration_seconds = (ended_at - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn challenge_kind(&self) -> ChallengeKind {
        self.challenge_kind
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn page_location(&self) -> &str {
        &self.page_location
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn failure_reason(&self) -> &str {
        &self.failure_reason
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
