//! Append-only record of verification events plus the logging port.
//!
//! Every message goes through the injected [`LogSink`]. When the sink itself
//! fails the message is kept in a bounded in-memory buffer and echoed to
//! stdout, so a broken log file never hides what happened.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use tracing::Level;

use crate::core::event::{EventError, VerificationEvent};
use crate::core::log_sink::{LogSink, TracingSink};
use crate::core::types::{ChallengeKind, Completion};

pub const LOG_TAG: &str = "[MANUAL_VERIFICATION]";
pub const DEFAULT_FALLBACK_CAPACITY: usize = 256;

/// Position of an event inside its [`EventLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EventId(usize);

impl EventId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventSummary {
    pub total: usize,
    pub open: usize,
    pub succeeded: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub failures_by_reason: BTreeMap<String, usize>,
    pub mean_duration_seconds: f64,
}

pub struct EventLog {
    events: Vec<VerificationEvent>,
    sink: Box<dyn LogSink>,
    fallback: VecDeque<String>,
    fallback_capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(Box::new(TracingSink))
    }
}

impl EventLog {
    pub fn new(sink: Box<dyn LogSink>) -> Self {
        Self {
            events: Vec::new(),
            sink,
            fallback: VecDeque::new(),
            fallback_capacity: DEFAULT_FALLBACK_CAPACITY,
        }
    }

    pub fn with_fallback_capacity(mut self, capacity: usize) -> Self {
        self.fallback_capacity = capacity.max(1);
        while self.fallback.len() > self.fallback_capacity {
            self.fallback.pop_front();
        }
        self
    }

    /// Record a newly detected challenge and return its handle.
    pub fn open(
        &mut self,
        kind: ChallengeKind,
        page_location: &str,
        at: DateTime<Utc>,
    ) -> EventId {
        let event = VerificationEvent::open(kind, page_location, at);
        let id = EventId(self.events.len());
        self.events.push(event);
        self.info(format!(
            "Challenge detected: {} at {} on {}",
            kind,
            at.to_rfc3339(),
            page_location
        ));
        id
    }

    /// Close an open event. A second completion of the same event is rejected.
    pub fn complete(
        &mut self,
        id: EventId,
        completion: Completion,
        at: DateTime<Utc>,
    ) -> Result<&VerificationEvent, EventError> {
        let (succeeded, timed_out, reason) = completion.parts();
        let event = self
            .events
            .get_mut(id.0)
            .ok_or(EventError::UnknownEvent(id.0))?;
        event.complete_at(at, succeeded, timed_out, reason)?;

        let kind = event.challenge_kind();
        let duration = event.duration_seconds();
        match completion {
            Completion::Succeeded => self.info(format!(
                "Verification completed successfully in {:.1}s (kind={})",
                duration, kind
            )),
            Completion::TimedOut => self.warn(format!(
                "Verification timed out after {:.1}s (kind={}, reason={})",
                duration, kind, reason
            )),
            Completion::Failed(_) => self.error(format!(
                "Verification failed: {} (kind={}, duration={:.1}s)",
                reason, kind, duration
            )),
        }

        self.events.get(id.0).ok_or(EventError::UnknownEvent(id.0))
    }

    pub fn events(&self) -> &[VerificationEvent] {
        &self.events
    }

    pub fn get(&self, id: EventId) -> Option<&VerificationEvent> {
        self.events.get(id.0)
    }

    pub fn open_events(&self) -> impl Iterator<Item = &VerificationEvent> {
        self.events.iter().filter(|e| e.is_open())
    }

    pub fn summary(&self) -> EventSummary {
        let mut summary = EventSummary {
            total: self.events.len(),
            ..Default::default()
        };
        let mut duration_total = 0.0;
        let mut completed = 0usize;
        for event in &self.events {
            if event.is_open() {
                summary.open += 1;
                continue;
            }
            completed += 1;
            duration_total += event.duration_seconds();
            if event.succeeded() {
                summary.succeeded += 1;
            } else {
                if event.timed_out() {
                    summary.timed_out += 1;
                } else {
                    summary.failed += 1;
                }
                *summary
                    .failures_by_reason
                    .entry(event.failure_reason().to_string())
                    .or_insert(0) += 1;
            }
        }
        if completed > 0 {
            summary.mean_duration_seconds = duration_total / completed as f64;
        }
        summary
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events)
    }

    /// Write a tagged message through the sink, degrading to the fallback
    /// buffer and stdout if the sink fails.
    pub fn log(&mut self, level: Level, message: impl AsRef<str>) {
        let message = format!("{} {}", LOG_TAG, message.as_ref());
        if let Err(e) = self.sink.emit(level, &message) {
            let entry = format!("{}: {}", level, message);
            println!("[LOG_FALLBACK] {}", entry);
            println!("[LOG_FALLBACK] Logging error: {}", e);
            if self.fallback.len() >= self.fallback_capacity {
                self.fallback.pop_front();
            }
            self.fallback.push_back(entry);
        }
    }

    pub fn debug(&mut self, message: impl AsRef<str>) {
        self.log(Level::DEBUG, message);
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        self.log(Level::INFO, message);
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        self.log(Level::WARN, message);
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.log(Level::ERROR, message);
    }

    pub fn fallback_logs(&self) -> Vec<String> {
        self.fallback.iter().cloned().collect()
    }

    pub fn clear_fallback_logs(&mut self) {
        self.fallback.clear();
    }
}
