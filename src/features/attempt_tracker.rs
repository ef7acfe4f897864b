use crate::features::event_log::EventLog;

/// Counts verification attempts within one logical iteration.
///
/// `count == max_attempts` is still a legal attempt; only `count > max_attempts`
/// is exceeded. Messages go through the session's [`EventLog`].
#[derive(Debug, Clone)]
pub struct AttemptTracker {
    count: u32,
    max_attempts: u32,
}

impl AttemptTracker {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            count: 0,
            max_attempts,
        }
    }

    pub fn increment(&mut self, log: &mut EventLog) -> u32 {
        self.count = self.count.saturating_add(1);
        log.info(format!(
            "Verification attempt {}/{}",
            self.count, self.max_attempts
        ));
        self.count
    }

    /// Whether the ceiling has been passed, logging the rejection when it has.
    pub fn exceeded(&self, log: &mut EventLog) -> bool {
        let exceeded = self.is_exceeded();
        if exceeded {
            log.error(format!(
                "Maximum verification attempts ({}) exceeded. Current count: {}",
                self.max_attempts, self.count
            ));
        }
        exceeded
    }

    pub fn is_exceeded(&self) -> bool {
        self.count > self.max_attempts
    }

    /// Only call at iteration boundaries, never mid-wait.
    pub fn reset(&mut self, log: &mut EventLog) {
        log.debug(format!(
            "Resetting verification count from {} to 0",
            self.count
        ));
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::log_sink::{LogSink, SinkError};
    use tracing::Level;

    struct Unavailable;

    impl LogSink for Unavailable {
        fn emit(&self, _level: Level, _message: &str) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("closed".into()))
        }
    }

    #[test]
    fn test_limit_itself_is_legal() {
        let mut log = EventLog::default();
        let mut tracker = AttemptTracker::new(3);
        for expected in 1..=3 {
            assert_eq!(tracker.increment(&mut log), expected);
            assert!(!tracker.exceeded(&mut log));
        }
        assert_eq!(tracker.remaining(), 0);
        tracker.increment(&mut log);
        assert!(tracker.exceeded(&mut log));
        assert_eq!(tracker.count(), 4);
    }

    #[test]
    fn test_reset_behaves_like_new() {
        let mut log = EventLog::default();
        for max in 1..=4u32 {
            let mut tracker = AttemptTracker::new(max);
            for _ in 0..(max + 2) {
                tracker.increment(&mut log);
            }
            assert!(tracker.is_exceeded());
            tracker.reset(&mut log);
            assert_eq!(tracker.count(), 0);
            assert_eq!(tracker.remaining(), max);

            let outcomes: Vec<bool> = (0..=max)
                .map(|_| {
                    tracker.increment(&mut log);
                    tracker.is_exceeded()
                })
                .collect();
            let mut expected = vec![false; max as usize];
            expected.push(true);
            assert_eq!(outcomes, expected);
        }
    }

    #[test]
    fn test_count_only_grows() {
        let mut log = EventLog::default();
        let mut tracker = AttemptTracker::new(1);
        let mut last = tracker.count();
        for _ in 0..10 {
            let now = tracker.increment(&mut log);
            assert!(now > last);
            last = now;
        }
    }

    #[test]
    fn test_messages_use_the_event_log() {
        let mut log = EventLog::new(Box::new(Unavailable));
        let mut tracker = AttemptTracker::new(1);
        tracker.increment(&mut log);
        tracker.increment(&mut log);
        assert!(tracker.exceeded(&mut log));

        let fallback = log.fallback_logs();
        assert_eq!(fallback.len(), 3);
        assert!(fallback[0].contains("[MANUAL_VERIFICATION] Verification attempt 1/1"));
        assert!(fallback[1].contains("Verification attempt 2/1"));
        assert!(fallback[2].starts_with("ERROR"));
        assert!(fallback[2].contains("Maximum verification attempts (1) exceeded"));
    }
}
