#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hitl_verify::core::log_sink::{LogSink, SinkError};
use hitl_verify::{AutomationDriver, Clock, DriverError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Level;

pub const DESTINATION: &str = "/account/profile";

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A change applied to the mock once its due time has passed.
#[derive(Debug, Clone)]
pub enum Scheduled {
    Navigate(String),
    ClearProbes,
    Show(String),
    Detach,
    FailNextLocationRead(DriverError),
}

#[derive(Default)]
struct MockState {
    has_page: bool,
    location: String,
    visible: HashSet<String>,
    hidden: HashSet<String>,
    probe_errors: HashMap<String, DriverError>,
    location_errors: VecDeque<DriverError>,
    persistent_location_error: Option<DriverError>,
    refresh_error: Option<DriverError>,
    location_after_refresh: Option<String>,
    hidden_wait: Option<Duration>,
    schedule: Vec<(Instant, Scheduled)>,
    probed: Vec<String>,
    location_calls: usize,
    refresh_calls: usize,
}

impl MockState {
    fn apply_due(&mut self) {
        let now = Instant::now();
        let mut pending = Vec::new();
        for (due, action) in self.schedule.drain(..) {
            if due > now {
                pending.push((due, action));
                continue;
            }
            match action {
                Scheduled::Navigate(location) => self.location = location,
                Scheduled::ClearProbes => self.visible.clear(),
                Scheduled::Show(selector) => {
                    self.visible.insert(selector);
                }
                Scheduled::Detach => self.has_page = false,
                Scheduled::FailNextLocationRead(err) => self.location_errors.push_back(err),
            }
        }
        self.schedule = pending;
    }
}

/// Scripted in-memory driver.
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    pub fn at(location: &str) -> Self {
        Self {
            state: Mutex::new(MockState {
                has_page: true,
                location: location.to_string(),
                ..Default::default()
            }),
        }
    }

    pub fn without_page() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_visible(self, selector: &str) -> Self {
        self.state.lock().unwrap().visible.insert(selector.to_string());
        self
    }

    pub fn with_probe_error(self, selector: &str, err: DriverError) -> Self {
        self.state
            .lock()
            .unwrap()
            .probe_errors
            .insert(selector.to_string(), err);
        self
    }

    /// Present in the DOM but not rendered; probes wait on it until their timeout.
    pub fn with_hidden(self, selector: &str) -> Self {
        self.state.lock().unwrap().hidden.insert(selector.to_string());
        self
    }

    /// Cap how long a probe waits on a hidden element.
    pub fn with_hidden_wait(self, wait: Duration) -> Self {
        self.state.lock().unwrap().hidden_wait = Some(wait);
        self
    }

    /// The next `n` location reads fail with `err`.
    pub fn with_location_errors(self, n: usize, err: DriverError) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for _ in 0..n {
                state.location_errors.push_back(err.clone());
            }
        }
        self
    }

    pub fn with_persistent_location_error(self, err: DriverError) -> Self {
        self.state.lock().unwrap().persistent_location_error = Some(err);
        self
    }

    pub fn with_refresh_error(self, err: DriverError) -> Self {
        self.state.lock().unwrap().refresh_error = Some(err);
        self
    }

    pub fn with_location_after_refresh(self, location: &str) -> Self {
        self.state.lock().unwrap().location_after_refresh = Some(location.to_string());
        self
    }

    /// Apply `action` once `after` has elapsed from now.
    pub fn schedule(self, after: Duration, action: Scheduled) -> Self {
        self.state
            .lock()
            .unwrap()
            .schedule
            .push((Instant::now() + after, action));
        self
    }

    pub fn set_location(&self, location: &str) {
        self.state.lock().unwrap().location = location.to_string();
    }

    pub fn probed(&self) -> Vec<String> {
        self.state.lock().unwrap().probed.clone()
    }

    pub fn probe_calls(&self) -> usize {
        self.state.lock().unwrap().probed.len()
    }

    pub fn location_calls(&self) -> usize {
        self.state.lock().unwrap().location_calls
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.lock().unwrap().refresh_calls
    }
}

#[async_trait]
impl AutomationDriver for MockDriver {
    fn has_page(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.apply_due();
        state.has_page
    }

    async fn current_location(&self) -> Result<String, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.apply_due();
        state.location_calls += 1;
        if !state.has_page {
            return Err(DriverError::SessionClosed("page detached".into()));
        }
        if let Some(err) = state.location_errors.pop_front() {
            return Err(err);
        }
        if let Some(err) = &state.persistent_location_error {
            return Err(err.clone());
        }
        Ok(state.location.clone())
    }

    async fn is_element_visible(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.apply_due();
            state.probed.push(selector.to_string());
            if !state.has_page {
                return Err(DriverError::SessionClosed("page detached".into()));
            }
            if let Some(err) = state.probe_errors.get(selector) {
                return Err(err.clone());
            }
            if state.visible.contains(selector) {
                return Ok(true);
            }
            // Existence first: an absent element is reported without waiting.
            if !state.hidden.contains(selector) {
                return Ok(false);
            }
            state.hidden_wait.unwrap_or(timeout).min(timeout)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(false)
    }

    async fn refresh(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.refresh_calls += 1;
        if let Some(err) = &state.refresh_error {
            return Err(err.clone());
        }
        if let Some(location) = state.location_after_refresh.take() {
            state.location = location;
        }
        Ok(())
    }
}

/// Clock that only moves when something sleeps on it.
pub struct ManualClock {
    base: Instant,
    base_wall: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            base_wall: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        self.base_wall + chrono::Duration::from_std(self.elapsed()).unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.offset.lock().unwrap() += duration;
        tokio::task::yield_now().await;
    }
}

/// Sink whose backing store is permanently unavailable.
pub struct FailingSink;

impl LogSink for FailingSink {
    fn emit(&self, _level: Level, _message: &str) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("disk full".into()))
    }
}
