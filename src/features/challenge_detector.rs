use std::time::Duration;
use tracing::{debug, info};

use crate::browser::driver::AutomationDriver;
use crate::core::clock::Clock;
use crate::core::types::ChallengeKind;

/// Element probes checked in order. The first visible one decides the kind,
/// so the ordering is part of the detection contract.
pub const CHALLENGE_PROBES: [&str; 7] = [
    "#px-captcha",
    "[data-testid=\"px-captcha\"]",
    ".px-captcha-container",
    "#challenge-container",
    "iframe[src*=\"captcha\"]",
    "div[id*=\"px-captcha\"]",
    "div[class*=\"px-captcha\"]",
];

pub const DEFAULT_DETECTION_BUDGET: Duration = Duration::from_secs(3);
const MIN_PROBE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub kind: ChallengeKind,
    pub selector: &'static str,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct ChallengeDetector {
    budget: Duration,
}

impl Default for ChallengeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_DETECTION_BUDGET)
    }
}

impl ChallengeDetector {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Scan the probes within the overall budget. Probe failures count as
    /// "not present"; an exhausted budget skips the remaining probes.
    pub async fn detect(
        &self,
        driver: &dyn AutomationDriver,
        clock: &dyn Clock,
    ) -> Option<Detection> {
        if !driver.has_page() {
            return None;
        }

        let started = clock.now();
        for selector in CHALLENGE_PROBES {
            let elapsed = clock.now().saturating_duration_since(started);
            if elapsed >= self.budget {
                debug!(
                    "challenge detection budget exhausted after {:.2}s",
                    elapsed.as_secs_f64()
                );
                return None;
            }

            let probe_timeout = (self.budget - elapsed).max(MIN_PROBE_TIMEOUT);
            match driver.is_element_visible(selector, probe_timeout).await {
                Ok(true) => {
                    let kind = ChallengeKind::classify(selector);
                    info!("challenge detected: {} (selector: {})", kind, selector);
                    return Some(Detection {
                        kind,
                        selector,
                        elapsed: clock.now().saturating_duration_since(started),
                    });
                }
                Ok(false) => {}
                Err(e) => debug!("probe {} ignored: {}", selector, e),
            }
        }
        None
    }
}

/// First probe that is visible right now, without waiting.
pub async fn first_visible_probe(driver: &dyn AutomationDriver) -> Option<&'static str> {
    for selector in CHALLENGE_PROBES {
        if let Ok(true) = driver.is_element_visible(selector, Duration::ZERO).await {
            return Some(selector);
        }
    }
    None
}
