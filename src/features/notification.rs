use std::time::Duration;

use crate::core::types::ChallengeKind;
use crate::features::event_log::EventLog;

#[cfg(feature = "desktop-notify")]
use notify_rust::Notification;

const BANNER_WIDTH: usize = 64;

/// Boxed text banner shown to the operator when a challenge needs solving.
pub fn render_banner(kind: ChallengeKind, timeout: Duration, remaining: Duration) -> String {
    let rule = "=".repeat(BANNER_WIDTH);
    let lines = [
        "MANUAL VERIFICATION REQUIRED".to_string(),
        String::new(),
        format!("Challenge type: {}", kind),
        String::new(),
        "Please solve the challenge in the open browser window.".to_string(),
        "Automation resumes once the page moves past the challenge.".to_string(),
        String::new(),
        format!("Timeout: {} seconds", timeout.as_secs()),
        format!("Time remaining: {} seconds", remaining.as_secs()),
    ];

    let mut banner = String::new();
    banner.push_str(&rule);
    banner.push('\n');
    for line in lines {
        banner.push_str(&format!("| {:<width$} |\n", line, width = BANNER_WIDTH - 4));
    }
    banner.push_str(&rule);
    banner
}

#[derive(Debug, Clone)]
pub struct OperatorNotifier {
    enabled: bool,
}

impl OperatorNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Print the banner and log the request. Returns whether anything was shown.
    pub fn notify(
        &self,
        log: &mut EventLog,
        kind: ChallengeKind,
        timeout: Duration,
        remaining: Duration,
    ) -> bool {
        if !self.enabled {
            log.debug("Operator notification suppressed (notifications disabled)");
            return false;
        }

        println!("{}", render_banner(kind, timeout, remaining));
        log.info(format!(
            "Operator notified: {} challenge, {}s remaining",
            kind,
            remaining.as_secs()
        ));

        #[cfg(feature = "desktop-notify")]
        {
            let body = format!(
                "A {} challenge needs solving in the browser ({}s remaining).",
                kind,
                remaining.as_secs()
            );
            if let Err(e) = Notification::new()
                .summary("Manual verification required")
                .body(&body)
                .show()
            {
                log.debug(format!("Desktop notification unavailable: {}", e));
            }
        }

        true
    }
}
