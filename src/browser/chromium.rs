//! [`AutomationDriver`] over a Chromium DevTools page via `chromiumoxide`.
//!
//! The adapter only answers the three questions the verification gate asks:
//! where the page is, whether a selector is visible, and "please reload".
//! Navigation and form interaction stay with the caller.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::driver::{AutomationDriver, DriverError};

const PROBE_INTERVAL: Duration = Duration::from_millis(100);
const INVALID_SELECTOR_MARKER: &str = "__hitl_invalid_selector__";

const ABSENT_MARKER: &str = "__hitl_absent__";

/// What one evaluation of the visibility script saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    Absent,
    Hidden,
    Visible,
}

pub struct ChromiumDriver {
    page: Option<Page>,
    closed: Arc<AtomicBool>,
}

impl ChromiumDriver {
    pub fn new(page: Page, closed: Arc<AtomicBool>) -> Self {
        Self {
            page: Some(page),
            closed,
        }
    }

    /// A driver with no page attached; every wait on it returns immediately.
    pub fn detached() -> Self {
        Self {
            page: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn page(&self) -> Result<&Page, DriverError> {
        if self.is_closed() {
            return Err(DriverError::SessionClosed(
                "browser window was closed".to_string(),
            ));
        }
        self.page
            .as_ref()
            .ok_or_else(|| DriverError::SessionClosed("no page attached".to_string()))
    }

    async fn probe_once(
        &self,
        page: &Page,
        selector: &str,
        script: &str,
    ) -> Result<ProbeState, DriverError> {
        let value = page
            .evaluate(script)
            .await
            .map_err(map_cdp_error)?
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Bool(false));
        decode_probe(value, selector)
    }
}

#[async_trait]
impl AutomationDriver for ChromiumDriver {
    fn has_page(&self) -> bool {
        self.page.is_some() && !self.is_closed()
    }

    async fn current_location(&self) -> Result<String, DriverError> {
        let page = self.page()?;
        let url = page.url().await.map_err(map_cdp_error)?;
        Ok(url.unwrap_or_default())
    }

    async fn is_element_visible(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        let page = self.page()?;
        let script = visibility_script(selector);
        let deadline = Instant::now() + timeout;
        loop {
            match self.probe_once(page, selector, &script).await? {
                ProbeState::Visible => return Ok(true),
                // Only an element that exists is worth waiting on.
                ProbeState::Absent => return Ok(false),
                ProbeState::Hidden => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(PROBE_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn refresh(&self) -> Result<(), DriverError> {
        let page = self.page()?;
        page.reload().await.map_err(map_cdp_error)?;
        Ok(())
    }
}

fn decode_probe(value: serde_json::Value, selector: &str) -> Result<ProbeState, DriverError> {
    match value {
        serde_json::Value::Bool(true) => Ok(ProbeState::Visible),
        serde_json::Value::String(s) if s == ABSENT_MARKER => Ok(ProbeState::Absent),
        serde_json::Value::String(s) if s == INVALID_SELECTOR_MARKER => {
            Err(DriverError::InvalidSelector(selector.to_string()))
        }
        _ => Ok(ProbeState::Hidden),
    }
}

/// JS expression: `true` when `selector` matches a rendered, non-hidden
/// element, the absent marker when nothing matches, `false` when it is hidden.
fn visibility_script(selector: &str) -> String {
    let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(() => {{
            let el;
            try {{ el = document.querySelector({quoted}); }}
            catch (e) {{ return '{marker}'; }}
            if (!el) return '{absent}';
            const style = window.getComputedStyle(el);
            if (style.display === 'none' || style.visibility === 'hidden' || Number(style.opacity) === 0) return false;
            const rect = el.getBoundingClientRect();
            return rect.width > 0 && rect.height > 0;
        }})()"#,
        quoted = quoted,
        marker = INVALID_SELECTOR_MARKER,
        absent = ABSENT_MARKER,
    )
}

fn map_cdp_error(err: CdpError) -> DriverError {
    if matches!(err, CdpError::Timeout) {
        return DriverError::Timeout(err.to_string());
    }
    let text = err.to_string();
    let lower = text.to_lowercase();
    if lower.contains("receiver is gone")
        || lower.contains("channel")
        || lower.contains("websocket")
        || lower.contains("connection")
    {
        DriverError::Disconnected(text)
    } else if lower.contains("target closed")
        || lower.contains("session closed")
        || lower.contains("no target with given id")
    {
        DriverError::SessionClosed(text)
    } else if lower.contains("node with given id") || lower.contains("stale") {
        DriverError::StaleElement(text)
    } else {
        DriverError::Other(text)
    }
}

/// Drain the CDP event stream; flips `closed` once the browser goes away.
pub fn spawn_handler_task(
    mut handler: chromiumoxide::Handler,
    closed: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("chromiumoxide handler event error: {}", e);
            }
        }
        closed.store(true, Ordering::SeqCst);
    })
}

/// A browser attached over CDP plus the driver for its working page.
pub struct ChromiumSession {
    pub browser: Browser,
    pub driver: Arc<ChromiumDriver>,
    handler_task: tokio::task::JoinHandle<()>,
}

impl ChromiumSession {
    /// Attach to an already running browser at `ws_url` and drive its first tab.
    pub async fn attach(ws_url: &str) -> Result<Self> {
        let (browser, handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| anyhow!("Browser connect failed ({}): {}", ws_url, e))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&closed));

        let page = match browser.pages().await?.into_iter().next() {
            Some(page) => page,
            None => browser.new_page("about:blank").await?,
        };
        info!("attached to browser at {}", ws_url);

        Ok(Self {
            browser,
            driver: Arc::new(ChromiumDriver::new(page, closed)),
            handler_task,
        })
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
