use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
    /// The page or window is gone; property access on it is structurally invalid.
    SessionClosed,
    /// The transport to the browser dropped.
    Disconnected,
    Timeout,
    StaleElement,
    InvalidSelector,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("session closed: {0}")]
    SessionClosed(String),

    #[error("driver disconnected: {0}")]
    Disconnected(String),

    #[error("driver timeout: {0}")]
    Timeout(String),

    #[error("stale element: {0}")]
    StaleElement(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    pub fn kind(&self) -> DriverErrorKind {
        match self {
            DriverError::SessionClosed(_) => DriverErrorKind::SessionClosed,
            DriverError::Disconnected(_) => DriverErrorKind::Disconnected,
            DriverError::Timeout(_) => DriverErrorKind::Timeout,
            DriverError::StaleElement(_) => DriverErrorKind::StaleElement,
            DriverError::InvalidSelector(_) => DriverErrorKind::InvalidSelector,
            DriverError::Other(_) => DriverErrorKind::Other,
        }
    }

    /// True when the failure may mean the browser itself went away and a
    /// liveness probe should decide.
    pub fn suggests_driver_loss(&self) -> bool {
        match self {
            DriverError::Disconnected(_) => true,
            DriverError::Other(message) => {
                let lower = message.to_lowercase();
                ["browser", "page", "target", "connection"]
                    .iter()
                    .any(|needle| lower.contains(needle))
            }
            _ => false,
        }
    }
}

/// The automation driver the verification gate runs against.
///
/// Implementations own a single page/tab; the gate never navigates, fills or
/// clicks through this trait.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Whether a page is currently attached.
    fn has_page(&self) -> bool;

    async fn current_location(&self) -> Result<String, DriverError>;

    /// Wait up to `timeout` for `selector` to be present and visible.
    async fn is_element_visible(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, DriverError>;

    async fn refresh(&self) -> Result<(), DriverError>;
}

/// Cheap liveness probe: a page must be attached and answer a location query.
pub async fn check_liveness(driver: &dyn AutomationDriver) -> Result<(), DriverError> {
    if !driver.has_page() {
        return Err(DriverError::Disconnected("no page attached".to_string()));
    }
    driver.current_location().await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            DriverError::SessionClosed("x".into()).kind(),
            DriverErrorKind::SessionClosed
        );
        assert_eq!(DriverError::Other("x".into()).kind(), DriverErrorKind::Other);
    }

    #[test]
    fn test_driver_loss_heuristic() {
        assert!(DriverError::Disconnected("ws closed".into()).suggests_driver_loss());
        assert!(DriverError::Other("Target page crashed".into()).suggests_driver_loss());
        assert!(!DriverError::Other("element detached".into()).suggests_driver_loss());
        assert!(!DriverError::Timeout("browser slow".into()).suggests_driver_loss());
        assert!(!DriverError::SessionClosed("gone".into()).suggests_driver_loss());
    }
}
