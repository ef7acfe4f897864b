use thiserror::Error;

use super::event::EventError;

/// Errors that cross the verification boundary.
///
/// Timeouts and attempt-limit rejections are ordinary `Ok(false)` results;
/// only loss of the driver (and event bookkeeping bugs) surface here.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("browser crashed during manual verification")]
    DriverCrashed,

    #[error("browser was closed by the operator during manual verification")]
    DriverClosed,

    #[error("event log error: {0}")]
    Event(#[from] EventError),
}

impl VerificationError {
    /// Whether the caller should abandon the current iteration and clean up.
    pub fn is_driver_loss(&self) -> bool {
        matches!(
            self,
            VerificationError::DriverCrashed | VerificationError::DriverClosed
        )
    }
}
