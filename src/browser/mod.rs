pub mod chromium;
pub mod driver;

pub use chromium::{ChromiumDriver, ChromiumSession};
pub use driver::{check_liveness, AutomationDriver, DriverError, DriverErrorKind};
