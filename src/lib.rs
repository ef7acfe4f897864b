pub mod browser;
pub mod core;
pub mod features;

// --- Primary exports ---
pub use crate::browser::{
    AutomationDriver, ChromiumDriver, ChromiumSession, DriverError, DriverErrorKind,
};
pub use crate::core::log_sink::{FanoutSink, FileSink, LogSink, SinkError, TracingSink};
pub use crate::core::types::*;
pub use crate::core::{
    load_config, Clock, TokioClock, VerificationConfig, VerificationError, VerificationEvent,
    VerificationSettings,
};
pub use crate::features::event_log::{EventLog, EventSummary};
pub use crate::features::recovery::ResumeOutcome;
pub use crate::features::{CheckpointOutcome, VerificationHandler};
