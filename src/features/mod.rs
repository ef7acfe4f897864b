pub mod attempt_tracker;
pub mod challenge_detector;
pub mod completion_waiter;
pub mod event_log;
pub mod notification;
pub mod recovery;
pub mod verification_handler;

pub use verification_handler::{CheckpointOutcome, VerificationHandler};
