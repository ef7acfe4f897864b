pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod log_sink;
pub mod types;

pub use clock::{Clock, TokioClock};
pub use config::{load_config, VerificationConfig, VerificationSettings};
pub use error::VerificationError;
pub use event::VerificationEvent;
