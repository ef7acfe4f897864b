//! Primary log sinks behind the event log's logging port.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::Level;

pub const EVENTS_TARGET: &str = "hitl_verify::events";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("log sink io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log sink unavailable: {0}")]
    Unavailable(String),
}

pub trait LogSink: Send + Sync {
    fn emit(&self, level: Level, message: &str) -> Result<(), SinkError>;
}

/// Forwards every message to `tracing` under [`EVENTS_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, level: Level, message: &str) -> Result<(), SinkError> {
        match level {
            Level::ERROR => tracing::error!(target: EVENTS_TARGET, "{}", message),
            Level::WARN => tracing::warn!(target: EVENTS_TARGET, "{}", message),
            Level::INFO => tracing::info!(target: EVENTS_TARGET, "{}", message),
            Level::DEBUG => tracing::debug!(target: EVENTS_TARGET, "{}", message),
            _ => tracing::trace!(target: EVENTS_TARGET, "{}", message),
        }
        Ok(())
    }
}

/// Appends `<rfc3339> <LEVEL> <message>` lines to a file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn emit(&self, level: Level, message: &str) -> Result<(), SinkError> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| SinkError::Unavailable(format!("{} lock poisoned", self.path.display())))?;
        writeln!(
            file,
            "{} {:<5} {}",
            chrono::Utc::now().to_rfc3339(),
            level,
            message
        )?;
        file.flush()?;
        Ok(())
    }
}

/// Emits to every inner sink; the first failure is reported after all sinks ran.
pub struct FanoutSink {
    sinks: Vec<Box<dyn LogSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Box<dyn LogSink>>) -> Self {
        Self { sinks }
    }
}

impl LogSink for FanoutSink {
    fn emit(&self, level: Level, message: &str) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(level, message) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
