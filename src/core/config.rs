use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// VerificationConfig: file-based config loader (hitl-verify.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const CONFIG_FILE_NAME: &str = "hitl-verify.json";

pub const ENV_CONFIG_PATH: &str = "HITL_VERIFY_CONFIG";
pub const ENV_TIMEOUT_SECS: &str = "HITL_VERIFY_TIMEOUT_SECS";
pub const ENV_MAX_ATTEMPTS: &str = "HITL_VERIFY_MAX_ATTEMPTS";
pub const ENV_NOTIFICATIONS: &str = "HITL_VERIFY_NOTIFICATIONS";
pub const ENV_POLL_INTERVAL_MS: &str = "HITL_VERIFY_POLL_INTERVAL_MS";
pub const ENV_DETECTION_BUDGET_MS: &str = "HITL_VERIFY_DETECTION_BUDGET_MS";
pub const ENV_LIVENESS_INTERVAL_SECS: &str = "HITL_VERIFY_LIVENESS_INTERVAL_SECS";
pub const ENV_RECOVERY_SETTLE_MS: &str = "HITL_VERIFY_RECOVERY_SETTLE_MS";
pub const ENV_FALLBACK_LOG_CAPACITY: &str = "HITL_VERIFY_FALLBACK_LOG_CAPACITY";
pub const ENV_LOG_FILE: &str = "HITL_VERIFY_LOG_FILE";

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_DETECTION_BUDGET_MS: u64 = 3000;
const DEFAULT_LIVENESS_INTERVAL_SECS: u64 = 5;
const DEFAULT_RECOVERY_SETTLE_MS: u64 = 2000;
const DEFAULT_FALLBACK_LOG_CAPACITY: usize = 256;
const MIN_POLL_INTERVAL_MS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Raw config as it appears in `hitl-verify.json`. Every field is optional;
/// use the `resolve_*` accessors (JSON field → env var → default).
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct VerificationConfig {
    /// Seconds the operator has to clear a challenge. Default: 120.
    pub timeout_secs: Option<u64>,
    /// Attempts allowed per iteration; attempt `max + 1` is rejected. Default: 3.
    pub max_attempts: Option<u32>,
    /// Print the operator banner when a challenge is detected. Default: `true`.
    pub notifications_enabled: Option<bool>,
    /// Completion polling cadence. Default: 1000 ms.
    pub poll_interval_ms: Option<u64>,
    /// Overall budget for one detection scan. Default: 3000 ms.
    pub detection_budget_ms: Option<u64>,
    /// Driver liveness probe cadence while waiting. Default: 5 s.
    pub liveness_interval_secs: Option<u64>,
    /// Pause after the recovery refresh before re-checking. Default: 2000 ms.
    pub recovery_settle_ms: Option<u64>,
    /// Entries kept in the degraded-logging buffer. Default: 256.
    pub fallback_log_capacity: Option<usize>,
    /// Optional file the event log is mirrored into.
    pub log_file: Option<PathBuf>,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    let v = std::env::var(key).ok()?;
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl VerificationConfig {
    pub fn resolve_timeout(&self) -> Duration {
        let secs = self
            .timeout_secs
            .or_else(|| env_parse(ENV_TIMEOUT_SECS))
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    /// Clamped to at least 1; a ceiling of zero would reject every attempt.
    pub fn resolve_max_attempts(&self) -> u32 {
        let raw = self
            .max_attempts
            .or_else(|| env_parse(ENV_MAX_ATTEMPTS))
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if raw == 0 {
            tracing::warn!("max_attempts=0 is not usable, falling back to 1");
        }
        raw.max(1)
    }

    pub fn resolve_notifications_enabled(&self) -> bool {
        self.notifications_enabled
            .or_else(|| env_flag(ENV_NOTIFICATIONS))
            .unwrap_or(true)
    }

    pub fn resolve_poll_interval(&self) -> Duration {
        let ms = self
            .poll_interval_ms
            .or_else(|| env_parse(ENV_POLL_INTERVAL_MS))
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        Duration::from_millis(ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn resolve_detection_budget(&self) -> Duration {
        let ms = self
            .detection_budget_ms
            .or_else(|| env_parse(ENV_DETECTION_BUDGET_MS))
            .unwrap_or(DEFAULT_DETECTION_BUDGET_MS);
        Duration::from_millis(ms)
    }

    pub fn resolve_liveness_interval(&self) -> Duration {
        let secs = self
            .liveness_interval_secs
            .or_else(|| env_parse(ENV_LIVENESS_INTERVAL_SECS))
            .unwrap_or(DEFAULT_LIVENESS_INTERVAL_SECS);
        Duration::from_secs(secs.max(1))
    }

    pub fn resolve_recovery_settle(&self) -> Duration {
        let ms = self
            .recovery_settle_ms
            .or_else(|| env_parse(ENV_RECOVERY_SETTLE_MS))
            .unwrap_or(DEFAULT_RECOVERY_SETTLE_MS);
        Duration::from_millis(ms)
    }

    pub fn resolve_fallback_log_capacity(&self) -> usize {
        self.fallback_log_capacity
            .or_else(|| env_parse(ENV_FALLBACK_LOG_CAPACITY))
            .unwrap_or(DEFAULT_FALLBACK_LOG_CAPACITY)
            .max(1)
    }

    pub fn resolve_log_file(&self) -> Option<PathBuf> {
        if let Some(p) = &self.log_file {
            return Some(p.clone());
        }
        std::env::var(ENV_LOG_FILE)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    pub fn resolve(&self) -> VerificationSettings {
        VerificationSettings {
            timeout: self.resolve_timeout(),
            max_attempts: self.resolve_max_attempts(),
            notifications_enabled: self.resolve_notifications_enabled(),
            poll_interval: self.resolve_poll_interval(),
            detection_budget: self.resolve_detection_budget(),
            liveness_interval: self.resolve_liveness_interval(),
            recovery_settle: self.resolve_recovery_settle(),
            fallback_log_capacity: self.resolve_fallback_log_capacity(),
            log_file: self.resolve_log_file(),
        }
    }
}

/// Fully resolved settings consumed by the verification handler.
#[derive(Clone, Debug, PartialEq)]
pub struct VerificationSettings {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub notifications_enabled: bool,
    pub poll_interval: Duration,
    pub detection_budget: Duration,
    pub liveness_interval: Duration,
    pub recovery_settle: Duration,
    pub fallback_log_capacity: usize,
    pub log_file: Option<PathBuf>,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            notifications_enabled: true,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            detection_budget: Duration::from_millis(DEFAULT_DETECTION_BUDGET_MS),
            liveness_interval: Duration::from_secs(DEFAULT_LIVENESS_INTERVAL_SECS),
            recovery_settle: Duration::from_millis(DEFAULT_RECOVERY_SETTLE_MS),
            fallback_log_capacity: DEFAULT_FALLBACK_LOG_CAPACITY,
            log_file: None,
        }
    }
}

impl VerificationSettings {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications_enabled = enabled;
        self
    }
}

/// Read and parse a config file at an explicit path.
pub fn load_config_from(path: &Path) -> Result<VerificationConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load `hitl-verify.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `HITL_VERIFY_CONFIG` env var path
/// 2. `./hitl-verify.json`
/// 3. `../hitl-verify.json`
/// 4. `~/.hitl-verify/config.json`
///
/// Missing file → `VerificationConfig::default()` (all env-var fallbacks apply).
/// Parse error → log a warning, return `VerificationConfig::default()`.
pub fn load_config() -> VerificationConfig {
    let mut candidates = vec![
        PathBuf::from(CONFIG_FILE_NAME),
        PathBuf::from("..").join(CONFIG_FILE_NAME),
    ];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".hitl-verify").join("config.json"));
    }

    for path in &candidates {
        match load_config_from(path) {
            Ok(cfg) => {
                tracing::info!("{} loaded from {}", CONFIG_FILE_NAME, path.display());
                return cfg;
            }
            Err(ConfigError::Io { .. }) => continue,
            Err(e) => {
                tracing::warn!("{}; using defaults", e);
                return VerificationConfig::default();
            }
        }
    }

    VerificationConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_fields_take_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"timeout_secs": 45, "max_attempts": 5, "notifications_enabled": false,
                "poll_interval_ms": 250, "log_file": "/tmp/hitl.log"}}"#
        )
        .unwrap();

        let cfg = load_config_from(file.path()).unwrap();
        let settings = cfg.resolve();
        assert_eq!(settings.timeout, Duration::from_secs(45));
        assert_eq!(settings.max_attempts, 5);
        assert!(!settings.notifications_enabled);
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.log_file, Some(PathBuf::from("/tmp/hitl.log")));
    }

    #[test]
    fn test_partial_file_keeps_other_fields_unset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"detection_budget_ms": 1500}}"#).unwrap();
        let cfg = load_config_from(file.path()).unwrap();
        assert_eq!(cfg.detection_budget_ms, Some(1500));
        assert!(cfg.timeout_secs.is_none());
        assert!(cfg.max_attempts.is_none());
    }

    #[test]
    fn test_parse_error_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = load_config_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_clamps_degenerate_values() {
        let cfg = VerificationConfig {
            max_attempts: Some(0),
            poll_interval_ms: Some(0),
            fallback_log_capacity: Some(0),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_max_attempts(), 1);
        assert_eq!(cfg.resolve_poll_interval(), Duration::from_millis(MIN_POLL_INTERVAL_MS));
        assert_eq!(cfg.resolve_fallback_log_capacity(), 1);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = VerificationSettings::default();
        assert_eq!(settings.timeout, Duration::from_secs(120));
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.detection_budget, Duration::from_secs(3));
        assert_eq!(settings.liveness_interval, Duration::from_secs(5));
        assert!(settings.notifications_enabled);
    }
}
