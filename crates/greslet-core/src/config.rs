//! Configuration types for greslet

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// API server configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Scheduling loop configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Submission spool configuration
    #[serde(default)]
    pub queue: QueueConfig,
    /// Node execution configuration
    #[serde(default)]
    pub exec: ExecConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DaemonConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::GresletError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::GresletError::Config(format!("Failed to read config file: {}", e))
        })?;
        toml::from_str(&content)
            .map_err(|e| crate::GresletError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind the REST API server
    pub bind_address: String,
    /// Port for the REST API server
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 9090,
        }
    }
}

/// Scheduling loop configuration
///
/// The spec leaves the exact cadence, staleness cutoff and fairness window
/// open; they are configuration here rather than constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduling cycles
    pub cycle_interval_secs: u64,
    /// A node report older than this is excluded from allocation
    pub staleness_threshold_secs: u64,
    /// Trailing window for per-user usage accounting
    pub usage_window_secs: u64,
    /// Reservation retries against a refreshed snapshot before deferring a job
    pub conflict_retry: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 10,
            staleness_threshold_secs: 180,
            usage_window_secs: 7 * 24 * 3600,
            conflict_retry: 1,
        }
    }
}

impl SchedulerConfig {
    /// Cycle interval as a `Duration`
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    /// Staleness threshold as a `chrono::Duration`
    pub fn staleness_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_threshold_secs as i64)
    }
}

/// Submission spool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Directory holding submissions and the acknowledgment ledger
    pub spool_dir: PathBuf,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            spool_dir: PathBuf::from("/var/lib/greslet/spool"),
        }
    }
}

/// Node execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// ssh binary used to reach nodes
    pub ssh_binary: String,
    /// Connection timeout passed to ssh, in seconds
    pub connect_timeout_secs: u64,
    /// How long a forced termination may take before counting as failed
    pub terminate_timeout_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            ssh_binary: "ssh".to_string(),
            connect_timeout_secs: 10,
            terminate_timeout_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_daemon_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.api.port, 9090);
        assert_eq!(config.scheduler.cycle_interval_secs, 10);
        assert_eq!(config.scheduler.staleness_threshold_secs, 180);
    }

    #[test]
    fn test_partial_toml_parse() {
        let toml_str = r#"
[api]
bind_address = "127.0.0.1"
port = 8800

[scheduler]
cycle_interval_secs = 5
staleness_threshold_secs = 60
usage_window_secs = 86400
conflict_retry = 1
"#;
        let config: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api.port, 8800);
        assert_eq!(config.scheduler.cycle_interval_secs, 5);
        // omitted sections fall back to defaults
        assert_eq!(config.exec.ssh_binary, "ssh");
        assert_eq!(config.queue.spool_dir, PathBuf::from("/var/lib/greslet/spool"));
    }
}
