//! Application configuration structures.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::ConfigError;

// =============================================================================
// Constants
// =============================================================================

/// Default ping interval (30 seconds).
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default speedtest interval (5 minutes).
pub const DEFAULT_SPEEDTEST_INTERVAL: Duration = Duration::from_secs(300);

/// Default echo requests per ping execution.
const DEFAULT_PING_COUNT: u32 = 5;

/// Margin subtracted from the interval for the default speedtest timeout.
const TIMEOUT_MARGIN: Duration = Duration::from_secs(1);

fn default_ping_interval() -> Duration {
    DEFAULT_PING_INTERVAL
}

fn default_speedtest_interval() -> Duration {
    DEFAULT_SPEEDTEST_INTERVAL
}

fn default_ping_count() -> u32 {
    DEFAULT_PING_COUNT
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Metrics exposition server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8000).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

// =============================================================================
// Probe Sections
// =============================================================================

/// Reachability probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingSection {
    /// Hosts to ping (hostname or dotted-decimal).
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Interval between executions per host (default: 30s).
    #[serde(default = "default_ping_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Echo requests per execution (default: 5).
    #[serde(default = "default_ping_count")]
    pub count: u32,

    /// Maximum random start delay applied independently per host, so many
    /// hosts do not probe in lockstep (default: 0).
    #[serde(default, with = "humantime_serde")]
    pub max_jitter: Duration,
}

impl Default for PingSection {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            interval: DEFAULT_PING_INTERVAL,
            count: DEFAULT_PING_COUNT,
            max_jitter: Duration::ZERO,
        }
    }
}

/// Throughput probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedtestSection {
    /// Test servers, optionally with a `:port` suffix.
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Interval between executions per host (default: 5m).
    #[serde(default = "default_speedtest_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Execution timeout; the child is killed when it elapses. Must be
    /// strictly below the interval (default: interval minus 1s).
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,

    /// Maximum random start delay applied independently per host
    /// (default: 0).
    #[serde(default, with = "humantime_serde")]
    pub max_jitter: Duration,
}

impl Default for SpeedtestSection {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            interval: DEFAULT_SPEEDTEST_INTERVAL,
            timeout: None,
            max_jitter: Duration::ZERO,
        }
    }
}

impl SpeedtestSection {
    /// Timeout to enforce on executions: the configured value, or the
    /// interval minus a one-second margin.
    pub fn effective_timeout(&self) -> Duration {
        self.timeout
            .unwrap_or_else(|| self.interval.saturating_sub(TIMEOUT_MARGIN))
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Metrics exposition server configuration.
    pub server: ServerConfig,

    /// Reachability probes.
    pub ping: PingSection,

    /// Throughput probes.
    pub speedtest: SpeedtestSection,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::Validation(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.ping.interval.is_zero() {
            return Err(ConfigError::Validation(
                "ping interval must be greater than zero".to_string(),
            ));
        }

        if self.ping.count == 0 {
            return Err(ConfigError::Validation(
                "ping count must be at least 1".to_string(),
            ));
        }

        for host in &self.ping.hosts {
            if host.is_empty() {
                return Err(ConfigError::Validation(
                    "ping host cannot be empty".to_string(),
                ));
            }
        }

        if self.speedtest.interval.is_zero() {
            return Err(ConfigError::Validation(
                "speedtest interval must be greater than zero".to_string(),
            ));
        }

        for host in &self.speedtest.hosts {
            if host.is_empty() {
                return Err(ConfigError::Validation(
                    "speedtest host cannot be empty".to_string(),
                ));
            }
        }

        // A hung speedtest must be killed before its own next tick.
        let timeout = self.speedtest.effective_timeout();
        if timeout.is_zero() {
            return Err(ConfigError::Validation(
                "speedtest timeout must be greater than zero \
                 (interval too short for the default timeout)"
                    .to_string(),
            ));
        }
        if timeout >= self.speedtest.interval {
            return Err(ConfigError::Validation(format!(
                "speedtest timeout ({}) must be strictly below the interval ({})",
                humantime::format_duration(timeout),
                humantime::format_duration(self.speedtest.interval)
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.ping.interval, DEFAULT_PING_INTERVAL);
        assert_eq!(config.ping.count, 5);
        assert_eq!(config.speedtest.interval, DEFAULT_SPEEDTEST_INTERVAL);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
server:
  bind: "127.0.0.1"
  port: 9100
ping:
  hosts: ["8.8.8.8", "www.example.org"]
  interval: 10s
  count: 3
  max_jitter: 2s
speedtest:
  hosts: ["d-speed.bi-host.net:8080"]
  interval: 5m
  timeout: 2m
  max_jitter: 30s
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.ping.hosts.len(), 2);
        assert_eq!(config.ping.interval, Duration::from_secs(10));
        assert_eq!(config.ping.count, 3);
        assert_eq!(config.ping.max_jitter, Duration::from_secs(2));
        assert_eq!(config.speedtest.interval, Duration::from_secs(300));
        assert_eq!(config.speedtest.effective_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = r#"
ping:
  hosts: ["8.8.8.8"]
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.ping.hosts, vec!["8.8.8.8"]);
        assert!(config.speedtest.hosts.is_empty());
    }

    #[test]
    fn default_speedtest_timeout_is_interval_minus_margin() {
        let section = SpeedtestSection {
            interval: Duration::from_secs(300),
            ..Default::default()
        };
        assert_eq!(section.effective_timeout(), Duration::from_secs(299));
    }

    #[test]
    fn rejects_zero_ping_interval() {
        let mut config = AppConfig::default();
        config.ping.interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_ping_count() {
        let mut config = AppConfig::default();
        config.ping.count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_timeout_not_below_interval() {
        let mut config = AppConfig::default();
        config.speedtest.interval = Duration::from_secs(60);
        config.speedtest.timeout = Some(Duration::from_secs(60));

        let result = config.validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("strictly below the interval")
        );
    }

    #[test]
    fn rejects_interval_too_short_for_default_timeout() {
        let mut config = AppConfig::default();
        config.speedtest.interval = Duration::from_secs(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_invalid_bind_address() {
        let mut config = AppConfig::default();
        config.server.bind = "not-an-ip".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("invalid server bind address")
        );
    }

    #[test]
    fn rejects_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_host() {
        let mut config = AppConfig::default();
        config.ping.hosts = vec!["".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let result = AppConfig::load("/nonexistent/connmon.yaml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
