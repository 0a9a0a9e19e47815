//! Configuration module for the connmon daemon.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (bind address, port)
//! - Ping probe settings (hosts, interval, count, start jitter)
//! - Speedtest probe settings (hosts, interval, timeout, start jitter)

mod app;
mod validation;

pub use app::{AppConfig, PingSection, ServerConfig, SpeedtestSection};
pub use validation::ConfigError;

pub use app::{DEFAULT_PING_INTERVAL, DEFAULT_SPEEDTEST_INTERVAL};
