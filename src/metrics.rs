//! Metric families.
//!
//! One family struct per probe kind, all registered against a shared
//! [`prometheus::Registry`] and indexed by a `host` label. Counters are
//! monotonic for the process lifetime; gauges hold the last observed value
//! only. The recording methods here are the single mutation path for probe
//! observations, and they are where the NaN/zero failure sentinels are
//! materialized.

mod ping;
mod speedtest;

pub use ping::PingMetrics;
pub use speedtest::SpeedtestMetrics;

use thiserror::Error;

/// Metric namespace shared by all families.
pub(crate) const NAMESPACE: &str = "connectivity_monitor";

/// Errors raised while registering metric families.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Underlying prometheus registration failure (e.g. duplicate names).
    #[error("metric registration failed: {0}")]
    Registration(#[from] prometheus::Error),
}
