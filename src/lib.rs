//! Connmon - Connectivity Monitor
//!
//! This crate provides the core functionality for the connmon monitoring
//! daemon. It can be used as a library by other Rust projects, or run as a
//! standalone binary with the `connmon` executable.
//!
//! # Architecture
//!
//! - **Probes**: external-command measurement units (ping reachability,
//!   speedtest throughput), one per configured host
//! - **Scheduler**: jittered, cancellable interval loops, one tokio task
//!   per probe
//! - **Metrics**: per-probe-kind Prometheus metric families labeled by host
//! - **Server**: HTTP exposition endpoint (`/metrics`, `/healthz`)
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use connmon::{PingMetrics, PingProbe, ScheduleSpec, Scheduler};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = prometheus::Registry::new();
//! let metrics = Arc::new(PingMetrics::register(&registry)?);
//! let probe = PingProbe::new("8.8.8.8", metrics);
//!
//! let mut scheduler = Scheduler::new();
//! let spec = ScheduleSpec::every(std::time::Duration::from_secs(30))?;
//! scheduler.schedule(Arc::new(probe), spec);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod metrics;
pub mod probe;
pub mod scheduler;
pub mod server;

pub use config::{AppConfig, ConfigError, PingSection, ServerConfig, SpeedtestSection};
pub use metrics::{MetricsError, PingMetrics, SpeedtestMetrics};
pub use probe::ping::{PingProbe, PingStatistics};
pub use probe::speedtest::{SpeedtestMeasurement, SpeedtestProbe};
pub use probe::{Probe, ProbeOutcome, sanitize_host};
pub use scheduler::{ScheduleError, ScheduleSpec, Scheduler};
