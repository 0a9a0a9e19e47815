//! Reachability probe.
//!
//! Spawns the system `ping` utility with a fixed probe count against one
//! host and parses its two English summary lines into [`PingStatistics`].

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::metrics::PingMetrics;
use crate::probe::{Probe, ProbeOutcome, run_command, sanitize_host};

/// Default number of echo requests per execution.
const DEFAULT_COUNT: u32 = 5;

/// Parsed ping summary. All timings are in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct PingStatistics {
    pub transmitted: u64,
    pub received: u64,
    /// Packet loss as a ratio in `[0, 1]`.
    pub loss_ratio: f64,
    /// Total runtime reported by ping.
    pub time_seconds: f64,
    pub rtt_min_seconds: f64,
    pub rtt_avg_seconds: f64,
    pub rtt_max_seconds: f64,
    pub rtt_mdev_seconds: f64,
}

/// Reachability probe for a single host.
pub struct PingProbe {
    host: String,
    label: String,
    name: String,
    count: u32,
    program: String,
    metrics: Arc<PingMetrics>,
}

impl PingProbe {
    /// Create a probe for `host`, registering its metric children.
    pub fn new(host: impl Into<String>, metrics: Arc<PingMetrics>) -> Self {
        let host = host.into();
        let label = sanitize_host(&host);
        metrics.register_host(&label);

        Self {
            name: format!("ping/{host}"),
            host,
            label,
            count: DEFAULT_COUNT,
            program: "ping".to_string(),
            metrics,
        }
    }

    /// Set the number of echo requests per execution (default: 5).
    #[must_use]
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count.max(1);
        self
    }

    /// Override the ping executable (e.g. a busybox path).
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Execute one ping run and classify the result.
    ///
    /// Spawn failures and non-zero exits are `NotReachable`; exit zero with
    /// output matching neither summary grammar (including empty output) is
    /// `ParseFailed`.
    pub async fn execute(&self) -> ProbeOutcome<PingStatistics> {
        let count = self.count.to_string();
        let output = match run_command(&self.program, &["-c", &count, &self.host]).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "Failed to spawn ping");
                return ProbeOutcome::NotReachable;
            }
        };

        if !output.status.success() {
            tracing::debug!(
                host = %self.host,
                exit = ?output.status.code(),
                "Ping exited non-zero"
            );
            return ProbeOutcome::NotReachable;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_transcript(&stdout) {
            Some(statistics) => {
                tracing::debug!(host = %self.host, ?statistics, "Ping statistics");
                ProbeOutcome::Success(statistics)
            }
            None => {
                tracing::debug!(host = %self.host, output = %stdout, "Unparseable ping output");
                ProbeOutcome::ParseFailed
            }
        }
    }
}

impl std::fmt::Debug for PingProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingProbe")
            .field("host", &self.host)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Probe for PingProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) {
        match self.execute().await {
            ProbeOutcome::Success(statistics) => {
                self.metrics.record_statistics(&self.label, &statistics);
            }
            ProbeOutcome::NotReachable => {
                self.metrics.record_not_reachable(&self.label);
            }
            ProbeOutcome::ParseFailed => {
                self.metrics.record_parse_failed(&self.label);
            }
        }
    }
}

fn packet_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(\d+) packets transmitted, (\d+) received, ([0-9.]+)% packet loss, time (\d+)ms",
        )
        .expect("failed to compile packet statistics regex")
    })
}

fn rtt_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"rtt min/avg/max/mdev = ([0-9.]+)/([0-9.]+)/([0-9.]+)/([0-9.]+) ms")
            .expect("failed to compile rtt statistics regex")
    })
}

/// Parse a full ping transcript; both summary lines must match.
fn parse_transcript(output: &str) -> Option<PingStatistics> {
    let packets = packet_line().captures(output)?;
    let rtt = rtt_line().captures(output)?;

    Some(PingStatistics {
        transmitted: packets[1].parse().ok()?,
        received: packets[2].parse().ok()?,
        loss_ratio: packets[3].parse::<f64>().ok()? / 100.0,
        time_seconds: packets[4].parse::<f64>().ok()? / 1000.0,
        rtt_min_seconds: rtt[1].parse::<f64>().ok()? / 1000.0,
        rtt_avg_seconds: rtt[2].parse::<f64>().ok()? / 1000.0,
        rtt_max_seconds: rtt[3].parse::<f64>().ok()? / 1000.0,
        rtt_mdev_seconds: rtt[4].parse::<f64>().ok()? / 1000.0,
    })
}
