//! Throughput probe.
//!
//! Spawns a speedtest binary against a named test server, bounded by an
//! explicit timeout, and decodes its JSON output into a
//! [`SpeedtestMeasurement`].

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::metrics::SpeedtestMetrics;
use crate::probe::{Probe, ProbeOutcome, run_command_with_timeout, sanitize_host};

/// Default execution timeout. Must stay below the scheduling interval; the
/// config layer enforces that relation.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Parsed speedtest result. Latencies in seconds, rates in bits/second.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedtestMeasurement {
    pub ping_seconds: f64,
    pub jitter_seconds: f64,
    pub download_bps: f64,
    pub upload_bps: f64,
}

/// Raw JSON shape emitted by the speedtest binary. Latencies are
/// integer-valued milliseconds, rates are already bits/second.
#[derive(Debug, Deserialize)]
struct SpeedtestPayload {
    ping: u64,
    jitter: u64,
    download: f64,
    upload: f64,
}

/// Throughput probe for a single test server.
pub struct SpeedtestProbe {
    host: String,
    label: String,
    name: String,
    timeout: Duration,
    program: String,
    metrics: Arc<SpeedtestMetrics>,
}

impl SpeedtestProbe {
    /// Create a probe for `host` (which may carry a `:port` suffix),
    /// registering its metric children.
    pub fn new(host: impl Into<String>, metrics: Arc<SpeedtestMetrics>) -> Self {
        let host = host.into();
        let label = sanitize_host(&host);
        metrics.register_host(&label);

        Self {
            name: format!("speedtest/{host}"),
            host,
            label,
            timeout: DEFAULT_TIMEOUT,
            program: "SpeedTest".to_string(),
            metrics,
        }
    }

    /// Set the execution timeout (default: 120s). The child is killed when
    /// it elapses, which counts as a failed run.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the speedtest executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Execute one speedtest run and classify the result.
    ///
    /// Spawn failures, timeout kills and non-zero exits are `NotReachable`
    /// (the "speedtest failed" outcome); exit zero with undecodable JSON is
    /// `ParseFailed`.
    pub async fn execute(&self) -> ProbeOutcome<SpeedtestMeasurement> {
        let args = ["--test-server", &self.host, "--output", "json"];
        let output =
            match run_command_with_timeout(&self.program, &args, self.timeout).await {
                None => {
                    tracing::warn!(
                        host = %self.host,
                        timeout = ?self.timeout,
                        "Speedtest timed out, child killed"
                    );
                    return ProbeOutcome::NotReachable;
                }
                Some(Err(e)) => {
                    tracing::warn!(host = %self.host, error = %e, "Failed to spawn speedtest");
                    return ProbeOutcome::NotReachable;
                }
                Some(Ok(output)) => output,
            };

        if !output.status.success() {
            tracing::debug!(
                host = %self.host,
                exit = ?output.status.code(),
                "Speedtest exited non-zero"
            );
            return ProbeOutcome::NotReachable;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_output(&stdout) {
            Some(measurement) => {
                tracing::debug!(host = %self.host, ?measurement, "Speedtest measurement");
                ProbeOutcome::Success(measurement)
            }
            None => {
                tracing::debug!(host = %self.host, output = %stdout, "Undecodable speedtest output");
                ProbeOutcome::ParseFailed
            }
        }
    }
}

impl std::fmt::Debug for SpeedtestProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeedtestProbe")
            .field("host", &self.host)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Probe for SpeedtestProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) {
        match self.execute().await {
            ProbeOutcome::Success(measurement) => {
                self.metrics.record_measurement(&self.label, &measurement);
            }
            ProbeOutcome::NotReachable => {
                self.metrics.record_failed(&self.label);
            }
            ProbeOutcome::ParseFailed => {
                self.metrics.record_json_failed(&self.label);
            }
        }
    }
}

/// Decode speedtest JSON, converting millisecond latencies to seconds.
fn parse_output(output: &str) -> Option<SpeedtestMeasurement> {
    let payload: SpeedtestPayload = serde_json::from_str(output).ok()?;
    Some(SpeedtestMeasurement {
        ping_seconds: payload.ping as f64 / 1000.0,
        jitter_seconds: payload.jitter as f64 / 1000.0,
        download_bps: payload.download,
        upload_bps: payload.upload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    const HOST: &str = "d-speed.bi-host.net:8080";
    const LABEL: &str = "d_speed_bi_host_net_8080";

    fn metrics() -> Arc<SpeedtestMetrics> {
        Arc::new(SpeedtestMetrics::register(&Registry::new()).unwrap())
    }

    #[test]
    fn parse_well_formed_json() {
        let output = r#"{"ping": 23, "jitter": 4, "download": 93500000.0, "upload": 38200000.5}"#;
        let measurement = parse_output(output).unwrap();
        assert_eq!(measurement.ping_seconds, 0.023);
        assert_eq!(measurement.jitter_seconds, 0.004);
        assert_eq!(measurement.download_bps, 93_500_000.0);
        assert_eq!(measurement.upload_bps, 38_200_000.5);
    }

    #[test]
    fn parse_ignores_extra_keys() {
        let output = r#"{"ping": 10, "jitter": 2, "download": 1.0, "upload": 2.0, "server": "x"}"#;
        assert!(parse_output(output).is_some());
    }

    #[test]
    fn parse_rejects_truncated_json() {
        assert!(parse_output(r#"{"ping": 23, "jitter": 4, "down"#).is_none());
    }

    #[test]
    fn parse_rejects_missing_keys() {
        assert!(parse_output(r#"{"ping": 23, "jitter": 4}"#).is_none());
    }

    #[test]
    fn parse_rejects_empty_output() {
        assert!(parse_output("").is_none());
    }

    #[tokio::test]
    async fn non_zero_exit_counts_failed_only() {
        let metrics = metrics();
        let probe = SpeedtestProbe::new(HOST, metrics.clone()).with_program("false");

        probe.run().await;

        assert_eq!(metrics.failed_count(LABEL), 1);
        assert_eq!(metrics.json_failed_count(LABEL), 0);
        assert_eq!(metrics.download_gauge(LABEL), 0.0);
    }

    #[tokio::test]
    async fn invalid_json_counts_json_failed_and_keeps_gauges() {
        let metrics = metrics();
        metrics.record_measurement(
            LABEL,
            &SpeedtestMeasurement {
                ping_seconds: 0.02,
                jitter_seconds: 0.003,
                download_bps: 50_000_000.0,
                upload_bps: 20_000_000.0,
            },
        );

        // `echo` exits zero and prints its (non-JSON) arguments.
        let probe = SpeedtestProbe::new(HOST, metrics.clone()).with_program("echo");
        probe.run().await;

        assert_eq!(metrics.json_failed_count(LABEL), 1);
        assert_eq!(metrics.failed_count(LABEL), 0);
        // Prior gauge values survive the parse failure.
        assert_eq!(metrics.download_gauge(LABEL), 50_000_000.0);
    }

    #[tokio::test]
    async fn spawn_failure_counts_failed() {
        let metrics = metrics();
        let probe =
            SpeedtestProbe::new(HOST, metrics.clone()).with_program("connmon-missing-speedtest");

        probe.run().await;

        assert_eq!(metrics.failed_count(LABEL), 1);
    }
}
