//! Throughput (speedtest) metric family.

use prometheus::{GaugeVec, IntCounterVec, Opts, Registry};

use super::{MetricsError, NAMESPACE};
use crate::probe::speedtest::SpeedtestMeasurement;

const SUBSYSTEM: &str = "speedtest";

/// Host-labeled counters and gauges for the throughput probe.
#[derive(Clone)]
pub struct SpeedtestMetrics {
    failed: IntCounterVec,
    json_failed: IntCounterVec,
    ping: GaugeVec,
    jitter: GaugeVec,
    download: GaugeVec,
    upload: GaugeVec,
}

impl SpeedtestMetrics {
    /// Create the family and register it with `registry`.
    ///
    /// # Errors
    /// Returns [`MetricsError`] if any metric name is already registered.
    pub fn register(registry: &Registry) -> Result<Self, MetricsError> {
        let opts = |name: &str, help: &str| {
            Opts::new(name, help)
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM)
        };

        let failed = IntCounterVec::new(
            opts("failed_total", "Total of times the speedtest failed"),
            &["host"],
        )?;
        let json_failed = IntCounterVec::new(
            opts(
                "json_failed_total",
                "Total of JSON parse errors when speedtesting the host",
            ),
            &["host"],
        )?;
        let ping = GaugeVec::new(opts("ping_seconds", "Ping of the host"), &["host"])?;
        let jitter = GaugeVec::new(opts("jitter_seconds", "Ping jitter of the host"), &["host"])?;
        let download = GaugeVec::new(
            opts("download_bits_per_second", "Download speed of the host"),
            &["host"],
        )?;
        let upload = GaugeVec::new(
            opts("upload_bits_per_second", "Upload speed of the host"),
            &["host"],
        )?;

        registry.register(Box::new(failed.clone()))?;
        registry.register(Box::new(json_failed.clone()))?;
        registry.register(Box::new(ping.clone()))?;
        registry.register(Box::new(jitter.clone()))?;
        registry.register(Box::new(download.clone()))?;
        registry.register(Box::new(upload.clone()))?;

        Ok(Self {
            failed,
            json_failed,
            ping,
            jitter,
            download,
            upload,
        })
    }

    /// Idempotently materialize every child metric for `host`.
    pub fn register_host(&self, host: &str) {
        self.failed.with_label_values(&[host]);
        self.json_failed.with_label_values(&[host]);
        self.ping.with_label_values(&[host]);
        self.jitter.with_label_values(&[host]);
        self.download.with_label_values(&[host]);
        self.upload.with_label_values(&[host]);
    }

    /// Overwrite all gauges for `host` with a fresh measurement.
    pub fn record_measurement(&self, host: &str, measurement: &SpeedtestMeasurement) {
        self.ping
            .with_label_values(&[host])
            .set(measurement.ping_seconds);
        self.jitter
            .with_label_values(&[host])
            .set(measurement.jitter_seconds);
        self.download
            .with_label_values(&[host])
            .set(measurement.download_bps);
        self.upload
            .with_label_values(&[host])
            .set(measurement.upload_bps);
    }

    /// Record a failed run (non-zero exit, spawn failure or timeout kill):
    /// count it and write the failure sentinels (NaN latencies, zero rates).
    pub fn record_failed(&self, host: &str) {
        self.failed.with_label_values(&[host]).inc();
        self.ping.with_label_values(&[host]).set(f64::NAN);
        self.jitter.with_label_values(&[host]).set(f64::NAN);
        self.download.with_label_values(&[host]).set(0.0);
        self.upload.with_label_values(&[host]).set(0.0);
    }

    /// Record undecodable speedtest output. Gauges keep their previous
    /// values (last-known-good).
    pub fn record_json_failed(&self, host: &str) {
        self.json_failed.with_label_values(&[host]).inc();
    }

    #[cfg(test)]
    pub(crate) fn failed_count(&self, host: &str) -> u64 {
        self.failed.with_label_values(&[host]).get()
    }

    #[cfg(test)]
    pub(crate) fn json_failed_count(&self, host: &str) -> u64 {
        self.json_failed.with_label_values(&[host]).get()
    }

    #[cfg(test)]
    pub(crate) fn download_gauge(&self, host: &str) -> f64 {
        self.download.with_label_values(&[host]).get()
    }
}

impl std::fmt::Debug for SpeedtestMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeedtestMetrics").finish_non_exhaustive()
    }
}
