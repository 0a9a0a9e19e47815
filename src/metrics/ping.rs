//! Reachability (ping) metric family.

use prometheus::{GaugeVec, IntCounterVec, Opts, Registry};

use super::{MetricsError, NAMESPACE};
use crate::probe::ping::PingStatistics;

const SUBSYSTEM: &str = "ping";

/// RTT statistic label values, in gauge order.
const RTT_STATISTICS: [&str; 4] = ["min", "avg", "max", "mdev"];

/// Host-labeled counters and gauges for the reachability probe.
///
/// All vectors share the `host` label; `rtt_seconds` additionally carries a
/// `statistic` label (min/avg/max/mdev). Cloning is cheap, the underlying
/// vectors are shared.
#[derive(Clone)]
pub struct PingMetrics {
    not_reachable: IntCounterVec,
    parse_failed: IntCounterVec,
    transmitted: GaugeVec,
    received: GaugeVec,
    loss: GaugeVec,
    time: GaugeVec,
    rtt: GaugeVec,
}

impl PingMetrics {
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

        let not_reachable = IntCounterVec::new(
            opts(
                "not_reachable_total",
                "Total of times the host was not reachable",
            ),
            &["host"],
        )?;
        let parse_failed = IntCounterVec::new(
            opts(
                "parse_failed_total",
                "Total of parse errors when pinging the host",
            ),
            &["host"],
        )?;
        let transmitted = GaugeVec::new(
            opts("packets_transmitted", "Packets transmitted to the host"),
            &["host"],
        )?;
        let received = GaugeVec::new(
            opts("packets_received", "Packets received from the host"),
            &["host"],
        )?;
        let loss = GaugeVec::new(
            opts("packet_loss_ratio", "Packet loss ratio of the host"),
            &["host"],
        )?;
        let time = GaugeVec::new(
            opts("time_seconds", "Runtime of the ping command in seconds"),
            &["host"],
        )?;
        let rtt = GaugeVec::new(
            opts("rtt_seconds", "Roundtrip time of the host in seconds"),
            &["host", "statistic"],
        )?;

        registry.register(Box::new(not_reachable.clone()))?;
        registry.register(Box::new(parse_failed.clone()))?;
        registry.register(Box::new(transmitted.clone()))?;
        registry.register(Box::new(received.clone()))?;
        registry.register(Box::new(loss.clone()))?;
        registry.register(Box::new(time.clone()))?;
        registry.register(Box::new(rtt.clone()))?;

        Ok(Self {
            not_reachable,
            parse_failed,
            transmitted,
            received,
            loss,
            time,
            rtt,
        })
    }

    /// Idempotently materialize every child metric for `host`, so the
    /// exposition endpoint shows the full set (counters at zero) before the
    /// first observation.
    pub fn register_host(&self, host: &str) {
        self.not_reachable.with_label_values(&[host]);
        self.parse_failed.with_label_values(&[host]);
        self.transmitted.with_label_values(&[host]);
        self.received.with_label_values(&[host]);
        self.loss.with_label_values(&[host]);
        self.time.with_label_values(&[host]);
        for statistic in RTT_STATISTICS {
            self.rtt.with_label_values(&[host, statistic]);
        }
    }

    /// Overwrite all gauges for `host` with a fresh successful observation.
    pub fn record_statistics(&self, host: &str, stats: &PingStatistics) {
        self.transmitted
            .with_label_values(&[host])
            .set(stats.transmitted as f64);
        self.received
            .with_label_values(&[host])
            .set(stats.received as f64);
        self.loss.with_label_values(&[host]).set(stats.loss_ratio);
        self.time.with_label_values(&[host]).set(stats.time_seconds);
        self.rtt
            .with_label_values(&[host, "min"])
            .set(stats.rtt_min_seconds);
        self.rtt
            .with_label_values(&[host, "avg"])
            .set(stats.rtt_avg_seconds);
        self.rtt
            .with_label_values(&[host, "max"])
            .set(stats.rtt_max_seconds);
        self.rtt
            .with_label_values(&[host, "mdev"])
            .set(stats.rtt_mdev_seconds);
    }

    /// Record an unreachable host: count it and write the failure
    /// sentinels (total loss, zero packets, NaN timings).
    pub fn record_not_reachable(&self, host: &str) {
        self.not_reachable.with_label_values(&[host]).inc();
        self.transmitted.with_label_values(&[host]).set(0.0);
        self.received.with_label_values(&[host]).set(0.0);
        self.loss.with_label_values(&[host]).set(1.0);
        self.time.with_label_values(&[host]).set(f64::NAN);
        for statistic in RTT_STATISTICS {
            self.rtt.with_label_values(&[host, statistic]).set(f64::NAN);
        }
    }

    /// Record an unparseable ping transcript. Gauges keep their previous
    /// values (last-known-good).
    pub fn record_parse_failed(&self, host: &str) {
        self.parse_failed.with_label_values(&[host]).inc();
    }

    #[cfg(test)]
    pub(crate) fn loss_gauge(&self, host: &str) -> f64 {
        self.loss.with_label_values(&[host]).get()
    }

    #[cfg(test)]
    pub(crate) fn not_reachable_count(&self, host: &str) -> u64 {
        self.not_reachable.with_label_values(&[host]).get()
    }

    #[cfg(test)]
    pub(crate) fn parse_failed_count(&self, host: &str) -> u64 {
        self.parse_failed.with_label_values(&[host]).get()
    }
}

impl std::fmt::Debug for PingMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingMetrics").finish_non_exhaustive()
    }
}
