//! Probe layer.
//!
//! One probe is one external-command measurement unit for a single host.
//! Each probe spawns its command, parses the captured output into typed
//! fields, and folds the outcome (or a failure sentinel) into its metric
//! family. No failure ever escapes a probe into the scheduler.
//!
//! - [`Probe`]: trait the scheduler drives
//! - [`ProbeOutcome`]: tagged result of one execution
//! - [`ping::PingProbe`]: reachability via the `ping` utility
//! - [`speedtest::SpeedtestProbe`]: throughput via a speedtest binary

pub mod ping;
pub mod speedtest;

use std::process::Output;
use std::time::Duration;

use tokio::process::Command;

/// Outcome of one probe execution.
///
/// Exactly one variant applies. `Success` carries only valid measurements;
/// the NaN/zero sentinels for the failure variants are produced at the
/// metrics boundary, never inside the probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome<T> {
    /// Command succeeded and its output parsed cleanly.
    Success(T),
    /// Command could not be spawned or exited non-zero (host down,
    /// speedtest failed, timeout kill).
    NotReachable,
    /// Command exited zero but its output did not match the expected
    /// grammar. Prior gauge values are left untouched.
    ParseFailed,
}

/// A schedulable measurement unit.
///
/// # Error Handling Contract
///
/// `run()` is infallible: probe-level failures (unreachable host, non-zero
/// exit, malformed output) are valid observations and are recorded as
/// counters/sentinel gauges inside the probe. The scheduler relies on this
/// to keep a bad tick from terminating the schedule.
#[async_trait::async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Identifier for logs (probe kind plus host).
    fn name(&self) -> &str;

    /// Execute one probe cycle and fold the outcome into the metrics.
    async fn run(&self);
}

/// Sanitize a host identifier for use as a metric label value.
///
/// Replaces `.`, `:` and `-` with `_` (speedtest hosts may carry a port
/// suffix). Idempotent: sanitizing an already-sanitized label is a no-op.
pub fn sanitize_host(host: &str) -> String {
    host.replace(['.', ':', '-'], "_")
}

/// Spawn `program` with `args`, capturing stdout, and wait for exit.
///
/// The wait is unbounded; callers that need a bound wrap this in
/// [`tokio::time::timeout`] (the child is killed on drop).
pub(crate) async fn run_command(program: &str, args: &[&str]) -> std::io::Result<Output> {
    Command::new(program)
        .args(args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
}

/// Bounded variant of [`run_command`]; `None` means the timeout elapsed
/// and the child was killed.
pub(crate) async fn run_command_with_timeout(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Option<std::io::Result<Output>> {
    tokio::time::timeout(timeout, run_command(program, args))
        .await
        .ok()
}
