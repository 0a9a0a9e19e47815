//! Probe scheduler.
//!
//! Runs each probe in its own tokio task, either once after an initial
//! delay or repeatedly on a fixed interval. Cancellation is observed at
//! tick boundaries only; an execution already in flight runs to completion.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::probe::Probe;

/// Errors raised while constructing a schedule.
///
/// These are configuration-time errors only; once a task is scheduled its
/// loop never fails.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Interval must be strictly positive.
    #[error("interval must be greater than zero")]
    ZeroInterval,
}

/// Immutable schedule for one probe.
///
/// `initial_delay` shifts the first execution; `interval` of `None` means
/// the probe runs exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSpec {
    initial_delay: Duration,
    interval: Option<Duration>,
}

impl ScheduleSpec {
    /// Create a schedule with an explicit delay and optional interval.
    ///
    /// # Errors
    /// Returns [`ScheduleError::ZeroInterval`] if `interval` is `Some(0)`.
    pub fn new(initial_delay: Duration, interval: Option<Duration>) -> Result<Self, ScheduleError> {
        if let Some(interval) = interval
            && interval.is_zero()
        {
            return Err(ScheduleError::ZeroInterval);
        }
        Ok(Self {
            initial_delay,
            interval,
        })
    }

    /// Run-once schedule with no delay.
    pub fn once() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            interval: None,
        }
    }

    /// Periodic schedule with no initial delay.
    ///
    /// # Errors
    /// Returns [`ScheduleError::ZeroInterval`] if `interval` is zero.
    pub fn every(interval: Duration) -> Result<Self, ScheduleError> {
        Self::new(Duration::ZERO, Some(interval))
    }

    /// Shift the first execution by `delay`.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Delay before the first execution.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Interval between executions, if periodic.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }
}

impl std::fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.interval {
            Some(interval) => write!(
                f,
                "every {} (delay {})",
                humantime::format_duration(interval),
                humantime::format_duration(self.initial_delay)
            ),
            None => write!(
                f,
                "once (delay {})",
                humantime::format_duration(self.initial_delay)
            ),
        }
    }
}

/// Schedules probes onto independent tokio tasks and owns their shutdown.
///
/// All scheduled loops share one cancellation token. Cancelling stops
/// future ticks only; [`Scheduler::shutdown`] additionally waits (bounded)
/// for in-flight executions to finish.
pub struct Scheduler {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Number of scheduled tasks.
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Token shared by all scheduled loops; cancelling it stops future ticks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn a probe on its own task according to `spec`.
    ///
    /// The loop never returns an error: probes fold every failure into
    /// their metrics by contract.
    pub fn schedule(&mut self, probe: Arc<dyn Probe>, spec: ScheduleSpec) {
        let cancel = self.cancel.child_token();
        tracing::info!(probe = %probe.name(), schedule = %spec, "Scheduling probe");

        let handle = tokio::spawn(run_schedule(probe, spec, cancel));
        self.handles.push(handle);
    }

    /// Signal cancellation without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel all loops and wait up to `grace` for them to finish.
    ///
    /// In-flight probe executions are not interrupted; a probe that hangs
    /// past the grace period is abandoned rather than blocking exit.
    pub async fn shutdown(self, grace: Duration) {
        self.cancel.cancel();

        let join_all = async {
            for handle in self.handles {
                if let Err(e) = handle.await
                    && !e.is_cancelled()
                {
                    tracing::error!(error = %e, "Scheduled task panicked");
                }
            }
        };

        if tokio::time::timeout(grace, join_all).await.is_err() {
            tracing::warn!(
                grace = ?grace,
                "Shutdown grace period elapsed with probes still in flight"
            );
        } else {
            tracing::info!("All scheduled probes stopped");
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("task_count", &self.handles.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// The per-probe scheduling loop.
///
/// Periodic ticks are anchored to the previous *scheduled* time, not the
/// previous completion: an execution that overruns its interval makes the
/// next tick fire immediately instead of compounding drift. Executions of
/// one probe never overlap because the loop awaits the probe body.
async fn run_schedule(probe: Arc<dyn Probe>, spec: ScheduleSpec, cancel: CancellationToken) {
    if !spec.initial_delay().is_zero() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(probe = %probe.name(), "Cancelled during initial delay");
                return;
            }
            _ = tokio::time::sleep(spec.initial_delay()) => {}
        }
    }

    let Some(interval) = spec.interval() else {
        run_probe(&probe).await;
        return;
    };

    let mut next_tick = Instant::now();
    loop {
        // Biased so a cancel that raced the timer always wins the tick.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(probe = %probe.name(), "Schedule cancelled");
                return;
            }
            _ = tokio::time::sleep_until(next_tick) => {}
        }

        next_tick = Instant::now() + interval;

        tracing::debug!(probe = %probe.name(), "Tick");
        run_probe(&probe).await;
    }
}

/// Execute one probe tick on its own task so that a panicking probe is
/// logged and the schedule keeps running.
async fn run_probe(probe: &Arc<dyn Probe>) {
    let task = Arc::clone(probe);
    if let Err(e) = tokio::spawn(async move { task.run().await }).await {
        tracing::error!(probe = %probe.name(), error = %e, "Probe execution panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe stub that counts executions, optionally taking a fixed time.
    struct CountingProbe {
        name: String,
        runs: AtomicUsize,
        busy: Duration,
    }

    impl CountingProbe {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                runs: AtomicUsize::new(0),
                busy: Duration::ZERO,
            }
        }

        fn slow(name: &str, busy: Duration) -> Self {
            Self {
                busy,
                ..Self::new(name)
            }
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Probe for CountingProbe {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self) {
            if !self.busy.is_zero() {
                tokio::time::sleep(self.busy).await;
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn spec_rejects_zero_interval() {
        let result = ScheduleSpec::new(Duration::ZERO, Some(Duration::ZERO));
        assert!(matches!(result, Err(ScheduleError::ZeroInterval)));
    }

    #[test]
    fn spec_once_has_no_interval() {
        let spec = ScheduleSpec::once().with_initial_delay(Duration::from_secs(3));
        assert_eq!(spec.interval(), None);
        assert_eq!(spec.initial_delay(), Duration::from_secs(3));
    }

    #[test]
    fn spec_display() {
        let spec = ScheduleSpec::every(Duration::from_secs(30)).unwrap();
        assert_eq!(spec.to_string(), "every 30s (delay 0s)");
    }

    #[tokio::test(start_paused = true)]
    async fn run_once_after_delay() {
        let probe = Arc::new(CountingProbe::new("once"));
        let spec = ScheduleSpec::once().with_initial_delay(Duration::from_secs(5));

        let mut scheduler = Scheduler::new();
        scheduler.schedule(probe.clone(), spec);

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(probe.runs(), 0, "must not run before the delay");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(probe.runs(), 1);

        // Run-once never repeats.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(probe.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_runs_at_interval() {
        let probe = Arc::new(CountingProbe::new("periodic"));
        let spec = ScheduleSpec::every(Duration::from_secs(10)).unwrap();

        let mut scheduler = Scheduler::new();
        scheduler.schedule(probe.clone(), spec);

        // First tick fires immediately, then every 10s.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(probe.runs(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(probe.runs(), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(probe.runs(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_future_ticks() {
        let probe = Arc::new(CountingProbe::new("cancelled"));
        let spec = ScheduleSpec::every(Duration::from_secs(10)).unwrap();

        let mut scheduler = Scheduler::new();
        scheduler.schedule(probe.clone(), spec);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(probe.runs(), 2);

        scheduler.shutdown(Duration::from_secs(5)).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(probe.runs(), 2, "no new executions after cancellation");
    }

    #[tokio::test(start_paused = true)]
    async fn overrun_does_not_overlap() {
        // Probe takes 25s, interval is 10s: executions must stay strictly
        // sequential, so after 50s only two runs can have completed.
        let probe = Arc::new(CountingProbe::slow("slow", Duration::from_secs(25)));
        let spec = ScheduleSpec::every(Duration::from_secs(10)).unwrap();

        let mut scheduler = Scheduler::new();
        scheduler.schedule(probe.clone(), spec);

        tokio::time::sleep(Duration::from_secs(51)).await;
        assert_eq!(probe.runs(), 2);
        scheduler.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn probes_do_not_block_each_other() {
        // A slow probe must not delay an independent fast one.
        let slow = Arc::new(CountingProbe::slow("slow", Duration::from_secs(60)));
        let fast = Arc::new(CountingProbe::new("fast"));

        let mut scheduler = Scheduler::new();
        scheduler.schedule(slow.clone(), ScheduleSpec::every(Duration::from_secs(120)).unwrap());
        scheduler.schedule(fast.clone(), ScheduleSpec::every(Duration::from_secs(10)).unwrap());

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(slow.runs(), 0, "slow probe still in its first execution");
        assert_eq!(fast.runs(), 4);
        scheduler.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_probe_does_not_stop_schedule() {
        struct PanickingProbe {
            runs: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl Probe for PanickingProbe {
            fn name(&self) -> &str {
                "panicking"
            }

            async fn run(&self) {
                if self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("probe contract violation");
                }
            }
        }

        let probe = Arc::new(PanickingProbe {
            runs: AtomicUsize::new(0),
        });
        let spec = ScheduleSpec::every(Duration::from_secs(10)).unwrap();

        let mut scheduler = Scheduler::new();
        scheduler.schedule(probe.clone(), spec);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(
            probe.runs.load(Ordering::SeqCst),
            3,
            "schedule must survive the panicking first tick"
        );
        scheduler.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_initial_delay_suppresses_first_run() {
        let probe = Arc::new(CountingProbe::new("delayed"));
        let spec = ScheduleSpec::every(Duration::from_secs(10))
            .unwrap()
            .with_initial_delay(Duration::from_secs(30));

        let mut scheduler = Scheduler::new();
        scheduler.schedule(probe.clone(), spec);

        tokio::time::sleep(Duration::from_secs(5)).await;
        scheduler.shutdown(Duration::from_secs(1)).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(probe.runs(), 0);
    }
}
