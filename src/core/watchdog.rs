//! Background enforcement of per-job timeouts.
//!
//! The watchdog only flips registry state. A generator call that is already
//! in flight keeps running; the job's token stops further attempts once it
//! returns.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken as ShutdownSignal;
use tracing::{debug, error, info, warn};

use crate::core::registry::JobRegistry;

/// Default delay between two watchdog scans.
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(10);

/// Default age after which job entries are evicted.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// Scans the registry for jobs that outlived their timeout.
#[derive(Debug, Clone)]
pub struct TimeoutWatchdog {
    registry: Arc<JobRegistry>,
    interval: Duration,
    retention: Option<Duration>,
}

/// Outcome of a single scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Jobs moved to `Failed` because they timed out.
    pub timed_out: usize,
    /// Entries evicted by the retention sweep.
    pub evicted: usize,
}

impl TimeoutWatchdog {
    /// Creates a watchdog polling every `interval`, without retention sweeps.
    #[must_use]
    pub fn new(registry: Arc<JobRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            retention: None,
        }
    }

    /// Also evicts entries older than `retention` on every tick.
    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Returns the polling interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one scan.
    ///
    /// Each expired job is cancelled and then failed; jobs that reached a
    /// terminal status between the snapshot and the transition are skipped.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        for job_id in self.registry.expired() {
            if self.registry.time_out(job_id) {
                report.timed_out += 1;
            }
        }
        if let Some(retention) = self.retention {
            report.evicted = self.registry.sweep(retention);
        }
        report
    }

    /// Spawns the watchdog loop on the current tokio runtime.
    ///
    /// The loop runs until [`WatchdogHandle::shutdown`] is called. A panic
    /// inside one tick is logged and the loop keeps going.
    #[must_use]
    pub fn spawn(self) -> WatchdogHandle {
        let interval = self.interval;
        spawn_loop(interval, move || self.tick())
    }
}

/// Runs `tick` every `interval` until shut down, logging and surviving a
/// panicking tick.
fn spawn_loop<F>(interval: Duration, mut tick: F) -> WatchdogHandle
where
    F: FnMut() -> TickReport + Send + 'static,
{
    let shutdown = ShutdownSignal::new();
    let signal = shutdown.clone();
    let task = tokio::spawn(async move {
        info!(?interval, "timeout watchdog started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so jobs get a full
        // interval before the first scan.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = signal.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match catch_unwind(AssertUnwindSafe(&mut tick)) {
                Ok(report) if report != TickReport::default() => {
                    debug!(
                        timed_out = report.timed_out,
                        evicted = report.evicted,
                        "watchdog tick"
                    );
                }
                Ok(_) => {}
                Err(_) => error!("watchdog tick panicked; continuing"),
            }
        }
        info!("timeout watchdog stopped");
    });

    WatchdogHandle { shutdown, task }
}

/// Handle to a running watchdog task.
#[derive(Debug)]
pub struct WatchdogHandle {
    shutdown: ShutdownSignal,
    task: JoinHandle<()>,
}

impl WatchdogHandle {
    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!("watchdog task ended abnormally: {e}");
        }
    }

    /// Returns true once the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
