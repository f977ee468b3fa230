use crate::traits::ScheduledJob;
use crate::types::{Result, RunReport, ServiceError};
use crate::utils::time::format_duration;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Delay before the one-shot run after start.
    pub startup_delay: Duration,
    /// Period of the recurring run, measured from scheduler start.
    pub interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(4),
            interval: Duration::from_secs(3600),
        }
    }
}

struct SchedulerShared {
    job: Arc<dyn ScheduledJob>,
    // Held for the whole run; tokio's mutex is FIFO, so queued triggers run in order.
    run_guard: Mutex<()>,
    runs_completed: AtomicU64,
}

impl SchedulerShared {
    async fn execute(&self, trigger: &str) -> Result<RunReport> {
        let _guard = self.run_guard.lock().await;
        let name = self.job.name();
        info!("Running {} ({} trigger)", name, trigger);

        let started = Instant::now();
        let job = self.job.clone();
        // Run in its own task so a panic in the job cannot take the timer down.
        let outcome = tokio::spawn(async move { job.run().await }).await;
        self.runs_completed.fetch_add(1, Ordering::SeqCst);

        match outcome {
            Ok(Ok(report)) => {
                info!("{} finished in {:?}", name, started.elapsed());
                Ok(report)
            }
            Ok(Err(e)) => {
                error!("{} failed: {}", name, e);
                Err(e)
            }
            Err(join_error) => {
                error!("{} aborted: {}", name, join_error);
                Err(ServiceError::General(format!("{} aborted: {}", name, join_error)))
            }
        }
    }
}

/// Drives a [`ScheduledJob`]: once after `startup_delay`, then every `interval`.
///
/// Runs never overlap. A trigger that fires while a run is in progress waits for it
/// to finish and then runs; missed interval ticks are replayed, not skipped.
pub struct Scheduler {
    config: ScheduleConfig,
}

impl Scheduler {
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }

    pub fn start(&self, job: Arc<dyn ScheduledJob>) -> SchedulerHandle {
        let shared = Arc::new(SchedulerShared {
            job,
            run_guard: Mutex::new(()),
            runs_completed: AtomicU64::new(0),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            "Scheduler started: first run in {:?}, then every {}",
            self.config.startup_delay,
            chrono::Duration::from_std(self.config.interval)
                .map(format_duration)
                .unwrap_or_else(|_| format!("{:?}", self.config.interval))
        );

        let task = tokio::spawn(timer_loop(shared.clone(), self.config.clone(), shutdown_rx));

        SchedulerHandle {
            shared,
            shutdown: shutdown_tx,
            task,
        }
    }
}

async fn timer_loop(
    shared: Arc<SchedulerShared>,
    config: ScheduleConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let start = Instant::now();

    tokio::select! {
        _ = sleep_until(start + config.startup_delay) => {
            let _ = shared.execute("startup").await;
        }
        _ = shutdown.changed() => return,
    }

    let mut ticker = interval_at(start + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let _ = shared.execute("interval").await;
            }
            _ = shutdown.changed() => break,
        }
    }

    info!("Scheduler stopped");
}

/// Owns a running scheduler. Dropping the handle stops the timer after the current run.
pub struct SchedulerHandle {
    shared: Arc<SchedulerShared>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Run the job now, serialized with the timer's own runs.
    pub async fn trigger(&self) -> Result<RunReport> {
        self.shared.execute("manual").await
    }

    /// Runs finished so far, successful or not.
    pub fn runs_completed(&self) -> u64 {
        self.shared.runs_completed.load(Ordering::SeqCst)
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }
}
