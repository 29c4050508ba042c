//! Single-flight scheduler for sync cycles.
//!
//! Timer ticks and manual triggers both ask for a cycle. At most one cycle
//! runs at a time; a request arriving while one is running is dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::sync::{SyncOrchestrator, SyncOutcome};

/// What asked for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Timer,
    Manual,
    Cli,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Timer => f.write_str("timer"),
            TriggerSource::Manual => f.write_str("manual"),
            TriggerSource::Cli => f.write_str("cli"),
        }
    }
}

/// Whether a trigger started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
    ShuttingDown,
}

impl TriggerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerOutcome::Started => "started",
            TriggerOutcome::AlreadyRunning => "already_running",
            TriggerOutcome::ShuttingDown => "shutting_down",
        }
    }
}

/// Clears the running flag when dropped, including during a panic unwind.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Periodic, single-flight driver for [`SyncOrchestrator`].
pub struct Scheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    grace: Duration,
    running: Arc<AtomicBool>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        let config = orchestrator.config();
        let (interval, grace) = (config.poll_interval(), config.shutdown_grace());
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            orchestrator,
            interval,
            grace,
            running: Arc::new(AtomicBool::new(false)),
            in_flight: Mutex::new(None),
            shutdown_tx,
        }
    }

    /// True while a cycle is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Request one cycle now. Returns immediately; the cycle runs in the background.
    pub fn trigger(&self, source: TriggerSource) -> TriggerOutcome {
        // Held throughout so shutdown cannot miss a cycle started concurrently
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());

        if self.is_shutting_down() {
            debug!(trigger = %source, "Scheduler shutting down, ignoring trigger");
            return TriggerOutcome::ShuttingDown;
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!(trigger = %source, "Sync already running, dropping trigger");
            return TriggerOutcome::AlreadyRunning;
        }

        let guard = RunningGuard(self.running.clone());
        let orchestrator = self.orchestrator.clone();
        let stop = self.shutdown_tx.subscribe();
        let cycle_id = Uuid::new_v4();

        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                let outcome = orchestrator.run_cycle_until(cycle_id, stop).await;
                log_outcome(&outcome);
            }
            .instrument(cycle_span(cycle_id, source)),
        );

        *in_flight = Some(handle);
        TriggerOutcome::Started
    }

    /// Tick until [`Scheduler::shutdown`] is called. The first tick fires immediately.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.trigger(TriggerSource::Timer);
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopped ticking");
    }

    /// Wait for the in-flight cycle, if any, to finish.
    #[cfg(test)]
    pub async fn wait_idle(&self) {
        let handle = self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Sync cycle crashed");
            }
        }
    }

    /// Stop ticking and let the in-flight cycle wind down within the grace period.
    ///
    /// The shutdown signal also tells the cycle to stop before its next order
    /// placement; if it is still running when the grace period ends it is aborted.
    pub async fn shutdown(&self) {
        let handle = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            self.shutdown_tx.send_replace(true);
            in_flight.take()
        };
        let Some(mut handle) = handle else {
            info!("Scheduler shut down, no cycle in flight");
            return;
        };

        if handle.is_finished() {
            return;
        }

        info!(grace_secs = self.grace.as_secs(), "Waiting for in-flight sync cycle");

        match tokio::time::timeout(self.grace, &mut handle).await {
            Ok(Ok(())) => info!("In-flight sync cycle finished"),
            Ok(Err(e)) => error!(error = %e, "Sync cycle crashed during shutdown"),
            Err(_) => {
                error!(
                    grace_secs = self.grace.as_secs(),
                    "Sync cycle did not finish within grace period, aborting"
                );
                handle.abort();
                let _ = handle.await;
            }
        }
    }
}

/// Span wrapping one sync cycle.
pub fn cycle_span(cycle_id: Uuid, source: TriggerSource) -> tracing::Span {
    info_span!("sync_cycle", id = %cycle_id, trigger = %source)
}

/// Log a finished cycle at a level matching how it went.
pub fn log_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Skipped(reason) => debug!(reason = %reason, "Sync cycle skipped"),
        SyncOutcome::Failed(e) => error!(error = %e, "Sync cycle failed"),
        SyncOutcome::Success(report) => info!(
            placed = report.placed(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "Sync cycle succeeded"
        ),
        SyncOutcome::PartialSuccess(report) => warn!(
            placed = report.placed(),
            failed = report.failed(),
            "Sync cycle partially succeeded"
        ),
        SyncOutcome::Interrupted(report) => warn!(
            placed = report.placed(),
            not_attempted = report.not_attempted(),
            "Sync cycle interrupted"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryPolicyStore;
    use crate::models::CopyPolicy;
    use crate::testing::{BlockingExecutor, FakeProvider, PanickingProvider, RecordingExecutor};
    use crate::traits::{OrderExecutor, PolicyStore, PositionProvider};
    use crate::trading::SyncConfig;
    use rust_decimal_macros::dec;

    const SOURCE: &str = "0xsource";
    const FOLLOWER: &str = "0xfollower";

    async fn scheduler_with(
        provider: Arc<dyn PositionProvider>,
        executor: Arc<dyn OrderExecutor>,
    ) -> Arc<Scheduler> {
        let store = Arc::new(InMemoryPolicyStore::new());
        store.replace(CopyPolicy::new(SOURCE)).await.unwrap();

        let config = SyncConfig {
            follower_address: Some(FOLLOWER.to_string()),
            poll_interval_secs: 60,
            shutdown_grace_secs: 5,
            dry_run: true,
        };
        let orchestrator = SyncOrchestrator::new(config, store, provider, executor);
        Arc::new(Scheduler::new(Arc::new(orchestrator)))
    }

    fn source_provider() -> Arc<FakeProvider> {
        Arc::new(
            FakeProvider::new()
                .with_positions(SOURCE, &[("A", dec!(10)), ("B", dec!(10))])
                .with_positions(FOLLOWER, &[]),
        )
    }

    #[tokio::test]
    async fn test_trigger_while_running_is_dropped() {
        let provider = source_provider();
        let executor = Arc::new(BlockingExecutor::new());
        let scheduler = scheduler_with(provider.clone(), executor.clone()).await;

        assert_eq!(scheduler.trigger(TriggerSource::Manual), TriggerOutcome::Started);
        executor.entered.notified().await;
        assert!(scheduler.is_running());

        assert_eq!(
            scheduler.trigger(TriggerSource::Manual),
            TriggerOutcome::AlreadyRunning
        );
        assert_eq!(
            scheduler.trigger(TriggerSource::Timer),
            TriggerOutcome::AlreadyRunning
        );

        executor.release(2);
        scheduler.wait_idle().await;

        assert!(!scheduler.is_running());
        assert_eq!(provider.calls_for(SOURCE), 1);
        assert_eq!(executor.placed().len(), 2);

        // Idle again, so the next request runs
        assert_eq!(scheduler.trigger(TriggerSource::Manual), TriggerOutcome::Started);
        scheduler.wait_idle().await;
        assert_eq!(provider.calls_for(SOURCE), 2);
    }

    #[tokio::test]
    async fn test_panicking_cycle_releases_running_flag() {
        let scheduler =
            scheduler_with(Arc::new(PanickingProvider), Arc::new(RecordingExecutor::new())).await;

        assert_eq!(scheduler.trigger(TriggerSource::Manual), TriggerOutcome::Started);
        scheduler.wait_idle().await;

        assert!(!scheduler.is_running());
        assert_eq!(scheduler.trigger(TriggerSource::Manual), TriggerOutcome::Started);
        scheduler.wait_idle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_on_fixed_interval() {
        let provider = source_provider();
        let scheduler = scheduler_with(provider.clone(), Arc::new(RecordingExecutor::new())).await;

        let runner = tokio::spawn(scheduler.clone().run());

        // Ticks at 0s, 60s and 120s
        tokio::time::sleep(Duration::from_secs(130)).await;
        scheduler.wait_idle().await;
        assert_eq!(provider.calls_for(SOURCE), 3);

        scheduler.shutdown().await;
        runner.await.unwrap();

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(provider.calls_for(SOURCE), 3);
    }

    #[tokio::test]
    async fn test_no_triggers_after_shutdown() {
        let scheduler =
            scheduler_with(source_provider(), Arc::new(RecordingExecutor::new())).await;

        scheduler.shutdown().await;
        assert_eq!(
            scheduler.trigger(TriggerSource::Manual),
            TriggerOutcome::ShuttingDown
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_between_orders() {
        let provider = source_provider();
        let executor = Arc::new(BlockingExecutor::new());
        let scheduler = scheduler_with(provider, executor.clone()).await;

        scheduler.trigger(TriggerSource::Manual);
        executor.entered.notified().await;

        // Let the in-flight order finish once shutdown has begun
        let releaser = {
            let executor = executor.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                executor.release(1);
            })
        };

        scheduler.shutdown().await;
        releaser.await.unwrap();

        assert!(!scheduler.is_running());
        assert_eq!(executor.placed().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_after_grace_period() {
        let executor = Arc::new(BlockingExecutor::new());
        let scheduler = scheduler_with(source_provider(), executor.clone()).await;

        scheduler.trigger(TriggerSource::Manual);
        executor.entered.notified().await;

        // Never released: shutdown must still return after the 5s grace
        scheduler.shutdown().await;

        assert!(!scheduler.is_running());
        assert!(executor.placed().is_empty());
    }
}
