//! Sync orchestrator: one reconciliation cycle from policy read to order placement.
//!
//! A cycle:
//! - Reads the copy policy (once; later changes only affect the next cycle)
//! - Fetches source and follower snapshots concurrently
//! - Reconciles them into trade instructions
//! - Places the instructions one at a time, continuing past failures

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ExecutionError, ProviderError, SyncError};
use crate::models::{CopyPolicy, PositionEntry, Snapshot, TradeInstruction};
use crate::traits::{OrderExecutor, OrderReceipt, PolicyStore, PositionProvider};

use super::reconciler::reconcile;
use super::SyncConfig;

/// Why a cycle did nothing. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoPolicy,
    Inactive,
    NoFollowerAddress,
    NoSourcePositions,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::NoPolicy => "no copy policy configured",
            SkipReason::Inactive => "copy policy is paused",
            SkipReason::NoFollowerAddress => "follower address not configured",
            SkipReason::NoSourcePositions => "source has no open positions",
        };
        f.write_str(reason)
    }
}

/// Result of placing one instruction.
#[derive(Debug)]
pub struct InstructionResult {
    pub instruction: TradeInstruction,
    pub result: Result<OrderReceipt, ExecutionError>,
}

/// What a cycle planned and what happened to each instruction.
#[derive(Debug)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub source_address: String,
    pub instructions: Vec<TradeInstruction>,
    pub results: Vec<InstructionResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CycleReport {
    pub fn placed(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_err()).count()
    }

    /// Instructions never attempted because the cycle was interrupted.
    pub fn not_attempted(&self) -> usize {
        self.instructions.len() - self.results.len()
    }
}

/// Outcome of a single sync cycle.
#[derive(Debug)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Failed(SyncError),
    Success(CycleReport),
    PartialSuccess(CycleReport),
    /// Shutdown was requested between placements
    Interrupted(CycleReport),
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            SyncOutcome::Success(r) | SyncOutcome::PartialSuccess(r) | SyncOutcome::Interrupted(r) => {
                Some(r)
            }
            _ => None,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            SyncOutcome::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Skipped(reason) => write!(f, "Skipped: {}", reason),
            SyncOutcome::Failed(e) => write!(f, "Failed: {}", e),
            SyncOutcome::Success(r) => write!(f, "Success: {} order(s) placed", r.placed()),
            SyncOutcome::PartialSuccess(r) => write!(
                f,
                "Partial success: {} placed, {} failed",
                r.placed(),
                r.failed()
            ),
            SyncOutcome::Interrupted(r) => write!(
                f,
                "Interrupted: {} placed, {} failed, {} not attempted",
                r.placed(),
                r.failed(),
                r.not_attempted()
            ),
        }
    }
}

/// Runs sync cycles against injected policy, position, and order collaborators.
pub struct SyncOrchestrator {
    config: SyncConfig,
    policies: Arc<dyn PolicyStore>,
    provider: Arc<dyn PositionProvider>,
    executor: Arc<dyn OrderExecutor>,
}

impl SyncOrchestrator {
    pub fn new(
        config: SyncConfig,
        policies: Arc<dyn PolicyStore>,
        provider: Arc<dyn PositionProvider>,
        executor: Arc<dyn OrderExecutor>,
    ) -> Self {
        Self {
            config,
            policies,
            provider,
            executor,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one full sync cycle. Never panics on collaborator errors; every
    /// failure is folded into the returned outcome.
    pub async fn run_cycle(&self) -> SyncOutcome {
        self.run_cycle_with_id(Uuid::new_v4()).await
    }

    /// Same as [`SyncOrchestrator::run_cycle`], tagging the report with `cycle_id`.
    pub async fn run_cycle_with_id(&self, cycle_id: Uuid) -> SyncOutcome {
        let (_never, stop) = watch::channel(false);
        self.run_cycle_until(cycle_id, stop).await
    }

    /// Run one cycle that stops before its next order placement once `stop`
    /// reads `true`. An order already submitted is always allowed to complete.
    ///
    /// The signal belongs to the caller, so a stopped cycle leaves nothing
    /// behind that would affect later cycles.
    pub async fn run_cycle_until(&self, cycle_id: Uuid, stop: watch::Receiver<bool>) -> SyncOutcome {
        let started_at = Utc::now();

        // 1. Policy is read exactly once per cycle
        let policy = match self.policies.get().await {
            Ok(Some(policy)) => policy,
            Ok(None) => {
                debug!("No copy policy configured, skipping sync");
                return SyncOutcome::Skipped(SkipReason::NoPolicy);
            }
            Err(e) => {
                error!(error = %e, "Failed to read copy policy");
                return SyncOutcome::Failed(e.into());
            }
        };

        if !policy.is_active {
            info!(source = %policy.display_name(), "Copy policy is paused, skipping sync");
            return SyncOutcome::Skipped(SkipReason::Inactive);
        }

        let Some(follower_address) = self.config.follower() else {
            warn!("Follower address not set, skipping sync");
            return SyncOutcome::Skipped(SkipReason::NoFollowerAddress);
        };

        info!(
            source = %policy.source_address,
            label = ?policy.label,
            ratio = %policy.copy_ratio,
            fixed_amount = ?policy.fixed_amount,
            dry_run = self.config.dry_run,
            "Syncing positions"
        );

        // 2. Both snapshots or nothing
        let (source, follower) = match self
            .fetch_snapshots(&policy.source_address, follower_address)
            .await
        {
            Ok(snapshots) => snapshots,
            Err(e) => {
                error!(error = %e, "Snapshot fetch failed, no trades this cycle");
                return SyncOutcome::Failed(e);
            }
        };

        if source.is_empty() {
            info!(source = %policy.source_address, "No positions found for source");
            return SyncOutcome::Skipped(SkipReason::NoSourcePositions);
        }

        // 3. Reconcile
        let instructions = reconcile(&source, &follower, &policy);
        info!(
            source_positions = source.len(),
            follower_positions = follower.len(),
            instructions = instructions.len(),
            "Reconciled snapshots"
        );

        // 4. Execute sequentially
        let results = self.execute(&instructions, &source, &follower, &stop).await;
        let interrupted = results.len() < instructions.len();

        let report = CycleReport {
            cycle_id,
            source_address: policy.source_address.clone(),
            instructions,
            results,
            started_at,
            finished_at: Utc::now(),
        };

        self.classify(&policy, report, interrupted)
    }

    async fn fetch_snapshots(
        &self,
        source_address: &str,
        follower_address: &str,
    ) -> Result<(Snapshot, Snapshot), SyncError> {
        let (source, follower) = future::join(
            self.provider.fetch_positions(source_address),
            self.provider.fetch_positions(follower_address),
        )
        .await;

        let source = into_snapshot(source_address, source)?;
        let follower = into_snapshot(follower_address, follower)?;
        Ok((source, follower))
    }

    async fn execute(
        &self,
        instructions: &[TradeInstruction],
        source: &Snapshot,
        follower: &Snapshot,
        stop: &watch::Receiver<bool>,
    ) -> Vec<InstructionResult> {
        let mut results = Vec::with_capacity(instructions.len());

        for instruction in instructions {
            if *stop.borrow() {
                warn!(
                    remaining = instructions.len() - results.len(),
                    "Stop requested, abandoning remaining instructions"
                );
                break;
            }

            info!(
                asset = %instruction.asset_id,
                side = %instruction.side,
                quantity = %instruction.quantity,
                source_size = %source.size_of(&instruction.asset_id),
                current_size = %follower.size_of(&instruction.asset_id),
                "Executing instruction"
            );

            let result = self.executor.place(instruction).await;
            match &result {
                Ok(receipt) => info!(
                    asset = %instruction.asset_id,
                    order_id = ?receipt.order_id,
                    simulated = receipt.simulated,
                    "Order placed"
                ),
                Err(e) => error!(
                    asset = %instruction.asset_id,
                    side = %instruction.side,
                    error = %e,
                    "Order placement failed, continuing with remaining instructions"
                ),
            }

            results.push(InstructionResult {
                instruction: instruction.clone(),
                result,
            });
        }

        results
    }

    fn classify(&self, policy: &CopyPolicy, report: CycleReport, interrupted: bool) -> SyncOutcome {
        let (placed, failed) = (report.placed(), report.failed());

        if interrupted {
            warn!(placed, failed, not_attempted = report.not_attempted(), "Sync cycle interrupted");
            return SyncOutcome::Interrupted(report);
        }

        if report.instructions.is_empty() {
            info!(source = %policy.display_name(), "Follower already in sync");
        } else if failed > 0 {
            warn!(placed, failed, "Sync cycle finished with failures");
        } else {
            info!(placed, "Sync cycle finished");
        }

        if failed > 0 {
            SyncOutcome::PartialSuccess(report)
        } else {
            SyncOutcome::Success(report)
        }
    }
}

fn into_snapshot(
    address: &str,
    fetched: Result<Vec<PositionEntry>, ProviderError>,
) -> Result<Snapshot, SyncError> {
    let entries = fetched.map_err(|source| SyncError::Provider {
        address: address.to_string(),
        source,
    })?;

    Snapshot::from_entries(entries).map_err(|source| SyncError::MalformedSnapshot {
        address: address.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryPolicyStore;
    use crate::testing::{FakeProvider, RecordingExecutor};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    const SOURCE: &str = "0xsource";
    const FOLLOWER: &str = "0xfollower";

    fn config() -> SyncConfig {
        SyncConfig {
            follower_address: Some(FOLLOWER.to_string()),
            ..Default::default()
        }
    }

    async fn store_with(policy: Option<CopyPolicy>) -> Arc<InMemoryPolicyStore> {
        let store = Arc::new(InMemoryPolicyStore::new());
        if let Some(policy) = policy {
            store.replace(policy).await.unwrap();
        }
        store
    }

    fn orchestrator(
        config: SyncConfig,
        store: Arc<InMemoryPolicyStore>,
        provider: Arc<FakeProvider>,
        executor: Arc<dyn OrderExecutor>,
    ) -> SyncOrchestrator {
        SyncOrchestrator::new(config, store, provider, executor)
    }

    #[tokio::test]
    async fn test_skips_without_policy() {
        let provider = Arc::new(FakeProvider::new());
        let sync = orchestrator(
            config(),
            store_with(None).await,
            provider.clone(),
            Arc::new(RecordingExecutor::new()),
        );

        let outcome = sync.run_cycle().await;
        assert_eq!(outcome.skip_reason(), Some(SkipReason::NoPolicy));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_skips_inactive_policy() {
        let provider = Arc::new(FakeProvider::new());
        let sync = orchestrator(
            config(),
            store_with(Some(CopyPolicy::new(SOURCE).paused())).await,
            provider.clone(),
            Arc::new(RecordingExecutor::new()),
        );

        assert_eq!(sync.run_cycle().await.skip_reason(), Some(SkipReason::Inactive));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_skips_without_follower_address() {
        let provider = Arc::new(FakeProvider::new().with_positions(SOURCE, &[("A", dec!(10))]));
        let sync = orchestrator(
            SyncConfig::default(),
            store_with(Some(CopyPolicy::new(SOURCE))).await,
            provider,
            Arc::new(RecordingExecutor::new()),
        );

        assert_eq!(
            sync.run_cycle().await.skip_reason(),
            Some(SkipReason::NoFollowerAddress)
        );
    }

    #[tokio::test]
    async fn test_skips_when_source_is_empty() {
        let executor = Arc::new(RecordingExecutor::new());
        let sync = orchestrator(
            config(),
            store_with(Some(CopyPolicy::new(SOURCE))).await,
            Arc::new(FakeProvider::new().with_positions(FOLLOWER, &[("A", dec!(10))])),
            executor.clone(),
        );

        assert_eq!(
            sync.run_cycle().await.skip_reason(),
            Some(SkipReason::NoSourcePositions)
        );
        assert!(executor.placed().is_empty());
    }

    #[tokio::test]
    async fn test_places_reconciled_instructions_in_order() {
        let executor = Arc::new(RecordingExecutor::new());
        let provider = FakeProvider::new()
            .with_positions(SOURCE, &[("A", dec!(10)), ("B", dec!(5))])
            .with_positions(FOLLOWER, &[("A", dec!(8))]);
        let sync = orchestrator(
            config(),
            store_with(Some(CopyPolicy::new(SOURCE))).await,
            Arc::new(provider),
            executor.clone(),
        );

        let report = match sync.run_cycle().await {
            SyncOutcome::Success(report) => report,
            other => panic!("expected success, got {other}"),
        };
        assert_eq!(report.placed(), 2);
        assert_eq!(report.source_address, SOURCE);
        assert_eq!(
            executor.placed(),
            vec![
                TradeInstruction::buy("A", dec!(2)),
                TradeInstruction::buy("B", dec!(5)),
            ]
        );
    }

    #[tokio::test]
    async fn test_in_sync_follower_is_success_without_orders() {
        let executor = Arc::new(RecordingExecutor::new());
        let provider = FakeProvider::new()
            .with_positions(SOURCE, &[("A", dec!(100))])
            .with_positions(FOLLOWER, &[("A", dec!(100))]);
        let sync = orchestrator(
            config(),
            store_with(Some(CopyPolicy::new(SOURCE))).await,
            Arc::new(provider),
            executor.clone(),
        );

        let outcome = sync.run_cycle().await;
        assert!(matches!(outcome, SyncOutcome::Success(ref r) if r.instructions.is_empty()));
        assert!(executor.placed().is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_places_nothing() {
        for failing in [SOURCE, FOLLOWER] {
            let executor = Arc::new(RecordingExecutor::new());
            let provider = FakeProvider::new()
                .with_positions(SOURCE, &[("A", dec!(100))])
                .with_positions(FOLLOWER, &[])
                .failing_for(failing);
            let sync = orchestrator(
                config(),
                store_with(Some(CopyPolicy::new(SOURCE))).await,
                Arc::new(provider),
                executor.clone(),
            );

            let outcome = sync.run_cycle().await;
            match outcome {
                SyncOutcome::Failed(SyncError::Provider { address, .. }) => {
                    assert_eq!(address, failing)
                }
                other => panic!("expected provider failure, got {other}"),
            }
            assert!(executor.placed().is_empty());
        }
    }

    #[tokio::test]
    async fn test_malformed_snapshot_fails_cycle() {
        let executor = Arc::new(RecordingExecutor::new());
        let provider = FakeProvider::new()
            .with_entries(
                SOURCE,
                vec![
                    PositionEntry::new("A", dec!(10)),
                    PositionEntry {
                        asset_id: None,
                        size: Some(dec!(4)),
                        ..Default::default()
                    },
                ],
            )
            .with_positions(FOLLOWER, &[]);
        let sync = orchestrator(
            config(),
            store_with(Some(CopyPolicy::new(SOURCE))).await,
            Arc::new(provider),
            executor.clone(),
        );

        let outcome = sync.run_cycle().await;
        assert!(matches!(
            outcome,
            SyncOutcome::Failed(SyncError::MalformedSnapshot { .. })
        ));
        assert!(executor.placed().is_empty());
    }

    #[tokio::test]
    async fn test_failed_instruction_does_not_stop_the_rest() {
        let executor = Arc::new(RecordingExecutor::new().failing_on("B"));
        let provider = FakeProvider::new()
            .with_positions(SOURCE, &[("A", dec!(10)), ("B", dec!(10)), ("C", dec!(10))])
            .with_positions(FOLLOWER, &[]);
        let sync = orchestrator(
            config(),
            store_with(Some(CopyPolicy::new(SOURCE))).await,
            Arc::new(provider),
            executor.clone(),
        );

        let report = match sync.run_cycle().await {
            SyncOutcome::PartialSuccess(report) => report,
            other => panic!("expected partial success, got {other}"),
        };
        assert_eq!(report.placed(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(executor.attempted_assets(), vec!["A", "B", "C"]);
    }

    struct ClearingExecutor {
        store: Arc<InMemoryPolicyStore>,
        inner: RecordingExecutor,
    }

    #[async_trait]
    impl OrderExecutor for ClearingExecutor {
        async fn place(&self, instruction: &TradeInstruction) -> Result<OrderReceipt, ExecutionError> {
            self.store.clear().await.unwrap();
            self.inner.place(instruction).await
        }
    }

    #[tokio::test]
    async fn test_policy_cleared_mid_cycle_applies_next_cycle() {
        let store = store_with(Some(CopyPolicy::new(SOURCE).with_ratio(dec!(2)))).await;
        let executor = Arc::new(ClearingExecutor {
            store: store.clone(),
            inner: RecordingExecutor::new(),
        });
        let provider = FakeProvider::new()
            .with_positions(SOURCE, &[("A", dec!(10)), ("B", dec!(3))])
            .with_positions(FOLLOWER, &[]);
        let sync = orchestrator(config(), store, Arc::new(provider), executor.clone());

        let first = sync.run_cycle().await;
        assert!(matches!(first, SyncOutcome::Success(_)));
        assert_eq!(
            executor.inner.placed(),
            vec![
                TradeInstruction::buy("A", dec!(20)),
                TradeInstruction::buy("B", dec!(6)),
            ]
        );

        let second = sync.run_cycle().await;
        assert_eq!(second.skip_reason(), Some(SkipReason::NoPolicy));
    }

    #[tokio::test]
    async fn test_stop_request_interrupts_between_orders() {
        let executor = Arc::new(RecordingExecutor::new());
        let provider = FakeProvider::new()
            .with_positions(SOURCE, &[("A", dec!(10))])
            .with_positions(FOLLOWER, &[]);
        let sync = orchestrator(
            config(),
            store_with(Some(CopyPolicy::new(SOURCE))).await,
            Arc::new(provider),
            executor.clone(),
        );

        let (_stop_tx, stop) = watch::channel(true);
        let report = match sync.run_cycle_until(Uuid::new_v4(), stop).await {
            SyncOutcome::Interrupted(report) => report,
            other => panic!("expected interruption, got {other}"),
        };
        assert_eq!(report.not_attempted(), 1);
        assert!(executor.placed().is_empty());
        assert_eq!(report.placed(), 0);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test]
    async fn test_stopped_cycle_does_not_affect_the_next() {
        let executor = Arc::new(RecordingExecutor::new());
        let provider = FakeProvider::new()
            .with_positions(SOURCE, &[("A", dec!(10))])
            .with_positions(FOLLOWER, &[]);
        let sync = orchestrator(
            config(),
            store_with(Some(CopyPolicy::new(SOURCE))).await,
            Arc::new(provider),
            executor.clone(),
        );

        let (_stop_tx, stop) = watch::channel(true);
        let first = sync.run_cycle_until(Uuid::new_v4(), stop).await;
        assert!(matches!(first, SyncOutcome::Interrupted(_)));

        let second = sync.run_cycle().await;
        assert!(matches!(second, SyncOutcome::Success(_)), "got {second}");
        assert_eq!(executor.placed(), vec![TradeInstruction::buy("A", dec!(10))]);
    }
}
