//! Test doubles for the provider and executor seams.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Notify, Semaphore};

use crate::error::{ExecutionError, ProviderError};
use crate::models::{PositionEntry, TradeInstruction};
use crate::traits::{OrderExecutor, OrderReceipt, PositionProvider};

/// Provider returning scripted positions per address.
#[derive(Default)]
pub struct FakeProvider {
    positions: HashMap<String, Vec<PositionEntry>>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_positions(self, address: &str, positions: &[(&str, Decimal)]) -> Self {
        let entries = positions
            .iter()
            .map(|(id, size)| PositionEntry::new(*id, *size))
            .collect();
        self.with_entries(address, entries)
    }

    pub fn with_entries(mut self, address: &str, entries: Vec<PositionEntry>) -> Self {
        self.positions.insert(address.to_string(), entries);
        self
    }

    pub fn failing_for(mut self, address: &str) -> Self {
        self.failing.insert(address.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, address: &str) -> usize {
        self.calls().iter().filter(|a| a.as_str() == address).count()
    }
}

#[async_trait]
impl PositionProvider for FakeProvider {
    async fn fetch_positions(&self, address: &str) -> Result<Vec<PositionEntry>, ProviderError> {
        self.calls.lock().unwrap().push(address.to_string());

        if self.failing.contains(address) {
            return Err(ProviderError::Status {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }

        Ok(self.positions.get(address).cloned().unwrap_or_default())
    }
}

/// Provider that panics, to exercise crash paths.
pub struct PanickingProvider;

#[async_trait]
impl PositionProvider for PanickingProvider {
    async fn fetch_positions(&self, _address: &str) -> Result<Vec<PositionEntry>, ProviderError> {
        panic!("provider exploded");
    }
}

/// Executor recording every attempted instruction.
#[derive(Default)]
pub struct RecordingExecutor {
    attempted: Mutex<Vec<TradeInstruction>>,
    placed: Mutex<Vec<TradeInstruction>>,
    fail_assets: HashSet<String>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every instruction for `asset_id`.
    pub fn failing_on(mut self, asset_id: &str) -> Self {
        self.fail_assets.insert(asset_id.to_string());
        self
    }

    pub fn placed(&self) -> Vec<TradeInstruction> {
        self.placed.lock().unwrap().clone()
    }

    pub fn attempted_assets(&self) -> Vec<String> {
        self.attempted
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.asset_id.clone())
            .collect()
    }
}

#[async_trait]
impl OrderExecutor for RecordingExecutor {
    async fn place(&self, instruction: &TradeInstruction) -> Result<OrderReceipt, ExecutionError> {
        self.attempted.lock().unwrap().push(instruction.clone());

        if self.fail_assets.contains(&instruction.asset_id) {
            return Err(ExecutionError::Rejected("not enough balance".to_string()));
        }

        self.placed.lock().unwrap().push(instruction.clone());
        Ok(OrderReceipt {
            order_id: Some(format!("order-{}", instruction.asset_id)),
            status: Some("matched".to_string()),
            transaction_hash: None,
            simulated: false,
            submitted_at: Utc::now(),
        })
    }
}

/// Executor that parks inside `place` until released.
pub struct BlockingExecutor {
    pub entered: Notify,
    gate: Semaphore,
    inner: RecordingExecutor,
}

impl BlockingExecutor {
    pub fn new() -> Self {
        Self {
            entered: Notify::new(),
            gate: Semaphore::new(0),
            inner: RecordingExecutor::new(),
        }
    }

    /// Let `n` parked placements proceed.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn placed(&self) -> Vec<TradeInstruction> {
        self.inner.placed()
    }
}

#[async_trait]
impl OrderExecutor for BlockingExecutor {
    async fn place(&self, instruction: &TradeInstruction) -> Result<OrderReceipt, ExecutionError> {
        self.entered.notify_one();
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ExecutionError::Venue(e.to_string()))?;
        permit.forget();
        self.inner.place(instruction).await
    }
}
