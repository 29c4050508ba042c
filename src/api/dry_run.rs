//! Executor that only logs what it would trade.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::ExecutionError;
use crate::models::TradeInstruction;
use crate::traits::{OrderExecutor, OrderReceipt};

/// Simulated order executor. Nothing leaves the process.
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    orders: AtomicU64,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of simulated orders so far.
    #[cfg(test)]
    pub fn order_count(&self) -> u64 {
        self.orders.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OrderExecutor for DryRunExecutor {
    async fn place(&self, instruction: &TradeInstruction) -> Result<OrderReceipt, ExecutionError> {
        if instruction.quantity <= Decimal::ZERO {
            return Err(ExecutionError::InvalidQuantity(instruction.quantity));
        }

        let n = self.orders.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            asset = %instruction.asset_id,
            side = %instruction.side,
            size = %instruction.quantity,
            "[DRY RUN] Would execute trade"
        );

        Ok(OrderReceipt {
            order_id: Some(format!("dry-run-{}", n)),
            status: Some("simulated".to_string()),
            transaction_hash: None,
            simulated: true,
            submitted_at: Utc::now(),
        })
    }
}
