//! Seams between the sync engine and the outside world.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ExecutionError, ProviderError, StoreError};
use crate::models::{CopyPolicy, PositionEntry, TradeInstruction};

/// Source of position snapshots for an address.
///
/// An address with no open positions yields an empty list, not an error.
#[async_trait]
pub trait PositionProvider: Send + Sync {
    async fn fetch_positions(&self, address: &str) -> Result<Vec<PositionEntry>, ProviderError>;
}

/// Venue that accepts trade instructions.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn place(&self, instruction: &TradeInstruction) -> Result<OrderReceipt, ExecutionError>;
}

/// Holder of the single copy policy.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Current policy, if one is configured.
    async fn get(&self) -> Result<Option<CopyPolicy>, StoreError>;

    /// Replace the policy wholesale.
    async fn replace(&self, policy: CopyPolicy) -> Result<CopyPolicy, StoreError>;

    /// Remove the policy. Returns whether one existed.
    async fn clear(&self) -> Result<bool, StoreError>;
}

/// Venue acknowledgement for a placed order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderReceipt {
    pub order_id: Option<String>,
    pub status: Option<String>,
    pub transaction_hash: Option<String>,
    /// True when nothing was sent to a venue
    pub simulated: bool,
    pub submitted_at: DateTime<Utc>,
}
