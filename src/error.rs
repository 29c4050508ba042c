//! Error taxonomy for snapshot fetching, order execution, and policy storage.

use rust_decimal::Decimal;
use thiserror::Error;

/// A positions fetch that did not produce a usable response.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("positions request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("positions request rejected: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode positions response: {0}")]
    Decode(String),

    #[error("positions still incomplete after {fetched} rows")]
    TooManyPositions { fetched: usize },
}

/// Provider output that breaks the snapshot contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedSnapshot {
    #[error("position at index {index} has no asset id")]
    MissingAssetId { index: usize },

    #[error("asset {asset_id} appears more than once")]
    DuplicateAssetId { asset_id: String },

    #[error("asset {asset_id} has out-of-range size {size}")]
    SizeOutOfRange { asset_id: String, size: Decimal },
}

/// A single instruction that could not be placed.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("order rejected by venue: {0}")]
    Rejected(String),

    #[error("no {side} liquidity for {asset_id}")]
    NoLiquidity { asset_id: String, side: &'static str },

    #[error("invalid order quantity {0}")]
    InvalidQuantity(Decimal),

    #[error("venue error: {0}")]
    Venue(String),
}

/// Invalid copy policy on a configuration write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("source_address must not be empty")]
    EmptySourceAddress,

    #[error("copy_ratio must not be negative (got {0})")]
    NegativeCopyRatio(Decimal),

    #[error("copy_ratio must be at most {max} (got {got})")]
    CopyRatioTooLarge { got: Decimal, max: Decimal },

    #[error("fixed_amount must be positive (got {0})")]
    NonPositiveFixedAmount(Decimal),

    #[error("fixed_amount must be at most {max} (got {got})")]
    FixedAmountTooLarge { got: Decimal, max: Decimal },

    #[error("{0} must be a finite number")]
    NotFinite(&'static str),
}

/// Policy store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored policy is corrupt: {0}")]
    Corrupt(String),
}

/// Failures that abort a whole sync cycle before any order is placed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read copy policy: {0}")]
    PolicyStore(#[from] StoreError),

    #[error("failed to fetch positions for {address}: {source}")]
    Provider {
        address: String,
        #[source]
        source: ProviderError,
    },

    #[error("malformed snapshot for {address}: {source}")]
    MalformedSnapshot {
        address: String,
        #[source]
        source: MalformedSnapshot,
    },
}
