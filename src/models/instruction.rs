//! Trade instructions produced by reconciliation.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single order the follower must place to track the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeInstruction {
    /// Outcome token to trade
    pub asset_id: String,

    pub side: TradeSide,

    /// Number of outcome tokens, always positive
    pub quantity: Decimal,
}

impl TradeInstruction {
    pub fn buy(asset_id: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            asset_id: asset_id.into(),
            side: TradeSide::Buy,
            quantity,
        }
    }

    pub fn sell(asset_id: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            asset_id: asset_id.into(),
            side: TradeSide::Sell,
            quantity,
        }
    }
}

impl fmt::Display for TradeInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.side, self.asset_id, self.quantity.normalize())
    }
}
