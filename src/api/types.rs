//! API response types for Polymarket Data API.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::models::PositionEntry;

/// Position response from /positions endpoint.
///
/// Only `asset` and `size` drive reconciliation; the rest is display data.
/// Both are optional here so a bad row surfaces as a malformed snapshot
/// instead of failing the whole response decode.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    #[serde(default)]
    pub proxy_wallet: String,
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub condition_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub size: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub cur_price: Option<Decimal>,
}

impl From<PositionResponse> for PositionEntry {
    fn from(p: PositionResponse) -> Self {
        PositionEntry {
            asset_id: p.asset,
            size: p.size,
            title: p.title,
            outcome: p.outcome,
        }
    }
}
