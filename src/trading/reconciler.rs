//! Position reconciliation: the trades that bring a follower in line with a source.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{CopyPolicy, Snapshot, TradeInstruction, TradeSide};

/// Minimum absolute size difference, in outcome tokens, worth trading.
pub const DUST_THRESHOLD: Decimal = dec!(1.0);

/// Compute the instructions that move `follower` towards `source` under `policy`.
///
/// For every asset in the source snapshot (in source order):
/// `target = source_size * copy_ratio`, `delta = target - follower_size`.
/// Deltas strictly below [`DUST_THRESHOLD`] in magnitude are ignored. The
/// instruction quantity is `|delta|`, capped at `policy.fixed_amount` when set.
///
/// Assets only the follower holds are left alone. Inputs are assumed to have
/// passed [`CopyPolicy::validate`] and [`Snapshot::from_entries`], whose
/// bounds keep the arithmetic in range.
pub fn reconcile(source: &Snapshot, follower: &Snapshot, policy: &CopyPolicy) -> Vec<TradeInstruction> {
    source
        .iter()
        .filter_map(|position| {
            let target = position.size * policy.copy_ratio;
            let current = follower.size_of(&position.asset_id);
            let delta = target - current;

            if delta.abs() < DUST_THRESHOLD {
                return None;
            }

            let side = if delta > Decimal::ZERO {
                TradeSide::Buy
            } else {
                TradeSide::Sell
            };

            let quantity = match policy.fixed_amount {
                Some(cap) => delta.abs().min(cap),
                None => delta.abs(),
            };

            Some(TradeInstruction {
                asset_id: position.asset_id.clone(),
                side,
                quantity,
            })
        })
        .collect()
}
