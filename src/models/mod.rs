//! Data models for positions, snapshots, copy policies, and trade instructions.

mod instruction;
mod policy;
mod position;

pub use instruction::{TradeInstruction, TradeSide};
pub use policy::CopyPolicy;
pub use position::{Position, PositionEntry, Snapshot};
