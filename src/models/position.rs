//! Position model and point-in-time snapshots of an account's holdings.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::MalformedSnapshot;

/// Largest position size, in outcome tokens, a snapshot accepts.
///
/// Keeps `size * copy_ratio` and the base-unit conversion far inside
/// `Decimal`'s range.
pub const MAX_POSITION_SIZE: Decimal = dec!(1000000000000);

/// Raw position row as reported by a positions provider.
///
/// Fields are optional because the provider contract is only enforced when
/// the rows are assembled into a [`Snapshot`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionEntry {
    /// Outcome token ID (CLOB asset)
    pub asset_id: Option<String>,

    /// Number of outcome tokens held
    pub size: Option<Decimal>,

    /// Market title for display
    #[serde(default)]
    pub title: String,

    /// Outcome held (e.g., "Yes", "No")
    #[serde(default)]
    pub outcome: String,
}

impl PositionEntry {
    pub fn new(asset_id: impl Into<String>, size: Decimal) -> Self {
        Self {
            asset_id: Some(asset_id.into()),
            size: Some(size),
            ..Default::default()
        }
    }
}

/// One open exposure for an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Outcome token ID, unique within a snapshot
    pub asset_id: String,

    /// Signed quantity of outcome tokens
    pub size: Decimal,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub outcome: String,
}

/// All open positions of one address at one point in time.
///
/// Iteration order is the order the provider reported the positions in.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    positions: Vec<Position>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    /// Build a snapshot from provider rows.
    ///
    /// Rows without an asset ID, repeating one, or with a size beyond
    /// [`MAX_POSITION_SIZE`] violate the provider contract and reject the
    /// whole snapshot. A missing size counts as zero.
    pub fn from_entries(entries: Vec<PositionEntry>) -> Result<Self, MalformedSnapshot> {
        let mut positions = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());

        for (i, entry) in entries.into_iter().enumerate() {
            let asset_id = match entry.asset_id {
                Some(id) if !id.trim().is_empty() => id,
                _ => return Err(MalformedSnapshot::MissingAssetId { index: i }),
            };

            if index.contains_key(&asset_id) {
                return Err(MalformedSnapshot::DuplicateAssetId { asset_id });
            }

            let size = entry.size.unwrap_or(Decimal::ZERO);
            if size.abs() > MAX_POSITION_SIZE {
                return Err(MalformedSnapshot::SizeOutOfRange { asset_id, size });
            }

            index.insert(asset_id.clone(), positions.len());
            positions.push(Position {
                asset_id,
                size,
                title: entry.title,
                outcome: entry.outcome,
            });
        }

        Ok(Self { positions, index })
    }

    /// Look up the position held in an asset.
    pub fn get(&self, asset_id: &str) -> Option<&Position> {
        self.index.get(asset_id).map(|&i| &self.positions[i])
    }

    /// Size held in an asset, zero when the asset is not held.
    pub fn size_of(&self, asset_id: &str) -> Decimal {
        self.get(asset_id).map(|p| p.size).unwrap_or(Decimal::ZERO)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
