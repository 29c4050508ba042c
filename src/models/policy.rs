//! Copy policy: which account to mirror and how to size the copies.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

use super::position::MAX_POSITION_SIZE;

/// Largest accepted copy ratio.
pub const MAX_COPY_RATIO: Decimal = dec!(1000);

fn default_copy_ratio() -> Decimal {
    Decimal::ONE
}

fn default_true() -> bool {
    true
}

/// The single active copy policy.
///
/// Replaced wholesale on every configuration write and read fresh at the
/// start of each sync cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyPolicy {
    /// Address of the account being mirrored
    #[serde(alias = "target_wallet_address")]
    pub source_address: String,

    /// Display name for the source account
    #[serde(default)]
    pub label: Option<String>,

    /// Multiplier applied to the source's position sizes
    #[serde(default = "default_copy_ratio", with = "rust_decimal::serde::float")]
    pub copy_ratio: Decimal,

    /// Upper bound on the quantity of any single instruction
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub fixed_amount: Option<Decimal>,

    /// Paused policies are kept but never synced
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl CopyPolicy {
    /// Active policy mirroring `source_address` one-to-one.
    pub fn new(source_address: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
            label: None,
            copy_ratio: Decimal::ONE,
            fixed_amount: None,
            is_active: true,
        }
    }

    /// Build a policy from float inputs (CLI flags), validating it.
    pub fn from_floats(
        source_address: impl Into<String>,
        label: Option<String>,
        copy_ratio: f64,
        fixed_amount: Option<f64>,
        is_active: bool,
    ) -> Result<Self, PolicyError> {
        let copy_ratio =
            Decimal::try_from(copy_ratio).map_err(|_| PolicyError::NotFinite("copy_ratio"))?;
        let fixed_amount = fixed_amount
            .map(|v| Decimal::try_from(v).map_err(|_| PolicyError::NotFinite("fixed_amount")))
            .transpose()?;

        let policy = Self {
            source_address: source_address.into(),
            label,
            copy_ratio,
            fixed_amount,
            is_active,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn with_ratio(mut self, copy_ratio: Decimal) -> Self {
        self.copy_ratio = copy_ratio;
        self
    }

    pub fn with_fixed_amount(mut self, fixed_amount: Decimal) -> Self {
        self.fixed_amount = Some(fixed_amount);
        self
    }

    pub fn paused(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Check the invariants every stored policy must satisfy.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.source_address.trim().is_empty() {
            return Err(PolicyError::EmptySourceAddress);
        }
        if self.copy_ratio < Decimal::ZERO {
            return Err(PolicyError::NegativeCopyRatio(self.copy_ratio));
        }
        if self.copy_ratio > MAX_COPY_RATIO {
            return Err(PolicyError::CopyRatioTooLarge {
                got: self.copy_ratio,
                max: MAX_COPY_RATIO,
            });
        }
        if let Some(amount) = self.fixed_amount {
            if amount <= Decimal::ZERO {
                return Err(PolicyError::NonPositiveFixedAmount(amount));
            }
            if amount > MAX_POSITION_SIZE {
                return Err(PolicyError::FixedAmountTooLarge {
                    got: amount,
                    max: MAX_POSITION_SIZE,
                });
            }
        }
        Ok(())
    }

    /// Label if set, otherwise the source address.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.source_address)
    }
}
