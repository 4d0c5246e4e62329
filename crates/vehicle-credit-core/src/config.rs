//! Engine configuration: rounding scale, reconciliation thresholds and the
//! delinquency policy. Every field has a default so a partial file is valid.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::VehicleCreditError;
use crate::types::Money;
use crate::VehicleCreditResult;

/// Discrepancy bands for a cash closing, in currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationThresholds {
    /// Largest difference still reported as BALANCED (inclusive).
    pub balanced_max: Money,
    /// Largest difference reported as MINOR_DIFFERENCE (inclusive).
    pub minor_max: Money,
}

impl Default for ReconciliationThresholds {
    fn default() -> Self {
        Self {
            balanced_max: dec!(1000),
            minor_max: dec!(5000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Decimal places kept on payments and interest portions.
    pub money_scale: u32,
    pub reconciliation: ReconciliationThresholds,
    /// Ancillary fees (tracking device, etc.) are reported apart from income
    /// unless this is set.
    pub include_fees_in_income: bool,
    /// Consecutive missed due dates that move an active loan to DEFAULTED.
    pub missed_installments_for_default: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            money_scale: 2,
            reconciliation: ReconciliationThresholds::default(),
            include_fees_in_income: false,
            missed_installments_for_default: 3,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> VehicleCreditResult<()> {
        let bands = &self.reconciliation;
        if bands.balanced_max < Decimal::ZERO {
            return Err(VehicleCreditError::invalid(
                "reconciliation.balanced_max",
                "Threshold cannot be negative",
            ));
        }
        if bands.minor_max < bands.balanced_max {
            return Err(VehicleCreditError::invalid(
                "reconciliation.minor_max",
                "Minor threshold must be at least the balanced threshold",
            ));
        }
        if self.money_scale > 8 {
            return Err(VehicleCreditError::invalid(
                "money_scale",
                "At most 8 decimal places are supported",
            ));
        }
        if self.missed_installments_for_default == 0 {
            return Err(VehicleCreditError::invalid(
                "missed_installments_for_default",
                "Must be at least 1",
            ));
        }
        Ok(())
    }

    /// Round a money amount to the configured scale.
    pub fn round_money(&self, amount: Money) -> Money {
        amount.round_dp(self.money_scale)
    }
}
