use chrono::{Duration, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VehicleCreditError;
use crate::VehicleCreditResult;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Annual interest rates as entered on the loan terms, in percent (12 = 12%).
pub type PercentRate = Decimal;

pub type LoanId = Uuid;
pub type InstallmentId = Uuid;
pub type NewsId = Uuid;
pub type ClosingId = Uuid;
pub type StoreId = Uuid;

/// How interest is charged over the life of the loan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterestType {
    /// Simple interest computed once over the full term
    #[default]
    Fixed,
    /// Interest recomputed each period on the declining balance
    Compound,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentFrequency {
    Weekly,
    Biweekly,
    #[default]
    Monthly,
}

impl PaymentFrequency {
    /// Nominal period length used to convert unavailable days into installments.
    pub fn period_days(&self) -> u32 {
        match self {
            PaymentFrequency::Weekly => 7,
            PaymentFrequency::Biweekly => 15,
            PaymentFrequency::Monthly => 30,
        }
    }

    /// Due date of installment `sequence` (1-based) for a loan starting on `start`.
    ///
    /// Weekly and biweekly schedules step in fixed days; monthly schedules step
    /// in calendar months, clamping to the last day of shorter months.
    pub fn due_date(&self, start: NaiveDate, sequence: u32) -> VehicleCreditResult<NaiveDate> {
        let stepped = match self {
            PaymentFrequency::Monthly => start.checked_add_months(Months::new(sequence)),
            other => {
                let days = i64::from(other.period_days()) * i64::from(sequence);
                start.checked_add_signed(Duration::days(days))
            }
        };
        stepped.ok_or_else(|| {
            VehicleCreditError::DateError(format!(
                "due date for installment {sequence} from {start} overflows the calendar"
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    #[default]
    Active,
    Completed,
    Defaulted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Transfer,
}

/// Timing of a payment relative to its scheduled due date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentTiming {
    OnTime,
    Late,
    Advance,
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
