//! Installment schedule generation for FIXED (simple) and COMPOUND interest.
//!
//! The schedule is a pure function of the financed amount, the number of
//! installments and the annual rate. Payments and interest portions are rounded
//! to the configured money scale; the residual left by rounding is absorbed by
//! the final row so the closing balance is exactly zero.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::EngineConfig;
use crate::error::VehicleCreditError;
use crate::types::{with_metadata, ComputationOutput, InterestType, Money, PercentRate};
use crate::VehicleCreditResult;

const MONTHS_PER_YEAR: Decimal = dec!(12);
const PERCENT: Decimal = dec!(100);

// ---------------------------------------------------------------------------
// Input / Output Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleInput {
    /// Principal minus down payment.
    pub financed_amount: Money,
    pub installments: u32,
    /// Annual rate in percent (12 = 12%).
    pub annual_rate: PercentRate,
    pub interest_type: InterestType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub number: u32,
    pub payment: Money,
    pub principal: Money,
    pub interest: Money,
    pub remaining_balance: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOutput {
    /// Level payment before the final-row correction.
    pub payment_amount: Money,
    pub total_interest: Money,
    pub total_payable: Money,
    pub rows: Vec<ScheduleRow>,
}

impl ScheduleOutput {
    pub fn total_principal(&self) -> Money {
        self.rows.iter().map(|r| r.principal).sum()
    }
}

/// Headline figures needed to open a loan, without the row detail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleTotals {
    pub payment_amount: Money,
    pub total_interest: Money,
    pub total_payable: Money,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build the full installment schedule.
pub fn calculate_schedule(
    input: &ScheduleInput,
    config: &EngineConfig,
) -> VehicleCreditResult<ComputationOutput<ScheduleOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_schedule_input(input)?;

    let totals = schedule_totals(input, config)?;
    let rows = match input.interest_type {
        InterestType::Fixed => fixed_rows(input, &totals, config)?,
        InterestType::Compound => compound_rows(input, &totals, config),
    };

    let last_payment = rows.last().map(|r| r.payment).unwrap_or(Decimal::ZERO);
    if last_payment != totals.payment_amount {
        warnings.push(format!(
            "Final installment adjusted from {} to {} to absorb rounding",
            totals.payment_amount, last_payment
        ));
    }

    log::debug!(
        "schedule: {:?} {} x {} at {}% -> payment {}",
        input.interest_type,
        input.financed_amount,
        input.installments,
        input.annual_rate,
        totals.payment_amount
    );

    let output = ScheduleOutput {
        payment_amount: totals.payment_amount,
        total_interest: rows.iter().map(|r| r.interest).sum(),
        total_payable: rows.iter().map(|r| r.payment).sum(),
        rows,
    };

    let methodology = match input.interest_type {
        InterestType::Fixed => "Installment Schedule (simple interest, level payments)",
        InterestType::Compound => "Installment Schedule (compound interest on declining balance)",
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        methodology,
        &serde_json::json!({
            "financed_amount": input.financed_amount.to_string(),
            "installments": input.installments,
            "annual_rate_pct": input.annual_rate.to_string(),
            "money_scale": config.money_scale,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Level payment, total interest and total payable for the given terms.
pub fn schedule_totals(
    input: &ScheduleInput,
    config: &EngineConfig,
) -> VehicleCreditResult<ScheduleTotals> {
    validate_schedule_input(input)?;

    let n = Decimal::from(input.installments);

    let total_payable = match input.interest_type {
        InterestType::Fixed => input
            .financed_amount
            .checked_add(fixed_interest(input)?)
            .ok_or_else(|| overflow("financed_amount"))?,
        InterestType::Compound => {
            let monthly_rate = input.annual_rate / PERCENT / MONTHS_PER_YEAR;
            let growth = (Decimal::ONE + monthly_rate)
                .checked_powu(u64::from(input.installments))
                .ok_or_else(|| {
                    VehicleCreditError::invalid(
                        "installments",
                        "Compound growth overflows for this rate and term",
                    )
                })?;
            input
                .financed_amount
                .checked_mul(growth)
                .ok_or_else(|| overflow("financed_amount"))?
        }
    };

    let payment_amount = config.round_money(total_payable / n);
    let total_interest = config.round_money(total_payable - input.financed_amount);

    Ok(ScheduleTotals {
        payment_amount,
        total_interest,
        total_payable: config.round_money(total_payable),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn overflow(field: &str) -> VehicleCreditError {
    VehicleCreditError::invalid(field, "Amount too large to schedule")
}

fn validate_schedule_input(input: &ScheduleInput) -> VehicleCreditResult<()> {
    if input.financed_amount <= Decimal::ZERO {
        return Err(VehicleCreditError::invalid(
            "financed_amount",
            "Financed amount must be positive",
        ));
    }
    if input.installments == 0 {
        return Err(VehicleCreditError::invalid(
            "installments",
            "At least one installment is required",
        ));
    }
    if input.annual_rate < Decimal::ZERO {
        return Err(VehicleCreditError::invalid(
            "annual_rate",
            "Interest rate cannot be negative",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Simple interest over the whole term: rate x (n / 12) years.
fn fixed_interest(input: &ScheduleInput) -> VehicleCreditResult<Money> {
    let years = Decimal::from(input.installments) / MONTHS_PER_YEAR;
    input
        .financed_amount
        .checked_mul(input.annual_rate / PERCENT)
        .and_then(|v| v.checked_mul(years))
        .ok_or_else(|| overflow("financed_amount"))
}

fn fixed_rows(
    input: &ScheduleInput,
    totals: &ScheduleTotals,
    config: &EngineConfig,
) -> VehicleCreditResult<Vec<ScheduleRow>> {
    let n = Decimal::from(input.installments);
    let interest = config.round_money(fixed_interest(input)? / n);

    let mut balance = input.financed_amount;
    let mut rows = Vec::with_capacity(input.installments as usize);

    for number in 1..=input.installments {
        let row = if number == input.installments {
            final_row(number, balance, interest)
        } else {
            let principal = (totals.payment_amount - interest).min(balance);
            balance -= principal;
            ScheduleRow {
                number,
                payment: principal + interest,
                principal,
                interest,
                remaining_balance: balance,
            }
        };
        rows.push(row);
    }

    Ok(rows)
}

fn compound_rows(
    input: &ScheduleInput,
    totals: &ScheduleTotals,
    config: &EngineConfig,
) -> Vec<ScheduleRow> {
    let monthly_rate = input.annual_rate / PERCENT / MONTHS_PER_YEAR;
    let payment = totals.payment_amount;

    let mut balance = input.financed_amount;
    let mut rows = Vec::with_capacity(input.installments as usize);

    for number in 1..=input.installments {
        let mut interest = config.round_money(balance * monthly_rate);
        if number == input.installments {
            // Level payment overshoots the declining-balance interest, so the
            // tail of the schedule carries the difference as interest.
            if payment - interest > balance {
                interest = payment - balance;
            }
            rows.push(final_row(number, balance, interest));
            break;
        }

        let mut principal = payment - interest;
        if principal > balance {
            principal = balance;
            interest = payment - principal;
        }
        balance -= principal;
        rows.push(ScheduleRow {
            number,
            payment,
            principal,
            interest,
            remaining_balance: balance,
        });
    }

    rows
}

/// Last row: principal is whatever balance is left, so the schedule closes at zero.
fn final_row(number: u32, balance: Money, interest: Money) -> ScheduleRow {
    ScheduleRow {
        number,
        payment: balance + interest,
        principal: balance,
        interest,
        remaining_balance: Decimal::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fixed_input() -> ScheduleInput {
        ScheduleInput {
            financed_amount: dec!(9_000_000),
            installments: 24,
            annual_rate: dec!(12),
            interest_type: InterestType::Fixed,
        }
    }

    // -----------------------------------------------------------------------
    // 1. Reference scenario: 9M over 24 installments at 12% simple
    // -----------------------------------------------------------------------
    #[test]
    fn test_fixed_reference_scenario() {
        let result = calculate_schedule(&fixed_input(), &EngineConfig::default()).unwrap();
        let out = &result.result;

        assert_eq!(out.total_interest, dec!(2_160_000));
        assert_eq!(out.payment_amount, dec!(465_000));
        assert!(out.rows.iter().all(|r| r.interest == dec!(90_000)));
        assert!(out.rows.iter().all(|r| r.payment == dec!(465_000)));
        assert_eq!(out.rows[0].remaining_balance, dec!(8_625_000));
        assert!(result.warnings.is_empty());
    }

    // -----------------------------------------------------------------------
    // 2. Rows numbered contiguously and length matches
    // -----------------------------------------------------------------------
    #[test]
    fn test_rows_numbered_one_to_n() {
        let mut input = fixed_input();
        input.installments = 7;
        let out = calculate_schedule(&input, &EngineConfig::default()).unwrap().result;
        assert_eq!(out.rows.len(), 7);
        for (idx, row) in out.rows.iter().enumerate() {
            assert_eq!(row.number, idx as u32 + 1);
        }
    }

    // -----------------------------------------------------------------------
    // 3. Fixed: principal sums to financed amount even with awkward division
    // -----------------------------------------------------------------------
    #[test]
    fn test_fixed_principal_sum_exact() {
        let input = ScheduleInput {
            financed_amount: dec!(1_000_000),
            installments: 7,
            annual_rate: dec!(17.5),
            interest_type: InterestType::Fixed,
        };
        let result = calculate_schedule(&input, &EngineConfig::default()).unwrap();
        let out = &result.result;

        assert_eq!(out.total_principal(), dec!(1_000_000));
        assert_eq!(out.rows.last().unwrap().remaining_balance, Decimal::ZERO);
        let uniform = out.rows[0].interest;
        assert!(out.rows.iter().all(|r| r.interest == uniform));
    }

    // -----------------------------------------------------------------------
    // 4. Compound: closes at exactly zero
    // -----------------------------------------------------------------------
    #[test]
    fn test_compound_closes_at_zero() {
        for (amount, n, rate) in [
            (dec!(1000), 12u32, dec!(12)),
            (dec!(5_500_000), 36, dec!(24)),
            (dec!(750_000), 52, dec!(9.9)),
            (dec!(1234.56), 1, dec!(30)),
        ] {
            let input = ScheduleInput {
                financed_amount: amount,
                installments: n,
                annual_rate: rate,
                interest_type: InterestType::Compound,
            };
            let out = calculate_schedule(&input, &EngineConfig::default()).unwrap().result;
            assert_eq!(out.rows.len(), n as usize);
            assert_eq!(out.rows.last().unwrap().remaining_balance, Decimal::ZERO);
            assert_eq!(out.total_principal(), amount);
            assert!(out.rows.iter().all(|r| r.remaining_balance >= Decimal::ZERO));
        }
    }

    // -----------------------------------------------------------------------
    // 5. Compound total payable follows (1 + m)^n
    // -----------------------------------------------------------------------
    #[test]
    fn test_compound_totals() {
        let input = ScheduleInput {
            financed_amount: dec!(1000),
            installments: 12,
            annual_rate: dec!(12),
            interest_type: InterestType::Compound,
        };
        let totals = schedule_totals(&input, &EngineConfig::default()).unwrap();
        // 1000 * 1.01^12 = 1126.825...
        assert_eq!(totals.total_payable, dec!(1126.83));
        assert_eq!(totals.payment_amount, dec!(93.90));
        assert_eq!(totals.total_interest, dec!(126.83));

        let out = calculate_schedule(&input, &EngineConfig::default()).unwrap().result;
        // First row: interest = 1000 * 0.01
        assert_eq!(out.rows[0].interest, dec!(10.00));
        assert_eq!(out.rows[0].principal, dec!(83.90));
    }

    // -----------------------------------------------------------------------
    // 6. Zero rate is straight-line principal
    // -----------------------------------------------------------------------
    #[test]
    fn test_zero_rate() {
        let input = ScheduleInput {
            financed_amount: dec!(1200),
            installments: 12,
            annual_rate: Decimal::ZERO,
            interest_type: InterestType::Compound,
        };
        let out = calculate_schedule(&input, &EngineConfig::default()).unwrap().result;
        assert!(out.rows.iter().all(|r| r.interest.is_zero()));
        assert!(out.rows.iter().all(|r| r.payment == dec!(100)));
    }

    // -----------------------------------------------------------------------
    // 7. Validation
    // -----------------------------------------------------------------------
    #[test]
    fn test_validation_rejects_bad_terms() {
        let cases = [
            (dec!(0), 12u32, dec!(10), "financed_amount"),
            (dec!(-5), 12, dec!(10), "financed_amount"),
            (dec!(1000), 0, dec!(10), "installments"),
            (dec!(1000), 12, dec!(-1), "annual_rate"),
        ];
        for (amount, n, rate, expected_field) in cases {
            let input = ScheduleInput {
                financed_amount: amount,
                installments: n,
                annual_rate: rate,
                interest_type: InterestType::Fixed,
            };
            match calculate_schedule(&input, &EngineConfig::default()).unwrap_err() {
                VehicleCreditError::InvalidInput { field, .. } => assert_eq!(field, expected_field),
                other => panic!("Expected InvalidInput, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_oversized_amount_rejected_instead_of_overflowing() {
        for interest_type in [InterestType::Fixed, InterestType::Compound] {
            let input = ScheduleInput {
                financed_amount: Decimal::MAX,
                installments: 240,
                annual_rate: dec!(12),
                interest_type,
            };
            match calculate_schedule(&input, &EngineConfig::default()).unwrap_err() {
                VehicleCreditError::InvalidInput { field, .. } => {
                    assert_eq!(field, "financed_amount")
                }
                other => panic!("Expected InvalidInput, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_metadata_populated() {
        let result = calculate_schedule(&fixed_input(), &EngineConfig::default()).unwrap();
        assert!(result.methodology.contains("Installment Schedule"));
        assert_eq!(result.metadata.precision, "rust_decimal_128bit");
    }
}
