//! Incident ("news") handling: converts days of vehicle unavailability into
//! waived installments and applies them to the affected loans.
//!
//! The obligation is reduced: waived installments leave both the remaining
//! count and the obligated count, and their positions are skipped, so the
//! remaining due dates move forward while the final due date stays put. Every
//! application is recorded as a `NewsAdjustment` that can be reverted exactly.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::VehicleCreditError;
use crate::loan::Loan;
use crate::types::{
    with_metadata, ComputationOutput, LoanId, LoanStatus, Money, NewsId, PaymentFrequency, StoreId,
};
use crate::VehicleCreditResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NewsScope {
    LoanSpecific,
    StoreWide,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NewsCategory {
    Workshop,
    Accident,
    Theft,
    Holiday,
    #[default]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsEvent {
    pub id: NewsId,
    pub store_id: StoreId,
    pub scope: NewsScope,
    #[serde(default)]
    pub category: NewsCategory,
    /// Required for LOAN_SPECIFIC events.
    #[serde(default)]
    pub loan_id: Option<LoanId>,
    /// STORE_WIDE only; `None` matches every vehicle type.
    #[serde(default)]
    pub vehicle_type: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub active: bool,
    pub days_unavailable: u32,
    /// Manual value; ignored when `auto_calculate` is set.
    #[serde(default)]
    pub installments_to_subtract: u32,
    pub auto_calculate: bool,
    #[serde(default)]
    pub description: String,
}

/// Waiver applied to one loan by one news event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsAdjustment {
    pub news_id: NewsId,
    pub loan_id: LoanId,
    pub installments_waived: u32,
    /// Schedule positions released by the waiver.
    #[serde(default)]
    pub positions: Vec<u32>,
    pub amount_waived: Money,
    /// The waiver consumed the last remaining installment.
    pub completed_loan: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsImpact {
    pub news_id: NewsId,
    pub scope: NewsScope,
    pub loans_matched: usize,
    pub adjustments: Vec<NewsAdjustment>,
}

/// Number of installments an event removes from a loan paid at `frequency`.
pub fn installments_to_subtract(event: &NewsEvent, frequency: PaymentFrequency) -> u32 {
    if event.auto_calculate {
        subtract_for_days(event.days_unavailable, frequency)
    } else {
        event.installments_to_subtract
    }
}

/// ceil(days / period length)
pub fn subtract_for_days(days_unavailable: u32, frequency: PaymentFrequency) -> u32 {
    let period = frequency.period_days();
    days_unavailable.div_ceil(period)
}

pub fn validate_news_event(event: &NewsEvent) -> VehicleCreditResult<()> {
    if event.end_date < event.start_date {
        return Err(VehicleCreditError::invalid(
            "end_date",
            "End date cannot precede the start date",
        ));
    }
    if event.scope == NewsScope::LoanSpecific && event.loan_id.is_none() {
        return Err(VehicleCreditError::invalid(
            "loan_id",
            "Loan-specific news must reference a loan",
        ));
    }
    Ok(())
}

/// Whether a store-wide event reaches `loan`.
pub fn matches_store_wide(event: &NewsEvent, loan: &Loan) -> bool {
    loan.store_id == event.store_id
        && loan.status == LoanStatus::Active
        && !loan.archived
        && event
            .vehicle_type
            .as_deref()
            .map_or(true, |wanted| wanted.eq_ignore_ascii_case(&loan.vehicle_type))
}

/// Waive installments on a single loan.
pub fn adjust_loan(loan: &mut Loan, event: &NewsEvent) -> VehicleCreditResult<NewsAdjustment> {
    loan.ensure_active()?;

    let requested = installments_to_subtract(event, loan.frequency);
    let positions: Vec<u32> = loan.open_positions().take(requested as usize).collect();
    let waived = positions.len() as u32;
    let amount = (loan.payment_amount * Decimal::from(waived)).min(loan.debt_remaining);

    loan.waived_positions.extend(positions.iter().copied());
    loan.remaining_installments -= waived;
    loan.installments -= waived;
    loan.debt_remaining -= amount;
    loan.waived_amount += amount;

    let completed_loan = waived > 0 && loan.remaining_installments == 0;
    if completed_loan {
        loan.status = LoanStatus::Completed;
    }

    Ok(NewsAdjustment {
        news_id: event.id,
        loan_id: loan.id,
        installments_waived: waived,
        positions,
        amount_waived: amount,
        completed_loan,
    })
}

/// Exact inverse of `adjust_loan`.
pub fn revert_adjustment(loan: &mut Loan, adjustment: &NewsAdjustment) -> VehicleCreditResult<()> {
    if adjustment.loan_id != loan.id {
        return Err(VehicleCreditError::not_found("loan", adjustment.loan_id));
    }
    if loan.installments + adjustment.installments_waived > loan.original_installments
        || adjustment.positions.len() != adjustment.installments_waived as usize
        || !adjustment
            .positions
            .iter()
            .all(|p| loan.waived_positions.contains(p))
    {
        return Err(VehicleCreditError::invalid(
            "installments_waived",
            "Adjustment does not match the waivers recorded on the loan",
        ));
    }

    for position in &adjustment.positions {
        loan.waived_positions.remove(position);
    }
    loan.remaining_installments += adjustment.installments_waived;
    loan.installments += adjustment.installments_waived;
    loan.debt_remaining += adjustment.amount_waived;
    loan.waived_amount -= adjustment.amount_waived;
    // Covers loans completed by this waiver and by payments made after it.
    if loan.status == LoanStatus::Completed && loan.remaining_installments > 0 {
        loan.status = LoanStatus::Active;
    }
    Ok(())
}

/// Apply `event` to the loans it targets among `loans`.
///
/// LOAN_SPECIFIC events require the referenced loan to be present and ACTIVE.
/// STORE_WIDE events with no matching loan succeed without changes.
pub fn apply_news_event(
    loans: &mut [Loan],
    event: &NewsEvent,
) -> VehicleCreditResult<ComputationOutput<NewsImpact>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_news_event(event)?;

    let mut adjustments = Vec::new();
    let mut loans_matched = 0;

    if !event.active {
        warnings.push(format!("News {} is inactive; no loans adjusted", event.id));
    } else {
        match event.scope {
            NewsScope::LoanSpecific => {
                let loan_id = event
                    .loan_id
                    .ok_or_else(|| VehicleCreditError::invalid("loan_id", "Missing loan reference"))?;
                let loan = loans
                    .iter_mut()
                    .find(|l| l.id == loan_id)
                    .ok_or_else(|| VehicleCreditError::not_found("loan", loan_id))?;
                if event.vehicle_type.is_some() {
                    warnings.push("Vehicle type filter ignored for loan-specific news".into());
                }
                loans_matched = 1;
                adjustments.push(adjust_loan(loan, event)?);
            }
            NewsScope::StoreWide => {
                for loan in loans.iter_mut().filter(|l| matches_store_wide(event, l)) {
                    loans_matched += 1;
                    adjustments.push(adjust_loan(loan, event)?);
                }
                if loans_matched == 0 {
                    warnings.push("No active loans matched the store-wide news".into());
                }
            }
        }
    }

    adjustments.retain(|a| a.installments_waived > 0);

    log::debug!(
        "news {}: {} loans matched, {} adjusted",
        event.id,
        loans_matched,
        adjustments.len()
    );

    let output = NewsImpact {
        news_id: event.id,
        scope: event.scope,
        loans_matched,
        adjustments,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "News Adjustment (unavailable days converted to waived installments)",
        &serde_json::json!({
            "days_unavailable": event.days_unavailable,
            "auto_calculate": event.auto_calculate,
            "manual_installments": event.installments_to_subtract,
        }),
        warnings,
        elapsed,
        output,
    ))
}
