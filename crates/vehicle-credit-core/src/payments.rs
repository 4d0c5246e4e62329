//! Payment recording and deletion against a loan aggregate.
//!
//! `record_payment` and `delete_payment` are exact inverses on the four loan
//! aggregates (paid count, remaining count, total paid, debt remaining) and on
//! the COMPLETED status they may toggle.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VehicleCreditError;
use crate::loan::{Installment, Loan};
use crate::types::{LoanStatus, Money, PaymentMethod, PaymentTiming};
use crate::VehicleCreditResult;

/// A payment as captured at the counter, before it is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInput {
    pub amount: Money,
    #[serde(default)]
    pub fee: Money,
    pub method: PaymentMethod,
    pub payment_date: NaiveDate,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub attachment: Option<String>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

/// Outcome of comparing a payment date to its due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingClassification {
    pub timing: PaymentTiming,
    pub late_payment_date: Option<NaiveDate>,
    pub advance_payment_date: Option<NaiveDate>,
}

/// Classify a payment made on `paid_on` against the installment due on `due`.
pub fn classify_timing(due: NaiveDate, paid_on: NaiveDate) -> TimingClassification {
    if paid_on > due {
        TimingClassification {
            timing: PaymentTiming::Late,
            late_payment_date: Some(due),
            advance_payment_date: None,
        }
    } else if paid_on < due {
        TimingClassification {
            timing: PaymentTiming::Advance,
            late_payment_date: None,
            advance_payment_date: Some(paid_on),
        }
    } else {
        TimingClassification {
            timing: PaymentTiming::OnTime,
            late_payment_date: None,
            advance_payment_date: None,
        }
    }
}

pub fn timing_of(installment: &Installment) -> PaymentTiming {
    if installment.is_late() {
        PaymentTiming::Late
    } else if installment.is_advance() {
        PaymentTiming::Advance
    } else {
        PaymentTiming::OnTime
    }
}

/// Display offset in days relative to `today`: positive days overdue for late
/// payments, negative days ahead for advance payments, zero when on time.
pub fn day_offset(installment: &Installment, today: NaiveDate) -> i64 {
    if let Some(due) = installment.late_payment_date {
        (today - due).num_days()
    } else if let Some(advance) = installment.advance_payment_date {
        -(advance - today).num_days().abs()
    } else {
        0
    }
}

/// Apply a payment to the next unpaid position of `loan`.
pub fn record_payment(loan: &mut Loan, input: &PaymentInput) -> VehicleCreditResult<Installment> {
    validate_payment_input(input)?;

    if loan.remaining_installments == 0 {
        return Err(VehicleCreditError::Overpayment { loan_id: loan.id });
    }
    if input.amount > loan.debt_remaining {
        return Err(VehicleCreditError::ExceedsDebt {
            loan_id: loan.id,
            amount: input.amount,
            debt_remaining: loan.debt_remaining,
        });
    }
    loan.ensure_active()?;

    let sequence = loan.next_position();
    let due_date = loan.due_date_for(sequence)?;
    let classification = classify_timing(due_date, input.payment_date);

    loan.paid_positions.insert(sequence);
    loan.paid_installments += 1;
    loan.remaining_installments -= 1;
    loan.total_paid += input.amount;
    loan.debt_remaining -= input.amount;
    if loan.remaining_installments == 0 {
        loan.status = LoanStatus::Completed;
    }

    let installment = Installment {
        id: Uuid::new_v4(),
        loan_id: loan.id,
        store_id: loan.store_id,
        sequence,
        amount: input.amount,
        fee: input.fee,
        due_date,
        payment_date: input.payment_date,
        late_payment_date: classification.late_payment_date,
        advance_payment_date: classification.advance_payment_date,
        method: input.method,
        notes: input.notes.clone(),
        attachment: input.attachment.clone(),
        created_by: input.created_by,
        closing_id: None,
        archived: false,
        paid_installments_after: loan.paid_installments,
        remaining_installments_after: loan.remaining_installments,
        debt_remaining_after: loan.debt_remaining,
    };

    log::debug!(
        "loan {}: installment {} paid {:?} ({} remaining)",
        loan.id,
        sequence,
        classification.timing,
        loan.remaining_installments
    );

    Ok(installment)
}

/// Reverse a previously recorded payment.
pub fn delete_payment(loan: &mut Loan, installment: &Installment) -> VehicleCreditResult<()> {
    if installment.loan_id != loan.id {
        return Err(VehicleCreditError::not_found("installment", installment.id));
    }
    if installment.is_consumed() {
        return Err(VehicleCreditError::AlreadyClosed {
            installment_ids: vec![installment.id],
        });
    }
    if loan.archived {
        return Err(VehicleCreditError::InactiveLoan {
            loan_id: loan.id,
            status: loan.status,
        });
    }
    if !loan.paid_positions.remove(&installment.sequence) {
        return Err(VehicleCreditError::not_found("installment", installment.id));
    }

    loan.paid_installments -= 1;
    loan.remaining_installments += 1;
    loan.total_paid -= installment.amount;
    loan.debt_remaining += installment.amount;
    if loan.status == LoanStatus::Completed {
        loan.status = LoanStatus::Active;
    }

    log::debug!(
        "loan {}: payment {} for installment {} reversed",
        loan.id,
        installment.id,
        installment.sequence
    );

    Ok(())
}

fn validate_payment_input(input: &PaymentInput) -> VehicleCreditResult<()> {
    if input.amount <= Decimal::ZERO {
        return Err(VehicleCreditError::invalid(
            "amount",
            "Payment amount must be positive",
        ));
    }
    if input.fee < Decimal::ZERO {
        return Err(VehicleCreditError::invalid("fee", "Fee cannot be negative"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::loan::tests::sample_terms;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn open_loan() -> Loan {
        Loan::open(&sample_terms(), &EngineConfig::default()).unwrap()
    }

    fn cash(amount: Money, on: NaiveDate) -> PaymentInput {
        PaymentInput {
            amount,
            fee: dec!(20_000),
            method: PaymentMethod::Cash,
            payment_date: on,
            notes: String::new(),
            attachment: None,
            created_by: None,
        }
    }

    // -----------------------------------------------------------------------
    // Timing classification
    // -----------------------------------------------------------------------
    #[test]
    fn test_late_payment_keeps_due_date() {
        let mut loan = open_loan();
        // First due date is 2024-02-15
        let inst = record_payment(&mut loan, &cash(dec!(465_000), date(2024, 2, 20))).unwrap();

        assert!(inst.is_late());
        assert_eq!(inst.late_payment_date, Some(date(2024, 2, 15)));
        assert_eq!(inst.advance_payment_date, None);
        assert_eq!(timing_of(&inst), PaymentTiming::Late);
    }

    #[test]
    fn test_advance_payment_keeps_payment_date() {
        let mut loan = open_loan();
        let inst = record_payment(&mut loan, &cash(dec!(465_000), date(2024, 2, 1))).unwrap();

        assert!(!inst.is_late());
        assert_eq!(inst.advance_payment_date, Some(date(2024, 2, 1)));
        assert_eq!(inst.late_payment_date, None);
    }

    #[test]
    fn test_on_time_payment_sets_neither() {
        let mut loan = open_loan();
        let inst = record_payment(&mut loan, &cash(dec!(465_000), date(2024, 2, 15))).unwrap();
        assert_eq!(timing_of(&inst), PaymentTiming::OnTime);
        assert_eq!(day_offset(&inst, date(2024, 3, 1)), 0);
    }

    #[test]
    fn test_day_offsets() {
        let mut loan = open_loan();
        let late = record_payment(&mut loan, &cash(dec!(465_000), date(2024, 2, 20))).unwrap();
        assert_eq!(day_offset(&late, date(2024, 2, 25)), 10);

        // Second due date 2024-03-15, paid on 2024-03-05
        let early = record_payment(&mut loan, &cash(dec!(465_000), date(2024, 3, 5))).unwrap();
        assert_eq!(early.sequence, 2);
        assert_eq!(day_offset(&early, date(2024, 3, 8)), -3);
    }

    // -----------------------------------------------------------------------
    // Aggregates
    // -----------------------------------------------------------------------
    #[test]
    fn test_record_updates_aggregates() {
        let mut loan = open_loan();
        record_payment(&mut loan, &cash(dec!(465_000), date(2024, 2, 15))).unwrap();

        assert_eq!(loan.paid_installments, 1);
        assert_eq!(loan.remaining_installments, 23);
        assert_eq!(loan.total_paid, dec!(465_000));
        assert_eq!(loan.debt_remaining, dec!(10_695_000));
        assert!(loan.holds_invariants());
    }

    #[test]
    fn test_record_then_delete_restores_loan() {
        let mut loan = open_loan();
        record_payment(&mut loan, &cash(dec!(465_000), date(2024, 2, 15))).unwrap();
        let before = loan.clone();

        let inst = record_payment(&mut loan, &cash(dec!(300_000), date(2024, 3, 20))).unwrap();
        delete_payment(&mut loan, &inst).unwrap();

        assert_eq!(loan, before);
    }

    #[test]
    fn test_final_payment_completes_and_delete_reopens() {
        let mut terms = sample_terms();
        terms.installments = 2;
        let mut loan = Loan::open(&terms, &EngineConfig::default()).unwrap();
        let payment = loan.payment_amount;

        record_payment(&mut loan, &cash(payment, date(2024, 2, 15))).unwrap();
        let before_last = loan.clone();
        let last = record_payment(&mut loan, &cash(payment, date(2024, 3, 15))).unwrap();
        assert_eq!(loan.status, LoanStatus::Completed);
        assert_eq!(loan.debt_remaining, Decimal::ZERO);

        delete_payment(&mut loan, &last).unwrap();
        assert_eq!(loan, before_last);
        assert_eq!(loan.status, LoanStatus::Active);
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------
    #[test]
    fn test_overpayment_rejected_when_nothing_remains() {
        let mut terms = sample_terms();
        terms.installments = 1;
        let mut loan = Loan::open(&terms, &EngineConfig::default()).unwrap();
        let payment = loan.payment_amount;
        record_payment(&mut loan, &cash(payment, date(2024, 2, 15))).unwrap();

        let err = record_payment(&mut loan, &cash(dec!(1), date(2024, 3, 15))).unwrap_err();
        assert!(matches!(err, VehicleCreditError::Overpayment { loan_id } if loan_id == loan.id));
    }

    #[test]
    fn test_amount_above_debt_rejected() {
        let mut loan = open_loan();
        let err = record_payment(&mut loan, &cash(dec!(20_000_000), date(2024, 2, 15))).unwrap_err();
        match err {
            VehicleCreditError::ExceedsDebt {
                amount,
                debt_remaining,
                ..
            } => {
                assert_eq!(amount, dec!(20_000_000));
                assert_eq!(debt_remaining, dec!(11_160_000));
            }
            other => panic!("Expected ExceedsDebt, got {:?}", other),
        }
        assert_eq!(loan.paid_installments, 0);
        assert!(loan.paid_positions.is_empty());
    }

    #[test]
    fn test_rounded_final_installment_settles_residual_debt() {
        let mut terms = sample_terms();
        terms.principal = dec!(1_000_000);
        terms.down_payment = Decimal::ZERO;
        terms.installments = 6;
        let mut loan = Loan::open(&terms, &EngineConfig::default()).unwrap();
        assert_eq!(loan.payment_amount, dec!(176_666.67));

        for month in 2..=6 {
            let level = loan.next_amount_due();
            assert_eq!(level, dec!(176_666.67));
            record_payment(&mut loan, &cash(level, date(2024, month, 15))).unwrap();
        }
        assert_eq!(loan.remaining_installments, 1);
        assert_eq!(loan.next_amount_due(), dec!(176_666.65));

        let level = cash(loan.payment_amount, date(2024, 7, 15));
        let err = record_payment(&mut loan, &level).unwrap_err();
        assert!(matches!(err, VehicleCreditError::ExceedsDebt { .. }));

        let residual = cash(loan.next_amount_due(), date(2024, 7, 15));
        let last = record_payment(&mut loan, &residual).unwrap();
        assert_eq!(last.sequence, 6);
        assert_eq!(loan.debt_remaining, Decimal::ZERO);
        assert_eq!(loan.status, LoanStatus::Completed);
        assert!(loan.holds_invariants());
    }

    #[test]
    fn test_installment_snapshots_loan_standing() {
        let mut loan = open_loan();
        let first = record_payment(&mut loan, &cash(dec!(465_000), date(2024, 2, 15))).unwrap();
        record_payment(&mut loan, &cash(dec!(465_000), date(2024, 3, 15))).unwrap();

        assert_eq!(first.paid_installments_after, 1);
        assert_eq!(first.remaining_installments_after, 23);
        assert_eq!(first.debt_remaining_after, dec!(10_695_000));
        assert_eq!(loan.paid_installments, 2);
    }

    #[test]
    fn test_defaulted_loan_rejects_payment() {
        let mut loan = open_loan();
        loan.status = LoanStatus::Defaulted;
        let err = record_payment(&mut loan, &cash(dec!(465_000), date(2024, 2, 15))).unwrap_err();
        assert!(matches!(
            err,
            VehicleCreditError::InactiveLoan { status: LoanStatus::Defaulted, .. }
        ));
    }

    #[test]
    fn test_delete_consumed_installment_rejected() {
        let mut loan = open_loan();
        let mut inst = record_payment(&mut loan, &cash(dec!(465_000), date(2024, 2, 15))).unwrap();
        inst.closing_id = Some(Uuid::new_v4());

        let err = delete_payment(&mut loan, &inst).unwrap_err();
        assert!(matches!(err, VehicleCreditError::AlreadyClosed { .. }));
        assert_eq!(loan.paid_installments, 1);
    }

    #[test]
    fn test_delete_foreign_installment_not_found() {
        let mut loan = open_loan();
        let mut other = open_loan();
        let inst = record_payment(&mut other, &cash(dec!(465_000), date(2024, 2, 15))).unwrap();

        let err = delete_payment(&mut loan, &inst).unwrap_err();
        assert!(matches!(err, VehicleCreditError::NotFound { .. }));
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        let mut loan = open_loan();
        match record_payment(&mut loan, &cash(Decimal::ZERO, date(2024, 2, 15))).unwrap_err() {
            VehicleCreditError::InvalidInput { field, .. } => assert_eq!(field, "amount"),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }
}
