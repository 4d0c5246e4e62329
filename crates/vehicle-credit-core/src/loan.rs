//! Loan aggregate and its installment records.
//!
//! A `Loan` carries the running aggregates (paid / remaining counts, totals,
//! status). Those fields change only through the payment processor and the
//! schedule adjuster; nothing else writes them.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::VehicleCreditError;
use crate::schedule::{calculate_schedule, ScheduleInput};
use crate::types::{
    ClosingId, InstallmentId, InterestType, LoanId, LoanStatus, Money, PaymentFrequency,
    PaymentMethod, PercentRate, StoreId,
};
use crate::VehicleCreditResult;

/// Terms captured when a loan is originated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanTerms {
    pub store_id: StoreId,
    pub client_id: Uuid,
    pub vehicle_id: Uuid,
    /// Free-form vehicle category ("motorcycle", "car", ...), matched by
    /// store-wide news filters.
    pub vehicle_type: String,
    pub principal: Money,
    #[serde(default)]
    pub down_payment: Money,
    pub annual_rate: PercentRate,
    pub interest_type: InterestType,
    pub installments: u32,
    pub frequency: PaymentFrequency,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub store_id: StoreId,
    pub client_id: Uuid,
    pub vehicle_id: Uuid,
    pub vehicle_type: String,

    pub principal: Money,
    pub down_payment: Money,
    pub financed_amount: Money,
    pub annual_rate: PercentRate,
    pub interest_type: InterestType,
    pub frequency: PaymentFrequency,
    /// Level payment per installment.
    pub payment_amount: Money,
    pub total_interest: Money,

    /// Installments the client is currently obligated to pay
    /// (original count minus any waived by news events).
    pub installments: u32,
    /// Installment count at origination.
    pub original_installments: u32,
    pub paid_installments: u32,
    pub remaining_installments: u32,
    pub total_paid: Money,
    pub debt_remaining: Money,
    /// Debt forgiven by news events.
    pub waived_amount: Money,
    /// Schedule positions settled by recorded payments.
    #[serde(default)]
    pub paid_positions: BTreeSet<u32>,
    /// Schedule positions waived by news events.
    #[serde(default)]
    pub waived_positions: BTreeSet<u32>,

    pub status: LoanStatus,
    pub archived: bool,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Loan {
    /// Originate a loan: compute its schedule and initialise the aggregates.
    pub fn open(terms: &LoanTerms, config: &EngineConfig) -> VehicleCreditResult<Self> {
        if terms.principal <= Decimal::ZERO {
            return Err(VehicleCreditError::invalid(
                "principal",
                "Principal must be positive",
            ));
        }
        if terms.down_payment < Decimal::ZERO {
            return Err(VehicleCreditError::invalid(
                "down_payment",
                "Down payment cannot be negative",
            ));
        }
        if terms.down_payment >= terms.principal {
            return Err(VehicleCreditError::invalid(
                "down_payment",
                "Down payment must be less than the principal",
            ));
        }

        let financed_amount = terms.principal - terms.down_payment;
        let schedule = calculate_schedule(
            &ScheduleInput {
                financed_amount,
                installments: terms.installments,
                annual_rate: terms.annual_rate,
                interest_type: terms.interest_type,
            },
            config,
        )?
        .result;

        let end_date = terms.frequency.due_date(terms.start_date, terms.installments)?;

        Ok(Self {
            id: Uuid::new_v4(),
            store_id: terms.store_id,
            client_id: terms.client_id,
            vehicle_id: terms.vehicle_id,
            vehicle_type: terms.vehicle_type.clone(),
            principal: terms.principal,
            down_payment: terms.down_payment,
            financed_amount,
            annual_rate: terms.annual_rate,
            interest_type: terms.interest_type,
            frequency: terms.frequency,
            payment_amount: schedule.payment_amount,
            total_interest: schedule.total_interest,
            installments: terms.installments,
            original_installments: terms.installments,
            paid_installments: 0,
            remaining_installments: terms.installments,
            total_paid: Decimal::ZERO,
            debt_remaining: schedule.total_payable,
            waived_amount: Decimal::ZERO,
            paid_positions: BTreeSet::new(),
            waived_positions: BTreeSet::new(),
            status: LoanStatus::Active,
            archived: false,
            start_date: terms.start_date,
            end_date,
        })
    }

    pub fn waived_installments(&self) -> u32 {
        self.original_installments - self.installments
    }

    /// Positions neither paid nor waived, in due-date order.
    pub fn open_positions(&self) -> impl Iterator<Item = u32> + '_ {
        (1..=self.original_installments).filter(move |p| {
            !self.paid_positions.contains(p) && !self.waived_positions.contains(p)
        })
    }

    /// Schedule position (1-based) of the earliest open installment. Waived
    /// positions are skipped, which moves the remaining due dates forward.
    pub fn next_position(&self) -> u32 {
        self.open_positions()
            .next()
            .unwrap_or(self.original_installments + 1)
    }

    /// Amount that settles the next open position. The last one takes
    /// whatever debt is left, so schedule rounding closes at zero.
    pub fn next_amount_due(&self) -> Money {
        if self.remaining_installments <= 1 {
            self.debt_remaining
        } else {
            self.payment_amount.min(self.debt_remaining)
        }
    }

    pub fn due_date_for(&self, position: u32) -> VehicleCreditResult<NaiveDate> {
        self.frequency.due_date(self.start_date, position)
    }

    pub fn next_due_date(&self) -> VehicleCreditResult<NaiveDate> {
        self.due_date_for(self.next_position())
    }

    /// Reject operations on loans that are not ACTIVE or have been archived.
    pub fn ensure_active(&self) -> VehicleCreditResult<()> {
        if self.archived || self.status != LoanStatus::Active {
            return Err(VehicleCreditError::InactiveLoan {
                loan_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Count and money invariants of the aggregate.
    pub fn holds_invariants(&self) -> bool {
        let counts = self.paid_installments + self.remaining_installments == self.installments
            && self.installments <= self.original_installments
            && self.paid_positions.len() == self.paid_installments as usize
            && self.waived_positions.len() == self.waived_installments() as usize
            && self.paid_positions.is_disjoint(&self.waived_positions);
        let obligation = self.financed_amount + self.total_interest;
        let accounted = self.total_paid + self.debt_remaining + self.waived_amount;
        // One minor unit per installment covers rounding of the level payment.
        let tolerance = Decimal::new(1, 2) * Decimal::from(self.original_installments.max(1));
        counts && (accounted - obligation).abs() <= tolerance
    }
}

/// A recorded payment against a loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub loan_id: LoanId,
    pub store_id: StoreId,
    /// Schedule position this payment settled.
    pub sequence: u32,
    pub amount: Money,
    /// Ancillary fee collected with the payment (tracking device, etc.).
    pub fee: Money,
    pub due_date: NaiveDate,
    pub payment_date: NaiveDate,
    /// Original due date, kept only when the payment was late.
    pub late_payment_date: Option<NaiveDate>,
    /// Actual payment date, kept only when paid ahead of schedule.
    pub advance_payment_date: Option<NaiveDate>,
    pub method: PaymentMethod,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub attachment: Option<String>,
    pub created_by: Option<Uuid>,
    /// Closing that consumed this payment.
    #[serde(default)]
    pub closing_id: Option<ClosingId>,
    #[serde(default)]
    pub archived: bool,
    /// Loan standing right after this payment was applied.
    #[serde(default)]
    pub paid_installments_after: u32,
    #[serde(default)]
    pub remaining_installments_after: u32,
    #[serde(default)]
    pub debt_remaining_after: Money,
}

impl Installment {
    pub fn is_late(&self) -> bool {
        self.late_payment_date.is_some()
    }

    pub fn is_advance(&self) -> bool {
        self.advance_payment_date.is_some()
    }

    pub fn is_consumed(&self) -> bool {
        self.closing_id.is_some()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) fn sample_terms() -> LoanTerms {
        LoanTerms {
            store_id: Uuid::nil(),
            client_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            vehicle_type: "motorcycle".into(),
            principal: dec!(10_000_000),
            down_payment: dec!(1_000_000),
            annual_rate: dec!(12),
            interest_type: InterestType::Fixed,
            installments: 24,
            frequency: PaymentFrequency::Monthly,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        }
    }

    #[test]
    fn test_open_loan_aggregates() {
        let loan = Loan::open(&sample_terms(), &EngineConfig::default()).unwrap();

        assert_eq!(loan.financed_amount, dec!(9_000_000));
        assert_eq!(loan.payment_amount, dec!(465_000));
        assert_eq!(loan.total_interest, dec!(2_160_000));
        assert_eq!(loan.debt_remaining, dec!(11_160_000));
        assert_eq!(loan.remaining_installments, 24);
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.end_date, NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
        assert!(loan.holds_invariants());
    }

    #[test]
    fn test_next_due_date_starts_one_period_after_start() {
        let loan = Loan::open(&sample_terms(), &EngineConfig::default()).unwrap();
        assert_eq!(loan.next_position(), 1);
        assert_eq!(
            loan.next_due_date().unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 15).unwrap()
        );
    }

    #[test]
    fn test_next_position_fills_lowest_gap() {
        let mut loan = Loan::open(&sample_terms(), &EngineConfig::default()).unwrap();
        loan.waived_positions.insert(1);
        loan.paid_positions.extend([2, 3]);
        assert_eq!(loan.next_position(), 4);

        loan.waived_positions.clear();
        assert_eq!(loan.next_position(), 1);
        assert_eq!(loan.open_positions().take(2).collect::<Vec<_>>(), vec![1, 4]);
    }

    #[test]
    fn test_last_open_position_takes_remaining_debt() {
        let mut loan = Loan::open(&sample_terms(), &EngineConfig::default()).unwrap();
        assert_eq!(loan.next_amount_due(), dec!(465_000));

        loan.remaining_installments = 1;
        loan.debt_remaining = dec!(464_999.98);
        assert_eq!(loan.next_amount_due(), dec!(464_999.98));
    }

    #[test]
    fn test_down_payment_must_leave_something_to_finance() {
        let mut terms = sample_terms();
        terms.down_payment = terms.principal;
        match Loan::open(&terms, &EngineConfig::default()).unwrap_err() {
            VehicleCreditError::InvalidInput { field, .. } => assert_eq!(field, "down_payment"),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_archived_loan_is_not_active() {
        let mut loan = Loan::open(&sample_terms(), &EngineConfig::default()).unwrap();
        loan.archived = true;
        assert!(matches!(
            loan.ensure_active(),
            Err(VehicleCreditError::InactiveLoan { .. })
        ));
    }
}
