//! Periodic delinquency check.
//!
//! An ACTIVE loan with `missed_installments_for_default` or more unpaid due
//! dates strictly before the assessment date moves to DEFAULTED. Reinstatement
//! is an explicit ledger command.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::EngineConfig;
use crate::loan::Loan;
use crate::types::{with_metadata, ComputationOutput, LoanId, LoanStatus, Money};
use crate::VehicleCreditResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanDelinquency {
    pub loan_id: LoanId,
    pub missed_installments: u32,
    pub oldest_missed_due: Option<NaiveDate>,
    pub days_overdue: i64,
    pub amount_overdue: Money,
    pub status_before: LoanStatus,
    pub status_after: LoanStatus,
}

impl LoanDelinquency {
    pub fn newly_defaulted(&self) -> bool {
        self.status_before != LoanStatus::Defaulted && self.status_after == LoanStatus::Defaulted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelinquencyReport {
    pub as_of: NaiveDate,
    pub loans_assessed: usize,
    pub delinquent: Vec<LoanDelinquency>,
    pub newly_defaulted: usize,
}

/// Unpaid due dates of `loan` falling strictly before `as_of`, oldest first.
pub fn missed_due_dates(loan: &Loan, as_of: NaiveDate) -> VehicleCreditResult<Vec<NaiveDate>> {
    let mut missed = Vec::new();
    for position in loan.open_positions() {
        let due = loan.due_date_for(position)?;
        if due >= as_of {
            break;
        }
        missed.push(due);
    }
    Ok(missed)
}

/// Assess one loan, defaulting it when the threshold is reached.
pub fn assess_loan(
    loan: &mut Loan,
    as_of: NaiveDate,
    config: &EngineConfig,
) -> VehicleCreditResult<LoanDelinquency> {
    let missed = missed_due_dates(loan, as_of)?;
    let status_before = loan.status;
    let count = missed.len() as u32;

    if !loan.archived
        && loan.status == LoanStatus::Active
        && count >= config.missed_installments_for_default
    {
        loan.status = LoanStatus::Defaulted;
        log::info!(
            "loan {} defaulted: {} installments missed as of {}",
            loan.id,
            count,
            as_of
        );
    }

    let oldest = missed.first().copied();
    Ok(LoanDelinquency {
        loan_id: loan.id,
        missed_installments: count,
        oldest_missed_due: oldest,
        days_overdue: oldest.map_or(0, |due| (as_of - due).num_days()),
        amount_overdue: (loan.payment_amount * Money::from(count)).min(loan.debt_remaining),
        status_before,
        status_after: loan.status,
    })
}

/// Assess every non-archived, unfinished loan in `loans`.
pub fn assess_loans(
    loans: &mut [Loan],
    as_of: NaiveDate,
    config: &EngineConfig,
) -> VehicleCreditResult<ComputationOutput<DelinquencyReport>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let mut delinquent = Vec::new();
    let mut loans_assessed = 0;
    for loan in loans
        .iter_mut()
        .filter(|l| !l.archived && l.status != LoanStatus::Completed)
    {
        loans_assessed += 1;
        let assessment = assess_loan(loan, as_of, config)?;
        if assessment.missed_installments > 0 {
            delinquent.push(assessment);
        }
    }

    let newly_defaulted = delinquent.iter().filter(|d| d.newly_defaulted()).count();
    if newly_defaulted > 0 {
        warnings.push(format!("{} loan(s) moved to DEFAULTED", newly_defaulted));
    }

    let output = DelinquencyReport {
        as_of,
        loans_assessed,
        delinquent,
        newly_defaulted,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Delinquency Assessment (missed due dates against the default threshold)",
        &serde_json::json!({
            "as_of": as_of.to_string(),
            "missed_installments_for_default": config.missed_installments_for_default,
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::tests::sample_terms;
    use crate::payments::{record_payment, PaymentInput};
    use crate::types::PaymentMethod;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn open_loan() -> Loan {
        Loan::open(&sample_terms(), &EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_due_date_on_assessment_day_not_missed() {
        let loan = open_loan();
        // Due dates: Feb 15, Mar 15, Apr 15 ...
        assert_eq!(missed_due_dates(&loan, date(2024, 2, 15)).unwrap().len(), 0);
        assert_eq!(missed_due_dates(&loan, date(2024, 2, 16)).unwrap().len(), 1);
    }

    #[test]
    fn test_two_missed_stays_active() {
        let mut loan = open_loan();
        let assessment = assess_loan(&mut loan, date(2024, 4, 1), &EngineConfig::default()).unwrap();
        assert_eq!(assessment.missed_installments, 2);
        assert_eq!(assessment.days_overdue, 46);
        assert_eq!(assessment.amount_overdue, dec!(930_000));
        assert_eq!(loan.status, LoanStatus::Active);
    }

    #[test]
    fn test_three_missed_defaults() {
        let mut loan = open_loan();
        let assessment = assess_loan(&mut loan, date(2024, 4, 16), &EngineConfig::default()).unwrap();
        assert_eq!(assessment.missed_installments, 3);
        assert!(assessment.newly_defaulted());
        assert_eq!(loan.status, LoanStatus::Defaulted);
    }

    #[test]
    fn test_payment_moves_window() {
        let mut loan = open_loan();
        record_payment(
            &mut loan,
            &PaymentInput {
                amount: dec!(465_000),
                fee: dec!(0),
                method: PaymentMethod::Cash,
                payment_date: date(2024, 2, 15),
                notes: String::new(),
                attachment: None,
                created_by: None,
            },
        )
        .unwrap();

        let assessment = assess_loan(&mut loan, date(2024, 4, 16), &EngineConfig::default()).unwrap();
        assert_eq!(assessment.missed_installments, 2);
        assert_eq!(assessment.oldest_missed_due, Some(date(2024, 3, 15)));
        assert_eq!(loan.status, LoanStatus::Active);
    }

    #[test]
    fn test_assess_loans_skips_completed_and_archived() {
        let mut archived = open_loan();
        archived.archived = true;
        let mut completed = open_loan();
        completed.status = LoanStatus::Completed;
        let mut loans = vec![open_loan(), archived, completed];

        let result = assess_loans(&mut loans, date(2024, 6, 1), &EngineConfig::default()).unwrap();
        assert_eq!(result.result.loans_assessed, 1);
        assert_eq!(result.result.newly_defaulted, 1);
        assert_eq!(loans[1].status, LoanStatus::Active);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let config = EngineConfig {
            missed_installments_for_default: 5,
            ..Default::default()
        };
        let mut loan = open_loan();
        assess_loan(&mut loan, date(2024, 4, 16), &config).unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
    }
}
