use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vehicle_credit_core::config::EngineConfig;
use vehicle_credit_core::loan::{Loan, LoanTerms};
use vehicle_credit_core::payments::{delete_payment, record_payment, PaymentInput};
use vehicle_credit_core::schedule::{calculate_schedule, ScheduleInput};
use vehicle_credit_core::{InterestType, LoanStatus, PaymentFrequency, PaymentMethod, VehicleCreditError};
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ===========================================================================
// Amortization tests
// ===========================================================================

#[test]
fn test_fixed_schedule_reference_scenario() {
    let input = ScheduleInput {
        financed_amount: dec!(9_000_000),
        installments: 24,
        annual_rate: dec!(12),
        interest_type: InterestType::Fixed,
    };
    let out = calculate_schedule(&input, &EngineConfig::default()).unwrap().result;

    // Interest = 9M x 12% x 2 years = 2.16M, spread evenly over 24 months
    assert_eq!(out.total_interest, dec!(2_160_000));
    assert_eq!(out.payment_amount, dec!(465_000));
    assert_eq!(out.rows.len(), 24);
    assert!(out.rows.iter().all(|r| r.interest == dec!(90_000)));
    assert_eq!(out.total_principal(), dec!(9_000_000));
    assert_eq!(out.rows.last().unwrap().remaining_balance, Decimal::ZERO);
}

#[test]
fn test_fixed_schedule_uneven_division_corrected_on_last_row() {
    let input = ScheduleInput {
        financed_amount: dec!(1_000_000),
        installments: 7,
        annual_rate: dec!(10),
        interest_type: InterestType::Fixed,
    };
    let out = calculate_schedule(&input, &EngineConfig::default()).unwrap().result;

    let numbers: Vec<u32> = out.rows.iter().map(|r| r.number).collect();
    assert_eq!(numbers, (1..=7).collect::<Vec<_>>());
    assert!((out.total_principal() - dec!(1_000_000)).abs() <= dec!(0.01));
}

#[test]
fn test_compound_schedule_closes_at_zero() {
    let input = ScheduleInput {
        financed_amount: dec!(5_000_000),
        installments: 36,
        annual_rate: dec!(18),
        interest_type: InterestType::Compound,
    };
    let out = calculate_schedule(&input, &EngineConfig::default()).unwrap().result;

    assert_eq!(out.rows.len(), 36);
    assert_eq!(out.rows.last().unwrap().remaining_balance, Decimal::ZERO);
    // First period: 5M x 18% / 12
    assert_eq!(out.rows[0].interest, dec!(75_000));
    assert_eq!(out.total_principal(), dec!(5_000_000));
    assert_eq!(
        out.total_payable,
        out.rows.iter().map(|r| r.payment).sum::<Decimal>()
    );
}

#[test]
fn test_zero_installments_rejected() {
    let input = ScheduleInput {
        financed_amount: dec!(1_000),
        installments: 0,
        annual_rate: dec!(12),
        interest_type: InterestType::Fixed,
    };
    match calculate_schedule(&input, &EngineConfig::default()).unwrap_err() {
        VehicleCreditError::InvalidInput { field, .. } => assert_eq!(field, "installments"),
        other => panic!("Expected InvalidInput, got {:?}", other),
    }
}

// ===========================================================================
// Payment lifecycle tests
// ===========================================================================

fn weekly_terms(installments: u32) -> LoanTerms {
    LoanTerms {
        store_id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        vehicle_id: Uuid::new_v4(),
        vehicle_type: "motorcycle".into(),
        principal: dec!(2_000_000),
        down_payment: dec!(200_000),
        annual_rate: dec!(24),
        interest_type: InterestType::Fixed,
        installments,
        frequency: PaymentFrequency::Weekly,
        start_date: date(2024, 3, 4),
    }
}

fn pay(loan: &Loan, on: NaiveDate) -> PaymentInput {
    PaymentInput {
        amount: loan.payment_amount,
        fee: Decimal::ZERO,
        method: PaymentMethod::Cash,
        payment_date: on,
        notes: String::new(),
        attachment: None,
        created_by: None,
    }
}

#[test]
fn test_pay_off_weekly_loan() {
    let mut loan = Loan::open(&weekly_terms(4), &EngineConfig::default()).unwrap();

    let mut due_dates = Vec::new();
    for week in 1..=4 {
        let on = date(2024, 3, 4) + chrono::Duration::days(7 * week);
        let last = loan.debt_remaining;
        let mut input = pay(&loan, on);
        input.amount = loan.payment_amount.min(last);
        let inst = record_payment(&mut loan, &input).unwrap();
        assert!(inst.late_payment_date.is_none() && inst.advance_payment_date.is_none());
        due_dates.push(inst.due_date);
        assert!(loan.holds_invariants());
    }

    assert_eq!(due_dates[0], date(2024, 3, 11));
    assert_eq!(due_dates[3], date(2024, 4, 1));
    assert_eq!(loan.status, LoanStatus::Completed);
    assert_eq!(loan.remaining_installments, 0);

    // A fifth payment has nothing left to settle
    let extra = pay(&loan, date(2024, 4, 8));
    assert!(matches!(
        record_payment(&mut loan, &extra),
        Err(VehicleCreditError::Overpayment { .. })
    ));
}

#[test]
fn test_late_then_advance_classification() {
    let mut loan = Loan::open(&weekly_terms(10), &EngineConfig::default()).unwrap();

    let late_input = pay(&loan, date(2024, 3, 14));
    let late = record_payment(&mut loan, &late_input).unwrap();
    assert_eq!(late.late_payment_date, Some(date(2024, 3, 11)));
    assert!(late.advance_payment_date.is_none());

    let early_input = pay(&loan, date(2024, 3, 15));
    let early = record_payment(&mut loan, &early_input).unwrap();
    assert_eq!(early.due_date, date(2024, 3, 18));
    assert_eq!(early.advance_payment_date, Some(date(2024, 3, 15)));
    assert!(early.late_payment_date.is_none());
}

#[test]
fn test_delete_restores_completed_loan() {
    let mut loan = Loan::open(&weekly_terms(1), &EngineConfig::default()).unwrap();
    let before = loan.clone();

    let inst_input = pay(&loan, date(2024, 3, 11));
    let inst = record_payment(&mut loan, &inst_input).unwrap();
    assert_eq!(loan.status, LoanStatus::Completed);

    delete_payment(&mut loan, &inst).unwrap();
    assert_eq!(loan, before);
}
