//! Cash closing reconciliation.
//!
//! Compares the income of a batch of applied payments (less the period's
//! expenses) with the cash, card and transfer totals counted at the register,
//! and grades the difference against configured thresholds.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use uuid::Uuid;

use crate::config::{EngineConfig, ReconciliationThresholds};
use crate::error::VehicleCreditError;
use crate::loan::Installment;
use crate::types::{
    with_metadata, ClosingId, ComputationOutput, InstallmentId, Money, PaymentMethod, StoreId,
};
use crate::VehicleCreditResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    Balanced,
    MinorDifference,
    MajorDifference,
}

/// Amounts physically counted at closing time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclaredTotals {
    pub cash: Money,
    pub transfers: Money,
    pub cards: Money,
}

impl DeclaredTotals {
    pub fn total(&self) -> Money {
        self.cash + self.transfers + self.cards
    }
}

/// Expense record supplied by the store's expense book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub id: Uuid,
    pub store_id: StoreId,
    pub date: NaiveDate,
    pub category: String,
    pub amount: Money,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodBreakdown {
    pub method: PaymentMethod,
    pub amount: Money,
    pub fees: Money,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosingSummary {
    pub installment_count: usize,
    /// Sum of payment amounts (plus fees only when configured).
    pub total_income: Money,
    /// Ancillary fees, always reported on their own.
    pub total_fees: Money,
    pub total_expense: Money,
    pub balance: Money,
    pub declared_total: Money,
    pub difference: Money,
    pub status: ReconciliationStatus,
    /// False when no expense data was available and expenses were taken as 0.
    pub expenses_complete: bool,
    pub by_method: Vec<MethodBreakdown>,
}

/// A persisted closing. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashClosing {
    pub id: ClosingId,
    pub store_id: StoreId,
    pub date: NaiveDate,
    pub installment_ids: Vec<InstallmentId>,
    pub declared: DeclaredTotals,
    pub summary: ClosingSummary,
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Grade an absolute difference. Both bounds are inclusive.
pub fn classify_difference(
    difference: Money,
    thresholds: &ReconciliationThresholds,
) -> ReconciliationStatus {
    let difference = difference.abs();
    if difference <= thresholds.balanced_max {
        ReconciliationStatus::Balanced
    } else if difference <= thresholds.minor_max {
        ReconciliationStatus::MinorDifference
    } else {
        ReconciliationStatus::MajorDifference
    }
}

/// Reconcile `installments` against the declared totals.
///
/// `expenses` of `None` means the expense data could not be obtained: the
/// expense total is taken as zero and a data-completeness warning is raised.
pub fn summarize_closing(
    installments: &[Installment],
    expenses: Option<&[ExpenseRecord]>,
    declared: &DeclaredTotals,
    config: &EngineConfig,
) -> VehicleCreditResult<ComputationOutput<ClosingSummary>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_declared(declared)?;

    let payments: Money = installments.iter().map(|i| i.amount).sum();
    let total_fees: Money = installments.iter().map(|i| i.fee).sum();
    let total_income = if config.include_fees_in_income {
        payments + total_fees
    } else {
        payments
    };

    let (total_expense, expenses_complete) = match expenses {
        Some(records) => (records.iter().map(|e| e.amount).sum(), true),
        None => {
            let msg = "Expense data unavailable; balance computed with zero expenses".to_string();
            log::warn!("{msg}");
            warnings.push(msg);
            (Decimal::ZERO, false)
        }
    };

    let balance = total_income - total_expense;
    let declared_total = declared.total();
    let difference = (balance - declared_total).abs();
    let status = classify_difference(difference, &config.reconciliation);

    if status != ReconciliationStatus::Balanced {
        warnings.push(format!(
            "Counted {} against expected {} (difference {})",
            declared_total, balance, difference
        ));
    }

    let summary = ClosingSummary {
        installment_count: installments.len(),
        total_income,
        total_fees,
        total_expense,
        balance,
        declared_total,
        difference,
        status,
        expenses_complete,
        by_method: method_breakdown(installments),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Cash Closing Reconciliation (income less expenses against counted totals)",
        &serde_json::json!({
            "balanced_max": config.reconciliation.balanced_max.to_string(),
            "minor_max": config.reconciliation.minor_max.to_string(),
            "include_fees_in_income": config.include_fees_in_income,
        }),
        warnings,
        elapsed,
        summary,
    ))
}

/// Totals per payment method, in CASH, CARD, TRANSFER order.
pub fn method_breakdown(installments: &[Installment]) -> Vec<MethodBreakdown> {
    let mut by_method: BTreeMap<PaymentMethod, MethodBreakdown> = BTreeMap::new();
    for inst in installments {
        let entry = by_method.entry(inst.method).or_insert_with(|| MethodBreakdown {
            method: inst.method,
            ..Default::default()
        });
        entry.amount += inst.amount;
        entry.fees += inst.fee;
        entry.count += 1;
    }
    by_method.into_values().collect()
}

fn validate_declared(declared: &DeclaredTotals) -> VehicleCreditResult<()> {
    for (field, value) in [
        ("declared_cash", declared.cash),
        ("declared_transfers", declared.transfers),
        ("declared_cards", declared.cards),
    ] {
        if value < Decimal::ZERO {
            return Err(VehicleCreditError::invalid(field, "Declared amount cannot be negative"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn installment(amount: Money, fee: Money, method: PaymentMethod) -> Installment {
        let day = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        Installment {
            id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
            store_id: Uuid::nil(),
            sequence: 1,
            amount,
            fee,
            due_date: day,
            payment_date: day,
            late_payment_date: None,
            advance_payment_date: None,
            method,
            notes: String::new(),
            attachment: None,
            created_by: None,
            closing_id: None,
            archived: false,
            paid_installments_after: 1,
            remaining_installments_after: 0,
            debt_remaining_after: Decimal::ZERO,
        }
    }

    fn expense(amount: Money) -> ExpenseRecord {
        ExpenseRecord {
            id: Uuid::new_v4(),
            store_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            category: "fuel".into(),
            amount,
            description: String::new(),
        }
    }

    #[test]
    fn test_classification_boundaries() {
        let bands = ReconciliationThresholds::default();
        assert_eq!(classify_difference(dec!(0), &bands), ReconciliationStatus::Balanced);
        assert_eq!(classify_difference(dec!(1000), &bands), ReconciliationStatus::Balanced);
        assert_eq!(classify_difference(dec!(1001), &bands), ReconciliationStatus::MinorDifference);
        assert_eq!(classify_difference(dec!(5000), &bands), ReconciliationStatus::MinorDifference);
        assert_eq!(classify_difference(dec!(5001), &bands), ReconciliationStatus::MajorDifference);
        assert_eq!(classify_difference(dec!(-5001), &bands), ReconciliationStatus::MajorDifference);
    }

    #[test]
    fn test_summary_balanced_with_expenses() {
        let installments = vec![
            installment(dec!(465_000), dec!(20_000), PaymentMethod::Cash),
            installment(dec!(300_000), dec!(0), PaymentMethod::Transfer),
        ];
        let expenses = vec![expense(dec!(65_000))];
        let declared = DeclaredTotals {
            cash: dec!(400_000),
            transfers: dec!(300_000),
            cards: dec!(0),
        };

        let result =
            summarize_closing(&installments, Some(&expenses), &declared, &EngineConfig::default())
                .unwrap();
        let s = &result.result;

        assert_eq!(s.total_income, dec!(765_000));
        assert_eq!(s.total_fees, dec!(20_000));
        assert_eq!(s.total_expense, dec!(65_000));
        assert_eq!(s.balance, dec!(700_000));
        assert_eq!(s.difference, dec!(0));
        assert_eq!(s.status, ReconciliationStatus::Balanced);
        assert!(s.expenses_complete);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_missing_expenses_flagged() {
        let installments = vec![installment(dec!(100_000), dec!(0), PaymentMethod::Cash)];
        let declared = DeclaredTotals {
            cash: dec!(100_000),
            ..Default::default()
        };
        let result =
            summarize_closing(&installments, None, &declared, &EngineConfig::default()).unwrap();

        assert!(!result.result.expenses_complete);
        assert_eq!(result.result.total_expense, Decimal::ZERO);
        assert!(result.warnings.iter().any(|w| w.contains("Expense data unavailable")));
    }

    #[test]
    fn test_fees_join_income_only_when_configured() {
        let installments = vec![installment(dec!(100_000), dec!(10_000), PaymentMethod::Card)];
        let declared = DeclaredTotals {
            cards: dec!(110_000),
            ..Default::default()
        };

        let default = summarize_closing(&installments, Some(&[]), &declared, &EngineConfig::default())
            .unwrap()
            .result;
        assert_eq!(default.total_income, dec!(100_000));
        assert_eq!(default.status, ReconciliationStatus::MajorDifference);

        let config = EngineConfig {
            include_fees_in_income: true,
            ..Default::default()
        };
        let with_fees = summarize_closing(&installments, Some(&[]), &declared, &config)
            .unwrap()
            .result;
        assert_eq!(with_fees.total_income, dec!(110_000));
        assert_eq!(with_fees.status, ReconciliationStatus::Balanced);
    }

    #[test]
    fn test_method_breakdown_groups() {
        let installments = vec![
            installment(dec!(10), dec!(1), PaymentMethod::Transfer),
            installment(dec!(20), dec!(0), PaymentMethod::Cash),
            installment(dec!(30), dec!(2), PaymentMethod::Transfer),
        ];
        let breakdown = method_breakdown(&installments);
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].method, PaymentMethod::Cash);
        assert_eq!(breakdown[1].amount, dec!(40));
        assert_eq!(breakdown[1].fees, dec!(3));
        assert_eq!(breakdown[1].count, 2);
    }

    #[test]
    fn test_negative_declared_rejected() {
        let declared = DeclaredTotals {
            cash: dec!(-1),
            ..Default::default()
        };
        match summarize_closing(&[], Some(&[]), &declared, &EngineConfig::default()).unwrap_err() {
            VehicleCreditError::InvalidInput { field, .. } => assert_eq!(field, "declared_cash"),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }
}
