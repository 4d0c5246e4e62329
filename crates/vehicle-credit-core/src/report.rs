use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::closing::{method_breakdown, ExpenseRecord, MethodBreakdown};
use crate::error::VehicleCreditError;
use crate::loan::Installment;
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::VehicleCreditResult;

// ---------------------------------------------------------------------------
// Output Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub income: Money,
    pub fees: Money,
    pub expense: Money,
    pub payments: usize,
    /// Income change against the previous day with activity.
    pub change: Option<Money>,
    /// Same change as a percentage; absent when the previous income was zero.
    pub change_pct: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub payment_count: usize,
    pub total_income: Money,
    pub total_fees: Money,
    pub total_expense: Money,
    pub net: Money,
    pub expenses_by_category: BTreeMap<String, Money>,
    pub by_method: Vec<MethodBreakdown>,
    pub daily: Vec<DailyTotal>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Summarize payments and expenses dated within `[from, to]`.
///
/// Archived installments are ignored. Records outside the range are skipped,
/// so callers may pass a whole store's history.
pub fn summarize_period(
    installments: &[Installment],
    expenses: &[ExpenseRecord],
    from: NaiveDate,
    to: NaiveDate,
) -> VehicleCreditResult<ComputationOutput<PeriodReport>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if to < from {
        return Err(VehicleCreditError::invalid(
            "to",
            "Report end date cannot precede the start date",
        ));
    }

    let in_range = |d: NaiveDate| d >= from && d <= to;
    let payments: Vec<Installment> = installments
        .iter()
        .filter(|i| !i.archived && in_range(i.payment_date))
        .cloned()
        .collect();
    let period_expenses: Vec<&ExpenseRecord> =
        expenses.iter().filter(|e| in_range(e.date)).collect();

    let total_income: Money = payments.iter().map(|i| i.amount).sum();
    let total_fees: Money = payments.iter().map(|i| i.fee).sum();
    let total_expense: Money = period_expenses.iter().map(|e| e.amount).sum();

    let mut expenses_by_category: BTreeMap<String, Money> = BTreeMap::new();
    for e in &period_expenses {
        *expenses_by_category.entry(e.category.clone()).or_default() += e.amount;
    }

    let daily = daily_totals(&payments, &period_expenses);

    if payments.is_empty() {
        warnings.push(format!("No payments recorded between {} and {}", from, to));
    }

    let output = PeriodReport {
        from,
        to,
        payment_count: payments.len(),
        total_income,
        total_fees,
        total_expense,
        net: total_income - total_expense,
        expenses_by_category,
        by_method: method_breakdown(&payments),
        daily,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Period Summary (daily and per payment method)",
        &serde_json::json!({
            "from": from.to_string(),
            "to": to.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn daily_totals(payments: &[Installment], expenses: &[&ExpenseRecord]) -> Vec<DailyTotal> {
    let mut days: BTreeMap<NaiveDate, DailyTotal> = BTreeMap::new();
    let blank = |date| DailyTotal {
        date,
        income: Decimal::ZERO,
        fees: Decimal::ZERO,
        expense: Decimal::ZERO,
        payments: 0,
        change: None,
        change_pct: None,
    };

    for p in payments {
        let day = days.entry(p.payment_date).or_insert_with(|| blank(p.payment_date));
        day.income += p.amount;
        day.fees += p.fee;
        day.payments += 1;
    }
    for e in expenses {
        days.entry(e.date).or_insert_with(|| blank(e.date)).expense += e.amount;
    }

    let mut out: Vec<DailyTotal> = days.into_values().collect();
    for i in 1..out.len() {
        let previous = out[i - 1].income;
        let change = out[i].income - previous;
        out[i].change = Some(change);
        if !previous.is_zero() {
            out[i].change_pct = Some((change / previous * Decimal::ONE_HUNDRED).round_dp(2));
        }
    }
    out
}
