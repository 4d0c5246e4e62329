use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vehicle_credit_core::closing::{summarize_closing, DeclaredTotals, ExpenseRecord};
use vehicle_credit_core::config::EngineConfig;
use vehicle_credit_core::ledger::ClosingRequest;
use vehicle_credit_core::loan::Installment;

use super::{today, CommandResult, LedgerArgs};
use crate::input;

/// Arguments for reconciling a batch of payments without touching a ledger
#[derive(Args)]
pub struct ReconcileArgs {
    /// Path to JSON with `installments`, optional `expenses` and `declared`
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for creating a cash closing
#[derive(Args)]
pub struct ClosingCreateArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    /// Path to a JSON closing request (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    #[arg(long)]
    pub store: Option<Uuid>,

    /// Closing date (defaults to today)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Comma-separated payment ids to include
    #[arg(long, value_delimiter = ',')]
    pub installments: Option<Vec<Uuid>>,

    /// Cash counted in the register
    #[arg(long, default_value = "0")]
    pub cash: Decimal,

    #[arg(long, default_value = "0")]
    pub transfers: Decimal,

    #[arg(long, default_value = "0")]
    pub cards: Decimal,

    /// JSON array of expense records; omitted means expense data is unavailable
    #[arg(long)]
    pub expenses: Option<String>,

    #[arg(long)]
    pub created_by: Option<Uuid>,
}

/// Arguments for the period summary report
#[derive(Args)]
pub struct ClosingReportArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    #[arg(long)]
    pub store: Uuid,

    #[arg(long)]
    pub from: NaiveDate,

    #[arg(long)]
    pub to: NaiveDate,

    /// JSON array of expense records for the period
    #[arg(long)]
    pub expenses: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReconcileInput {
    installments: Vec<Installment>,
    #[serde(default)]
    expenses: Option<Vec<ExpenseRecord>>,
    declared: DeclaredTotals,
}

pub fn run_reconcile(args: ReconcileArgs, config: &EngineConfig) -> CommandResult {
    let payload: ReconcileInput = input::read_payload(args.input.as_deref())?
        .ok_or("--input file (or stdin) with installments and declared totals is required")?;

    let result = summarize_closing(
        &payload.installments,
        payload.expenses.as_deref(),
        &payload.declared,
        config,
    )?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_closing_create(args: ClosingCreateArgs, config: &EngineConfig) -> CommandResult {
    let request: ClosingRequest = match input::read_payload(args.input.as_deref())? {
        Some(payload) => payload,
        None => ClosingRequest {
            store_id: args.store.ok_or("--store is required (or provide --input)")?,
            date: args.date.unwrap_or_else(today),
            installment_ids: args
                .installments
                .clone()
                .ok_or("--installments is required (or provide --input)")?,
            declared: DeclaredTotals {
                cash: args.cash,
                transfers: args.transfers,
                cards: args.cards,
            },
            expenses: read_expenses(args.expenses.as_deref())?,
            created_by: args.created_by,
        },
    };

    let ledger = args.ledger.open(config)?;
    let result = ledger.create_closing(&request)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_closing_report(args: ClosingReportArgs, config: &EngineConfig) -> CommandResult {
    let expenses = read_expenses(args.expenses.as_deref())?.unwrap_or_default();
    let ledger = args.ledger.open(config)?;
    let result = ledger.period_report(args.store, args.from, args.to, &expenses)?;
    Ok(serde_json::to_value(result)?)
}

fn read_expenses(
    path: Option<&str>,
) -> Result<Option<Vec<ExpenseRecord>>, Box<dyn std::error::Error>> {
    path.map(input::file::read_json::<Vec<ExpenseRecord>>)
        .transpose()
}
