use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use uuid::Uuid;

use vehicle_credit_core::config::EngineConfig;
use vehicle_credit_core::payments::PaymentInput;

use super::{parse_method, today, CommandResult, LedgerArgs};
use crate::input;

/// Arguments for recording a payment
#[derive(Args)]
pub struct PaymentRecordArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    #[arg(long)]
    pub loan: Uuid,

    /// Path to JSON payment (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Amount paid (defaults to the loan's next amount due)
    #[arg(long)]
    pub amount: Option<Decimal>,

    /// Ancillary fee collected with the payment
    #[arg(long, default_value = "0")]
    pub fee: Decimal,

    /// Payment method: cash, card, transfer
    #[arg(long, default_value = "cash")]
    pub method: String,

    /// Payment date (defaults to today)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    #[arg(long, default_value = "")]
    pub notes: String,

    /// Reference to an uploaded voucher
    #[arg(long)]
    pub attachment: Option<String>,

    #[arg(long)]
    pub created_by: Option<Uuid>,
}

#[derive(Args)]
pub struct PaymentDeleteArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    #[arg(long)]
    pub installment: Uuid,
}

#[derive(Args)]
pub struct AvailablePaymentsArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    #[arg(long)]
    pub store: Uuid,
}

#[derive(Args)]
pub struct ReceiptArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    #[arg(long)]
    pub installment: Uuid,

    /// Issue date used for the day offset (defaults to today)
    #[arg(long)]
    pub today: Option<NaiveDate>,
}

pub fn run_payment_record(args: PaymentRecordArgs, config: &EngineConfig) -> CommandResult {
    let ledger = args.ledger.open(config)?;
    let payment: PaymentInput = match input::read_payload(args.input.as_deref())? {
        Some(payload) => payload,
        None => PaymentInput {
            amount: match args.amount {
                Some(amount) => amount,
                None => ledger.loan(args.loan)?.next_amount_due(),
            },
            fee: args.fee,
            method: parse_method(&args.method)?,
            payment_date: args.date.unwrap_or_else(today),
            notes: args.notes.clone(),
            attachment: args.attachment.clone(),
            created_by: args.created_by,
        },
    };

    let installment = ledger.record_payment(args.loan, &payment)?;
    Ok(serde_json::to_value(installment)?)
}

pub fn run_payment_delete(args: PaymentDeleteArgs, config: &EngineConfig) -> CommandResult {
    let ledger = args.ledger.open(config)?;
    Ok(serde_json::to_value(ledger.delete_payment(args.installment)?)?)
}

pub fn run_payments_available(args: AvailablePaymentsArgs, config: &EngineConfig) -> CommandResult {
    let ledger = args.ledger.open(config)?;
    Ok(serde_json::to_value(ledger.available_payments(args.store))?)
}

pub fn run_receipt(args: ReceiptArgs, config: &EngineConfig) -> CommandResult {
    let ledger = args.ledger.open(config)?;
    let receipt = ledger.receipt(args.installment, args.today.unwrap_or_else(today))?;
    Ok(serde_json::to_value(receipt)?)
}
