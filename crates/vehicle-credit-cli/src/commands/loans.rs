use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use uuid::Uuid;

use vehicle_credit_core::config::EngineConfig;
use vehicle_credit_core::loan::LoanTerms;

use super::{parse_frequency, parse_interest_type, today, CommandResult, LedgerArgs};
use crate::input;

/// Arguments for originating a loan
#[derive(Args)]
pub struct LoanCreateArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    /// Path to JSON loan terms (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    #[arg(long)]
    pub store: Option<Uuid>,

    #[arg(long)]
    pub client: Option<Uuid>,

    #[arg(long)]
    pub vehicle: Option<Uuid>,

    /// Vehicle category matched by store-wide news filters
    #[arg(long, default_value = "motorcycle")]
    pub vehicle_type: String,

    /// Vehicle price
    #[arg(long)]
    pub principal: Option<Decimal>,

    #[arg(long, default_value = "0")]
    pub down_payment: Decimal,

    /// Annual interest rate in percent (12 = 12%)
    #[arg(long)]
    pub annual_rate: Option<Decimal>,

    /// Interest type: fixed, compound
    #[arg(long, default_value = "fixed")]
    pub interest_type: String,

    #[arg(long)]
    pub installments: Option<u32>,

    /// Payment frequency: weekly, biweekly, monthly
    #[arg(long, default_value = "monthly")]
    pub frequency: String,

    /// Loan start date (YYYY-MM-DD); the first installment falls one period later
    #[arg(long)]
    pub start_date: Option<NaiveDate>,
}

/// Arguments for commands addressing a single loan
#[derive(Args)]
pub struct LoanIdArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    #[arg(long)]
    pub loan: Uuid,
}

/// Arguments for the delinquency sweep
#[derive(Args)]
pub struct DelinquencyArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    #[arg(long)]
    pub store: Uuid,

    /// Assessment date (defaults to today)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

pub fn run_loan_create(args: LoanCreateArgs, config: &EngineConfig) -> CommandResult {
    let terms: LoanTerms = match input::read_payload(args.input.as_deref())? {
        Some(payload) => payload,
        None => LoanTerms {
            store_id: args.store.ok_or("--store is required (or provide --input)")?,
            client_id: args.client.ok_or("--client is required (or provide --input)")?,
            vehicle_id: args.vehicle.ok_or("--vehicle is required (or provide --input)")?,
            vehicle_type: args.vehicle_type.clone(),
            principal: args
                .principal
                .ok_or("--principal is required (or provide --input)")?,
            down_payment: args.down_payment,
            annual_rate: args
                .annual_rate
                .ok_or("--annual-rate is required (or provide --input)")?,
            interest_type: parse_interest_type(&args.interest_type)?,
            installments: args
                .installments
                .ok_or("--installments is required (or provide --input)")?,
            frequency: parse_frequency(&args.frequency)?,
            start_date: args.start_date.unwrap_or_else(today),
        },
    };

    let ledger = args.ledger.open(config)?;
    let loan = ledger.create_loan(&terms)?;
    Ok(serde_json::to_value(loan)?)
}

pub fn run_loan_archive(args: LoanIdArgs, config: &EngineConfig) -> CommandResult {
    let ledger = args.ledger.open(config)?;
    Ok(serde_json::to_value(ledger.archive_loan(args.loan)?)?)
}

pub fn run_loan_reinstate(args: LoanIdArgs, config: &EngineConfig) -> CommandResult {
    let ledger = args.ledger.open(config)?;
    Ok(serde_json::to_value(ledger.reinstate_loan(args.loan)?)?)
}

pub fn run_delinquency(args: DelinquencyArgs, config: &EngineConfig) -> CommandResult {
    let ledger = args.ledger.open(config)?;
    let as_of = args.as_of.unwrap_or_else(today);
    let result = ledger.assess_delinquency(args.store, as_of)?;
    Ok(serde_json::to_value(result)?)
}
