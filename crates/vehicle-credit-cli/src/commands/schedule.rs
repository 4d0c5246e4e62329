use clap::Args;
use rust_decimal::Decimal;

use vehicle_credit_core::config::EngineConfig;
use vehicle_credit_core::schedule::{calculate_schedule, ScheduleInput};

use super::{parse_interest_type, CommandResult};
use crate::input;

/// Arguments for installment schedule generation
#[derive(Args)]
pub struct ScheduleArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Amount financed (principal minus down payment)
    #[arg(long)]
    pub financed_amount: Option<Decimal>,

    /// Number of installments
    #[arg(long)]
    pub installments: Option<u32>,

    /// Annual interest rate in percent (12 = 12%)
    #[arg(long)]
    pub annual_rate: Option<Decimal>,

    /// Interest type: fixed, compound
    #[arg(long, default_value = "fixed")]
    pub interest_type: String,
}

pub fn run_schedule(args: ScheduleArgs, config: &EngineConfig) -> CommandResult {
    let schedule_input: ScheduleInput = match input::read_payload(args.input.as_deref())? {
        Some(payload) => payload,
        None => ScheduleInput {
            financed_amount: args
                .financed_amount
                .ok_or("--financed-amount is required (or provide --input)")?,
            installments: args
                .installments
                .ok_or("--installments is required (or provide --input)")?,
            annual_rate: args
                .annual_rate
                .ok_or("--annual-rate is required (or provide --input)")?,
            interest_type: parse_interest_type(&args.interest_type)?,
        },
    };

    let result = calculate_schedule(&schedule_input, config)?;
    Ok(serde_json::to_value(result)?)
}
