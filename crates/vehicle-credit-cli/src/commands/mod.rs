pub mod closing;
pub mod loans;
pub mod news;
pub mod payments;
pub mod schedule;

use clap::Args;
use std::path::PathBuf;

use vehicle_credit_core::config::EngineConfig;
use vehicle_credit_core::ledger::Ledger;
use vehicle_credit_core::{InterestType, PaymentFrequency, PaymentMethod};

pub type CommandResult = Result<serde_json::Value, Box<dyn std::error::Error>>;

/// Location of the JSON ledger snapshot shared by the stateful commands
#[derive(Args)]
pub struct LedgerArgs {
    /// Ledger snapshot file (created on first write)
    #[arg(long)]
    pub ledger: PathBuf,
}

impl LedgerArgs {
    pub fn open(&self, config: &EngineConfig) -> Result<Ledger, Box<dyn std::error::Error>> {
        Ok(Ledger::open(&self.ledger, config.clone())?)
    }
}

pub fn parse_interest_type(value: &str) -> Result<InterestType, Box<dyn std::error::Error>> {
    match value.to_lowercase().as_str() {
        "fixed" | "simple" => Ok(InterestType::Fixed),
        "compound" => Ok(InterestType::Compound),
        _ => Err(format!("Unknown interest type '{}'. Use: fixed, compound", value).into()),
    }
}

pub fn parse_frequency(value: &str) -> Result<PaymentFrequency, Box<dyn std::error::Error>> {
    match value.to_lowercase().as_str() {
        "weekly" => Ok(PaymentFrequency::Weekly),
        "biweekly" => Ok(PaymentFrequency::Biweekly),
        "monthly" => Ok(PaymentFrequency::Monthly),
        _ => Err(format!(
            "Unknown frequency '{}'. Use: weekly, biweekly, monthly",
            value
        )
        .into()),
    }
}

pub fn parse_method(value: &str) -> Result<PaymentMethod, Box<dyn std::error::Error>> {
    match value.to_lowercase().as_str() {
        "cash" => Ok(PaymentMethod::Cash),
        "card" => Ok(PaymentMethod::Card),
        "transfer" => Ok(PaymentMethod::Transfer),
        _ => Err(format!("Unknown payment method '{}'. Use: cash, card, transfer", value).into()),
    }
}

/// Local calendar date, used when `--today`/`--as-of` is omitted.
pub fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}
