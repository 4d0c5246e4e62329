use clap::Args;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vehicle_credit_core::config::EngineConfig;
use vehicle_credit_core::loan::Loan;
use vehicle_credit_core::news::{apply_news_event, NewsEvent};

use super::{CommandResult, LedgerArgs};
use crate::input;

/// Arguments for a dry-run news impact calculation
#[derive(Args)]
pub struct NewsImpactArgs {
    /// Path to JSON with `loans` and `event` (or pipe it on stdin)
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for registering or replacing a news event in the ledger
#[derive(Args)]
pub struct NewsApplyArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    /// Path to the JSON news event (or pipe it on stdin)
    #[arg(long)]
    pub input: Option<String>,

    /// Replace an existing event, reverting its previous adjustments first
    #[arg(long)]
    pub update: bool,
}

#[derive(Args)]
pub struct NewsDeleteArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    #[arg(long)]
    pub news: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
struct NewsImpactInput {
    loans: Vec<Loan>,
    event: NewsEvent,
}

pub fn run_news_impact(args: NewsImpactArgs, _config: &EngineConfig) -> CommandResult {
    let mut payload: NewsImpactInput = input::read_payload(args.input.as_deref())?
        .ok_or("--input file (or stdin) with loans and event is required")?;

    let impact = apply_news_event(&mut payload.loans, &payload.event)?;
    let mut value = serde_json::to_value(impact)?;
    if let Some(envelope) = value.as_object_mut() {
        envelope.insert("loans".into(), serde_json::to_value(&payload.loans)?);
    }
    Ok(value)
}

pub fn run_news_apply(args: NewsApplyArgs, config: &EngineConfig) -> CommandResult {
    let event: NewsEvent = input::read_payload(args.input.as_deref())?
        .ok_or("--input file (or stdin) with the news event is required")?;

    let ledger = args.ledger.open(config)?;
    let impact = if args.update {
        ledger.update_news_event(&event)?
    } else {
        ledger.create_news_event(&event)?
    };
    Ok(serde_json::to_value(impact)?)
}

pub fn run_news_delete(args: NewsDeleteArgs, config: &EngineConfig) -> CommandResult {
    let ledger = args.ledger.open(config)?;
    Ok(serde_json::to_value(ledger.delete_news_event(args.news)?)?)
}
