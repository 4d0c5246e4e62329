use chrono::NaiveDate;
use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use vehicle_credit_core::closing::{DeclaredTotals, ExpenseRecord};
use vehicle_credit_core::config::EngineConfig;
use vehicle_credit_core::loan::{Installment, Loan};
use vehicle_credit_core::news::NewsEvent;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// Parse an optional engine configuration; `None` means defaults.
fn parse_config(config_json: Option<String>) -> NapiResult<EngineConfig> {
    let config: EngineConfig = match config_json {
        Some(raw) => serde_json::from_str(&raw).map_err(to_napi_error)?,
        None => EngineConfig::default(),
    };
    config.validate().map_err(to_napi_error)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_schedule(input_json: String, config_json: Option<String>) -> NapiResult<String> {
    let input: vehicle_credit_core::schedule::ScheduleInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let config = parse_config(config_json)?;
    let output = vehicle_credit_core::schedule::calculate_schedule(&input, &config)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// News
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct NewsImpactInput {
    loans: Vec<Loan>,
    event: NewsEvent,
}

/// Returns the impact envelope plus the adjusted loans under `loans`.
#[napi]
pub fn news_impact(input_json: String) -> NapiResult<String> {
    let mut input: NewsImpactInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let impact = vehicle_credit_core::news::apply_news_event(&mut input.loans, &input.event)
        .map_err(to_napi_error)?;
    let mut value = serde_json::to_value(&impact).map_err(to_napi_error)?;
    if let Some(envelope) = value.as_object_mut() {
        envelope.insert(
            "loans".into(),
            serde_json::to_value(&input.loans).map_err(to_napi_error)?,
        );
    }
    serde_json::to_string(&value).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Cash closing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ReconcileInput {
    installments: Vec<Installment>,
    #[serde(default)]
    expenses: Option<Vec<ExpenseRecord>>,
    declared: DeclaredTotals,
}

#[napi]
pub fn reconcile_closing(input_json: String, config_json: Option<String>) -> NapiResult<String> {
    let input: ReconcileInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let config = parse_config(config_json)?;
    let output = vehicle_credit_core::closing::summarize_closing(
        &input.installments,
        input.expenses.as_deref(),
        &input.declared,
        &config,
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[derive(Deserialize)]
struct PeriodReportInput {
    installments: Vec<Installment>,
    #[serde(default)]
    expenses: Vec<ExpenseRecord>,
    from: NaiveDate,
    to: NaiveDate,
}

#[napi]
pub fn period_report(input_json: String) -> NapiResult<String> {
    let input: PeriodReportInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = vehicle_credit_core::report::summarize_period(
        &input.installments,
        &input.expenses,
        input.from,
        input.to,
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
