mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::closing::{ClosingCreateArgs, ClosingReportArgs, ReconcileArgs};
use commands::loans::{DelinquencyArgs, LoanCreateArgs, LoanIdArgs};
use commands::news::{NewsApplyArgs, NewsDeleteArgs, NewsImpactArgs};
use commands::payments::{AvailablePaymentsArgs, PaymentDeleteArgs, PaymentRecordArgs, ReceiptArgs};
use commands::schedule::ScheduleArgs;

/// Installment scheduling and cash reconciliation for vehicle financing
#[derive(Parser)]
#[command(
    name = "vcredit",
    version,
    about = "Installment scheduling and cash reconciliation for vehicle financing",
    long_about = "A CLI for the vehicle credit engine with decimal precision. Computes \
                  installment schedules, records payments, applies incident (news) \
                  waivers, and reconciles cash closings against a JSON ledger."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Engine configuration file (YAML or JSON)
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute an installment schedule from loan terms
    Schedule(ScheduleArgs),
    /// Preview the effect of a news event on a set of loans
    NewsImpact(NewsImpactArgs),
    /// Reconcile payments against declared cash, card and transfer totals
    Reconcile(ReconcileArgs),
    /// Originate a loan in the ledger
    LoanCreate(LoanCreateArgs),
    /// Archive a loan and its installments
    LoanArchive(LoanIdArgs),
    /// Return a defaulted loan to active
    LoanReinstate(LoanIdArgs),
    /// Record a payment against a loan
    PaymentRecord(PaymentRecordArgs),
    /// Delete the most recent payment of a loan
    PaymentDelete(PaymentDeleteArgs),
    /// List payments not yet included in a closing
    PaymentsAvailable(AvailablePaymentsArgs),
    /// Register (or replace) a news event and adjust affected loans
    NewsApply(NewsApplyArgs),
    /// Delete a news event and restore affected loans
    NewsDelete(NewsDeleteArgs),
    /// Create a cash closing from selected payments
    ClosingCreate(ClosingCreateArgs),
    /// Income, fees and expenses summary over a date range
    ClosingReport(ClosingReportArgs),
    /// Mark loans with too many missed installments as defaulted
    Delinquency(DelinquencyArgs),
    /// Receipt data for a recorded payment
    Receipt(ReceiptArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = match input::config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(2);
        }
    };

    let result: commands::CommandResult = match cli.command {
        Commands::Schedule(args) => commands::schedule::run_schedule(args, &config),
        Commands::NewsImpact(args) => commands::news::run_news_impact(args, &config),
        Commands::Reconcile(args) => commands::closing::run_reconcile(args, &config),
        Commands::LoanCreate(args) => commands::loans::run_loan_create(args, &config),
        Commands::LoanArchive(args) => commands::loans::run_loan_archive(args, &config),
        Commands::LoanReinstate(args) => commands::loans::run_loan_reinstate(args, &config),
        Commands::PaymentRecord(args) => commands::payments::run_payment_record(args, &config),
        Commands::PaymentDelete(args) => commands::payments::run_payment_delete(args, &config),
        Commands::PaymentsAvailable(args) => {
            commands::payments::run_payments_available(args, &config)
        }
        Commands::NewsApply(args) => commands::news::run_news_apply(args, &config),
        Commands::NewsDelete(args) => commands::news::run_news_delete(args, &config),
        Commands::ClosingCreate(args) => commands::closing::run_closing_create(args, &config),
        Commands::ClosingReport(args) => commands::closing::run_closing_report(args, &config),
        Commands::Delinquency(args) => commands::loans::run_delinquency(args, &config),
        Commands::Receipt(args) => commands::payments::run_receipt(args, &config),
        Commands::Version => {
            println!("vcredit {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
