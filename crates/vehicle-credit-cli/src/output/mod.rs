pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use colored::Colorize;
use serde_json::Value;

use crate::OutputFormat;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }

    // Table output lists warnings inline; the other formats keep stdout clean.
    if !matches!(format, OutputFormat::Table) && atty::is(atty::Stream::Stderr) {
        print_warnings(value);
    }
}

fn print_warnings(value: &Value) {
    let Some(Value::Array(warnings)) = value.get("warnings") else {
        return;
    };
    for w in warnings.iter().filter_map(Value::as_str) {
        eprintln!("{}: {}", "warning".yellow().bold(), w);
    }
}
