use serde_json::Value;

/// Pretty-print JSON to stdout. Decimals are already strings in the value, so
/// amounts keep their exact scale.
pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("JSON serialization error: {}", e),
    }
}
