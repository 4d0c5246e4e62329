use serde_json::Value;

/// Fields printed by `--output minimal`, in order of preference.
const PRIORITY_KEYS: [&str; 9] = [
    "payment_amount",
    "status",
    "difference",
    "net",
    "newly_defaulted",
    "installments_waived",
    "total_charged",
    "debt_remaining",
    "id",
];

/// Print just the key answer value from the output.
///
/// Closings are reduced to their reconciliation summary and lists to one id
/// per line; otherwise the first priority field present wins, then the first
/// field of the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let result_obj = result_obj
        .as_object()
        .and_then(|m| m.get("summary"))
        .filter(|s| s.is_object())
        .unwrap_or(result_obj);

    match result_obj {
        Value::Object(map) => {
            for key in PRIORITY_KEYS {
                if let Some(val) = map.get(key).filter(|v| !v.is_null()) {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
            if let Some((key, val)) = map.iter().next() {
                println!("{}: {}", key, format_minimal(val));
            }
        }
        Value::Array(items) => {
            for item in items {
                match item.get("id") {
                    Some(id) => println!("{}", format_minimal(id)),
                    None => println!("{}", format_minimal(item)),
                }
            }
        }
        other => println!("{}", format_minimal(other)),
    }
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
