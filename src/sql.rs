//! SQL text helpers shared by the row reader and the restore generator

use serde_json::Value;

/// Quote an identifier for SQLite ("name", with embedded quotes doubled)
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a text literal for SQLite ('text', with embedded quotes doubled)
pub fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Render a captured JSON value as a SQL literal
///
/// Booleans become 1/0 (SQLite has no boolean storage class). Arrays and
/// objects are stored as their JSON text.
pub fn value_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_text(s),
        other => quote_text(&other.to_string()),
    }
}

/// Quote a string for a POSIX shell
pub fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}
