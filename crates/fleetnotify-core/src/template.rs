//! Placeholder substitution for notification templates
//!
//! The grammar is deliberately tiny:
//!
//! ```text
//! placeholder := "{{" ws* path ws* "}}"
//! path        := segment ("." segment)*
//! segment     := [A-Za-z0-9_]+
//! ```
//!
//! A path walks objects by key and arrays by numeric index. Strings render
//! verbatim, numbers and booleans with their JSON text. Anything else (null,
//! objects, arrays, or a path that does not resolve) renders as an empty
//! string. Text that does not match the grammar is left untouched.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)\s*\}\}")
        .expect("Invalid placeholder regex")
});

/// Substitute every `{{dotted.path}}` in `text` with the value found in `data`
pub fn render(text: &str, data: &Value) -> String {
    PLACEHOLDER_REGEX
        .replace_all(text, |caps: &Captures| {
            lookup(data, &caps[1]).map(value_to_text).unwrap_or_default()
        })
        .into_owned()
}

/// Resolve a dotted path against a JSON value
pub fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}
