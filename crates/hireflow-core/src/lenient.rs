//! Lenient deserialization for LLM-produced JSON.
//!
//! Models do not reliably honour a schema: a field documented as a string
//! comes back as a list of strings, a score arrives as `"85"` or `"85/100"`,
//! a skill list arrives as one comma-separated string. Every LLM response
//! struct routes its fields through the adapters in this module via
//! `#[serde(deserialize_with = "...")]`, so coercion happens in one place:
//!
//! - scalar string fields: arrays are joined with `", "`, numbers and booleans
//!   are rendered, `null` becomes empty / `None`;
//! - list fields: a single string is split on commas, semicolons and newlines;
//! - numeric fields: numeric strings (with an optional `%` or `/100` suffix)
//!   are parsed, arrays use their first numeric element.
//!
//! ```
//! use serde::Deserialize;
//! use hireflow_core::lenient;
//!
//! #[derive(Deserialize)]
//! struct Reply {
//!     #[serde(default, deserialize_with = "lenient::opt_string")]
//!     strengths: Option<String>,
//! }
//!
//! let reply: Reply = serde_json::from_str(r#"{"strengths": ["Rust", "Postgres"]}"#).unwrap();
//! assert_eq!(reply.strengths.as_deref(), Some("Rust, Postgres"));
//! ```

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Separator used when joining array elements into a scalar string.
pub const JOIN_SEPARATOR: &str = ", ";

/// Render any JSON value as a flat string.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(JOIN_SEPARATOR),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, value_to_string(v)))
            .collect::<Vec<_>>()
            .join(JOIN_SEPARATOR),
    }
}

/// Render a JSON value as a list of non-empty strings.
pub fn value_to_list(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => s
            .split([',', ';', '\n'])
            .map(|part| part.trim().trim_start_matches("- ").trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        other => {
            let s = value_to_string(other);
            if s.is_empty() {
                Vec::new()
            } else {
                vec![s]
            }
        }
    }
}

/// Interpret a JSON value as a number, if it plausibly is one.
pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric(s),
        Value::Array(items) => items.iter().find_map(value_to_f64),
        _ => None,
    }
}

fn parse_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_suffix("/100")
        .or_else(|| trimmed.strip_suffix('%'))
        .unwrap_or(trimmed)
        .trim();
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Deserialize a scalar string, coercing arrays and other scalars.
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_string(&value))
}

/// Deserialize an optional scalar string; empty results become `None`.
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let s = value_to_string(&value);
    Ok(if s.is_empty() { None } else { Some(s) })
}

/// Deserialize a list of strings, splitting a single delimited string.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_list(&value))
}

/// Deserialize an optional number, accepting numeric strings.
pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_f64(&value))
}
