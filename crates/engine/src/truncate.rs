// crates/engine/src/truncate.rs
//! Output bounding and tool-output field extraction.
//!
//! Tool output can be arbitrarily large (a full file read, a long build
//! log). Before it reaches the model it is truncated middle-out so the
//! start and the end both stay visible.

use serde_json::Value;

/// Separator inserted where the middle of an over-long text was removed.
pub const TRUNCATION_SEPARATOR: &str = " [...] ";

/// Default character budget for tool output and code blocks.
pub const OUTPUT_LIMIT: usize = 500;

/// Truncate `text` to exactly `limit` characters (separator included) by
/// removing the middle. Texts at or under the limit pass through untouched.
/// Counting is per `char`, so multi-byte content never splits a scalar.
pub fn truncate_middle(text: &str, limit: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= limit {
        return text.to_string();
    }

    let sep_len = TRUNCATION_SEPARATOR.chars().count();
    if limit <= sep_len {
        // Degenerate budget: no room for content around the separator.
        return chars.into_iter().take(limit).collect();
    }

    let budget = limit - sep_len;
    let prefix_len = budget - budget / 2; // prefix takes the odd char
    let suffix_len = budget / 2;

    let mut out = String::with_capacity(limit * 4);
    out.extend(chars[..prefix_len].iter());
    out.push_str(TRUNCATION_SEPARATOR);
    out.extend(chars[chars.len() - suffix_len..].iter());
    out
}

/// Truncate with the default output budget.
pub fn truncate_output(text: &str) -> String {
    truncate_middle(text, OUTPUT_LIMIT)
}

const PRIMARY_FIELDS: [&str; 5] = ["content", "result", "output", "error", "message"];

/// Pick the most meaningful scalar out of a heterogeneous tool-output JSON
/// value. Fixed priority over common shapes; falls back to serializing the
/// whole value when nothing matches.
pub fn extract_primary_field(value: &Value) -> String {
    if let Value::String(s) = value {
        return s.clone();
    }

    if let Value::Object(map) = value {
        for key in PRIMARY_FIELDS {
            if let Some(field) = map.get(key) {
                return scalarize(field);
            }
        }
    }

    if let Value::Array(_) = value {
        return scalarize(value);
    }

    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn scalarize(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            // Arrays of text blocks are common ({"type":"text","text":...}).
            let texts: Vec<&str> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(o) => o.get("text").and_then(Value::as_str),
                    _ => None,
                })
                .collect();
            if texts.is_empty() {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            } else {
                texts.join("\n")
            }
        }
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
