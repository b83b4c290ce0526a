// crates/engine/src/timeutil.rs
//! Timestamp normalization.
//!
//! Providers report instants with different native precision: epoch
//! milliseconds, epoch seconds, or ISO-8601 strings. Everything funnels
//! through here into `DateTime<Utc>`; unparseable input becomes `None`
//! rather than epoch zero, so "unknown" stays distinguishable.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::path::Path;

/// Parse an ISO-8601 / RFC 3339 timestamp string.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Interpret an integer as epoch milliseconds (values past the year ~2286
/// in seconds) or epoch seconds otherwise.
pub fn parse_epoch(n: i64) -> Option<DateTime<Utc>> {
    if n <= 0 {
        return None;
    }
    if n >= 10_000_000_000 {
        Utc.timestamp_millis_opt(n).single()
    } else {
        Utc.timestamp_opt(n, 0).single()
    }
}

/// Best-effort instant from a JSON field of unknown shape.
pub fn instant_from_value(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => parse_instant(s),
        Value::Number(n) => n.as_i64().and_then(parse_epoch),
        _ => None,
    }
}

/// Filesystem mtime fallback for `updated_at` when records carry nothing usable.
pub fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let secs = modified
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_secs() as i64;
    Utc.timestamp_opt(secs, 0).single()
}
