// crates/engine/src/correlate.rs
//! Tool-call correlation.
//!
//! Providers emit tool invocations and tool results as separate records.
//! This pass nests each `ToolResult` under the `ToolUse` that shares its
//! call id, scoped to one parsed session. Orphan results (no matching
//! invocation in the same sequence) stay where they are.

use agent_view_types::{ParsedMessage, ToolResultData};
use std::collections::{HashMap, HashSet};

/// Two-pass, O(n) correlation.
///
/// Pass 1 indexes every identified `ToolResult` by call id. Pass 2 walks
/// the sequence once: a `ToolUse` absorbs the results for its id, and a
/// top-level `ToolResult` is dropped only when some `ToolUse` in this same
/// sequence consumed its id. Relative order of everything that is not
/// merged away is unchanged; merged results keep their own timestamps.
pub fn correlate_tool_results(messages: Vec<ParsedMessage>) -> Vec<ParsedMessage> {
    let mut by_id: HashMap<String, Vec<ToolResultData>> = HashMap::new();
    let mut use_ids: HashSet<String> = HashSet::new();
    for msg in &messages {
        match msg {
            ParsedMessage::ToolResult(data) => {
                if let Some(id) = &data.tool_call_id {
                    by_id.entry(id.clone()).or_default().push(data.clone());
                }
            }
            ParsedMessage::ToolUse { tool_call_id, .. } => {
                if let Some(id) = tool_call_id {
                    use_ids.insert(id.clone());
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg {
            ParsedMessage::ToolUse {
                tool_name,
                tool_call_id,
                input,
                mut results,
                timestamp,
            } => {
                if let Some(id) = &tool_call_id {
                    // remove() so a duplicated call id nests its results
                    // under the first invocation only.
                    if let Some(matched) = by_id.remove(id) {
                        results.extend(matched);
                    }
                }
                out.push(ParsedMessage::ToolUse {
                    tool_name,
                    tool_call_id,
                    input,
                    results,
                    timestamp,
                });
            }
            ParsedMessage::ToolResult(data) => {
                // Drop only when some ToolUse in this same sequence owns the
                // id; results may precede their invocation in odd logs.
                let nested = data
                    .tool_call_id
                    .as_ref()
                    .map(|id| use_ids.contains(id))
                    .unwrap_or(false);
                if !nested {
                    out.push(ParsedMessage::ToolResult(data));
                }
            }
            other => out.push(other),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_view_types::MessageContent;
    use chrono::{TimeZone, Utc};

    fn result(id: &str, text: &str) -> ParsedMessage {
        ParsedMessage::tool_result(
            ToolResultData::new(vec![MessageContent::text(text)]).with_tool_call_id(id),
        )
    }

    #[test]
    fn matching_result_nests_and_leaves_top_level() {
        let msgs = vec![
            ParsedMessage::tool_use("Bash", vec![]).with_tool_call_id("t1"),
            result("t1", "ok"),
        ];
        let out = correlate_tool_results(msgs);
        assert_eq!(out.len(), 1);
        match &out[0] {
            ParsedMessage::ToolUse { results, .. } => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].output[0].as_text(), "ok");
            }
            other => panic!("expected ToolUse, got {other:?}"),
        }
    }

    #[test]
    fn orphan_result_stays_top_level_exactly_once() {
        let msgs = vec![
            ParsedMessage::tool_use("Read", vec![]).with_tool_call_id("t1"),
            result("t2", "orphan"),
        ];
        let out = correlate_tool_results(msgs);
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[1], ParsedMessage::ToolResult(d) if d.tool_call_id.as_deref() == Some("t2")));
    }

    #[test]
    fn result_without_id_is_untouched() {
        let msgs = vec![ParsedMessage::tool_result(ToolResultData::new(vec![
            MessageContent::text("anonymous"),
        ]))];
        let out = correlate_tool_results(msgs);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn multiple_results_for_one_id_all_nest_in_order() {
        let msgs = vec![
            ParsedMessage::tool_use("Bash", vec![]).with_tool_call_id("t1"),
            result("t1", "chunk one"),
            result("t1", "chunk two"),
        ];
        let out = correlate_tool_results(msgs);
        assert_eq!(out.len(), 1);
        match &out[0] {
            ParsedMessage::ToolUse { results, .. } => {
                assert_eq!(results.len(), 2);
                assert_eq!(results[0].output[0].as_text(), "chunk one");
                assert_eq!(results[1].output[0].as_text(), "chunk two");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn non_merged_order_is_preserved() {
        let msgs = vec![
            ParsedMessage::user(vec![MessageContent::text("q")]),
            ParsedMessage::tool_use("Grep", vec![]).with_tool_call_id("a"),
            result("a", "hit"),
            ParsedMessage::assistant_text(vec![MessageContent::text("done")]),
        ];
        let out = correlate_tool_results(msgs);
        let roles: Vec<&str> = out.iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec!["user", "tool_use", "assistant"]);
    }

    #[test]
    fn merged_result_keeps_own_timestamp() {
        let use_ts = Utc.with_ymd_and_hms(2026, 1, 27, 10, 0, 0).unwrap();
        let res_ts = Utc.with_ymd_and_hms(2026, 1, 27, 10, 0, 5).unwrap();
        let msgs = vec![
            ParsedMessage::tool_use("Bash", vec![])
                .with_tool_call_id("t1")
                .with_timestamp(Some(use_ts)),
            result("t1", "out").with_timestamp(Some(res_ts)),
        ];
        let out = correlate_tool_results(msgs);
        match &out[0] {
            ParsedMessage::ToolUse {
                results, timestamp, ..
            } => {
                assert_eq!(*timestamp, Some(use_ts));
                assert_eq!(results[0].timestamp, Some(res_ts));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn result_preceding_its_use_still_nests_exactly_once() {
        let msgs = vec![
            result("t1", "early"),
            ParsedMessage::tool_use("Bash", vec![]).with_tool_call_id("t1"),
        ];
        let out = correlate_tool_results(msgs);
        assert_eq!(out.len(), 1);
        match &out[0] {
            ParsedMessage::ToolUse { results, .. } => assert_eq!(results.len(), 1),
            _ => unreachable!(),
        }
    }

    #[test]
    fn correlation_is_idempotent_on_output() {
        let msgs = vec![
            ParsedMessage::tool_use("Bash", vec![]).with_tool_call_id("t1"),
            result("t1", "ok"),
            result("zz", "orphan"),
        ];
        let once = correlate_tool_results(msgs);
        let twice = correlate_tool_results(once.clone());
        assert_eq!(once, twice);
    }
}
