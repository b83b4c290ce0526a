// crates/engine/src/providers/codex.rs
//! Codex CLI adapter.
//!
//! Storage: `~/.codex/sessions/YYYY/MM/DD/rollout-<timestamp>-<id>.jsonl`.
//! Every line is `{"timestamp", "type", "payload"}`; the first record is a
//! `session_meta` carrying the session id and working directory. The
//! conversation itself arrives as `response_item` payloads; `event_msg`
//! records duplicate user/agent messages and are suppressed in favor of
//! the response items.

use super::{
    classified_text, derive_title, input_pairs, malformed_record, provider_root, read_lines,
    scan_candidates, sort_newest_first, ModelCounter, ScopeHint, SessionFinder, SessionLocation,
    SessionParser,
};
use crate::correlate::correlate_tool_results;
use crate::timeutil::{file_mtime, parse_instant};
use crate::truncate::{extract_primary_field, truncate_output};
use agent_view_types::{
    MessageContent, ParsedMessage, Provider, SessionDetail, SessionMetadata, SessionSummary,
    ToolResultData,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

pub struct Codex;

const ROOT_ENV: &str = "AGENT_VIEW_CODEX_ROOT";

fn root() -> Option<PathBuf> {
    provider_root(ROOT_ENV, &[".codex", "sessions"])
}

/// Rollout files live under date-nested directories; walk them without
/// assuming the exact nesting depth.
async fn rollout_files() -> Vec<PathBuf> {
    let Some(root) = root() else { return Vec::new() };
    let mut pending = vec![root];
    let mut files = Vec::new();

    while let Some(dir) = pending.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().map(|e| e == "jsonl").unwrap_or(false) {
                files.push(path);
            }
        }
    }
    files
}

struct RolloutMeta {
    session_id: Option<String>,
    cwd: Option<String>,
    cli_version: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

fn read_meta(lines: &[String]) -> RolloutMeta {
    let mut meta = RolloutMeta {
        session_id: None,
        cwd: None,
        cli_version: None,
        created_at: None,
    };
    for line in lines {
        let Ok(value) = serde_json::from_str::<Value>(line.trim()) else {
            continue;
        };
        if value.get("type").and_then(Value::as_str) != Some("session_meta") {
            continue;
        }
        let payload = value.get("payload").unwrap_or(&Value::Null);
        meta.session_id = payload.get("id").and_then(Value::as_str).map(String::from);
        meta.cwd = payload.get("cwd").and_then(Value::as_str).map(String::from);
        meta.cli_version = payload
            .get("cli_version")
            .and_then(Value::as_str)
            .map(String::from);
        meta.created_at = value
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_instant);
        break;
    }
    meta
}

fn content_text(payload: &Value) -> String {
    match payload.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

async fn summarize(path: PathBuf, scope: ScopeHint) -> Option<SessionSummary> {
    let lines = read_lines(&path).await.ok()?;
    let meta = read_meta(&lines);
    let session_id = meta
        .session_id
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()))?;

    if !scope.matches(meta.cwd.as_deref()) {
        return None;
    }

    // First user prompt for the title; stop as soon as one is found.
    let mut title = None;
    for line in &lines {
        let Ok(value) = serde_json::from_str::<Value>(line.trim()) else {
            continue;
        };
        if value.get("type").and_then(Value::as_str) != Some("response_item") {
            continue;
        }
        let payload = value.get("payload").unwrap_or(&Value::Null);
        if payload.get("type").and_then(Value::as_str) == Some("message")
            && payload.get("role").and_then(Value::as_str) == Some("user")
        {
            title = super::title_from_text(&content_text(payload));
            if title.is_some() {
                break;
            }
        }
    }

    Some(SessionSummary {
        title: title.unwrap_or_else(|| session_id.clone()),
        session_id,
        provider: Provider::Codex,
        created_at: meta.created_at,
        updated_at: file_mtime(&path),
        message_count: None,
    })
}

#[async_trait]
impl SessionFinder for Codex {
    async fn list_sessions(&self, scope: &ScopeHint) -> Vec<SessionSummary> {
        let files = rollout_files().await;
        let mut summaries = scan_candidates(files, |path| summarize(path, scope.clone())).await;
        sort_newest_first(&mut summaries);
        summaries
    }

    async fn find_session(&self, session_id: &str) -> Option<SessionLocation> {
        for path in rollout_files().await {
            let stem = path.file_stem().map(|s| s.to_string_lossy().to_string());
            let by_name = stem
                .as_deref()
                .map(|s| s.contains(session_id))
                .unwrap_or(false);
            let matched = by_name || {
                match read_lines(&path).await {
                    Ok(lines) => read_meta(&lines).session_id.as_deref() == Some(session_id),
                    Err(_) => false,
                }
            };
            if matched {
                return Some(SessionLocation {
                    provider: Provider::Codex,
                    session_id: session_id.to_string(),
                    path,
                });
            }
        }
        None
    }
}

fn push_response_item(
    payload: &Value,
    ts: Option<DateTime<Utc>>,
    models: &mut ModelCounter,
    out: &mut Vec<ParsedMessage>,
) {
    match payload.get("type").and_then(Value::as_str) {
        Some("message") => {
            let text = content_text(payload);
            if text.trim().is_empty() {
                return;
            }
            let content = vec![classified_text(&text)];
            match payload.get("role").and_then(Value::as_str) {
                Some("user") => out.push(ParsedMessage::user(content).with_timestamp(ts)),
                Some("assistant") => {
                    if let Some(model) = payload.get("model").and_then(Value::as_str) {
                        models.record(model);
                    }
                    out.push(ParsedMessage::assistant_text(content).with_timestamp(ts));
                }
                // system/developer instructions and unknown roles stay visible
                other => out.push(
                    ParsedMessage::info(other.unwrap_or("message").to_string())
                        .with_timestamp(ts),
                ),
            }
        }
        Some("reasoning") => {
            let summary = payload
                .get("summary")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|i| i.get("text").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default();
            if !summary.trim().is_empty() {
                out.push(ParsedMessage::assistant_thinking(summary).with_timestamp(ts));
            }
        }
        Some("function_call") => {
            let name = payload
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("function");
            // arguments arrive as a JSON-encoded string
            let args = payload
                .get("arguments")
                .and_then(Value::as_str)
                .and_then(|raw| serde_json::from_str::<Value>(raw).ok());
            let mut msg = ParsedMessage::tool_use(name, input_pairs(args.as_ref()))
                .with_timestamp(ts);
            if let Some(id) = payload.get("call_id").and_then(Value::as_str) {
                msg = msg.with_tool_call_id(id);
            }
            out.push(msg);
        }
        Some("function_call_output") => {
            let raw_output = payload.get("output").cloned().unwrap_or(Value::Null);
            // Output is often itself a JSON-encoded string.
            let text = match &raw_output {
                Value::String(s) => match serde_json::from_str::<Value>(s) {
                    Ok(inner) => extract_primary_field(&inner),
                    Err(_) => s.clone(),
                },
                other => extract_primary_field(other),
            };
            let data = ToolResultData {
                tool_name: None,
                tool_call_id: payload
                    .get("call_id")
                    .and_then(Value::as_str)
                    .map(String::from),
                output: vec![MessageContent::text(truncate_output(&text))],
                is_error: false,
                timestamp: ts,
            };
            out.push(ParsedMessage::tool_result(data));
        }
        _ => {
            // Unknown item kinds stay visible as raw JSON.
            out.push(
                ParsedMessage::Info {
                    title: "response item".to_string(),
                    subtitle: None,
                    content: Some(MessageContent::json(payload.to_string())),
                    style: Default::default(),
                    timestamp: ts,
                },
            );
        }
    }
}

/// Record types this adapter does not know stay visible as raw JSON.
fn out_unknown_record(
    kind: &str,
    value: &Value,
    ts: Option<DateTime<Utc>>,
    out: &mut Vec<ParsedMessage>,
) {
    debug!("codex: unknown record type {kind}");
    out.push(ParsedMessage::Info {
        title: kind.to_string(),
        subtitle: None,
        content: Some(MessageContent::json(value.to_string())),
        style: Default::default(),
        timestamp: ts,
    });
}

#[async_trait]
impl SessionParser for Codex {
    async fn parse(&self, location: &SessionLocation) -> Option<SessionDetail> {
        let lines = match read_lines(&location.path).await {
            Ok(lines) => lines,
            Err(err) => {
                debug!("codex session unreadable: {err}");
                return None;
            }
        };

        let meta = read_meta(&lines);
        let mut metadata = SessionMetadata {
            tool_version: meta.cli_version,
            working_directory: meta.cwd,
            created_at: meta.created_at,
            modified_at: file_mtime(&location.path),
            ..Default::default()
        };

        let mut messages: Vec<ParsedMessage> = Vec::new();
        let mut models = ModelCounter::default();

        for line in &lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(_) => {
                    messages.push(malformed_record("rollout line", line));
                    continue;
                }
            };
            let ts = value
                .get("timestamp")
                .and_then(Value::as_str)
                .and_then(parse_instant);

            match value.get("type").and_then(Value::as_str) {
                Some("response_item") => {
                    let payload = value.get("payload").unwrap_or(&Value::Null);
                    push_response_item(payload, ts, &mut models, &mut messages);
                }
                // Duplicates of response_item messages; also meta/turn records.
                Some("session_meta") | Some("event_msg") | Some("turn_context") => {}
                Some(other) => {
                    out_unknown_record(other, &value, ts, &mut messages);
                }
                None => messages.push(malformed_record("rollout line", line)),
            }
        }

        let messages = correlate_tool_results(messages);
        metadata.message_count = Some(messages.len());
        metadata.model_usage = models.into_usage();

        Some(SessionDetail {
            title: derive_title(&messages, &location.session_id),
            session_id: location.session_id.clone(),
            messages,
            metadata: Some(metadata),
        })
    }
}
