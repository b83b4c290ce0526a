// crates/engine/src/providers/goose.rs
//! Goose adapter.
//!
//! Storage: `~/.local/share/goose/sessions/<id>.jsonl`. The first line is
//! a metadata header (`description`, `working_dir`, optional counters);
//! every following line is one message whose `content` array mixes text,
//! thinking, toolRequest and toolResponse blocks. Message times are epoch
//! seconds under `created`.

use super::{
    classified_text, derive_title, input_pairs, malformed_record, provider_root, read_lines,
    scan_candidates, sort_newest_first, ModelCounter, ScopeHint, SessionFinder, SessionLocation,
    SessionParser,
};
use crate::correlate::correlate_tool_results;
use crate::timeutil::{file_mtime, parse_epoch};
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

pub struct Goose;

const ROOT_ENV: &str = "AGENT_VIEW_GOOSE_ROOT";

fn root() -> Option<PathBuf> {
    provider_root(ROOT_ENV, &[".local", "share", "goose", "sessions"])
}

async fn session_files() -> Vec<PathBuf> {
    let Some(root) = root() else { return Vec::new() };
    let Ok(mut entries) = tokio::fs::read_dir(&root).await else {
        return Vec::new();
    };
    let mut files = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().map(|e| e == "jsonl").unwrap_or(false) {
            files.push(path);
        }
    }
    files
}

/// The header is the first line; anything else fails the shape check.
fn parse_header(lines: &[String]) -> Option<Value> {
    let first = lines.first()?.trim();
    let header: Value = serde_json::from_str(first).ok()?;
    header.is_object().then_some(header)
}

async fn summarize(path: PathBuf, scope: ScopeHint) -> Option<SessionSummary> {
    let lines = read_lines(&path).await.ok()?;
    let header = parse_header(&lines)?;

    let working_dir = header.get("working_dir").and_then(Value::as_str);
    if !scope.matches(working_dir) {
        return None;
    }

    let session_id = path.file_stem()?.to_string_lossy().to_string();
    let created_at = lines.iter().skip(1).find_map(|line| {
        serde_json::from_str::<Value>(line.trim())
            .ok()?
            .get("created")
            .and_then(Value::as_i64)
            .and_then(parse_epoch)
    });

    Some(SessionSummary {
        title: header
            .get("description")
            .and_then(Value::as_str)
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(&session_id)
            .to_string(),
        session_id,
        provider: Provider::Goose,
        created_at,
        updated_at: file_mtime(&path),
        message_count: header
            .get("message_count")
            .and_then(Value::as_u64)
            .map(|n| n as usize),
    })
}

#[async_trait]
impl SessionFinder for Goose {
    async fn list_sessions(&self, scope: &ScopeHint) -> Vec<SessionSummary> {
        let files = session_files().await;
        let mut summaries = scan_candidates(files, |path| summarize(path, scope.clone())).await;
        sort_newest_first(&mut summaries);
        summaries
    }

    async fn find_session(&self, session_id: &str) -> Option<SessionLocation> {
        let root = root()?;
        let path = root.join(format!("{session_id}.jsonl"));
        if !path.is_file() {
            return None;
        }
        Some(SessionLocation {
            provider: Provider::Goose,
            session_id: session_id.to_string(),
            path,
        })
    }
}

fn push_blocks(record: &Value, models: &mut ModelCounter, out: &mut Vec<ParsedMessage>) {
    let ts: Option<DateTime<Utc>> = record
        .get("created")
        .and_then(Value::as_i64)
        .and_then(parse_epoch);
    let role = record.get("role").and_then(Value::as_str).unwrap_or("");

    if role == "assistant" {
        if let Some(model) = record.get("model").and_then(Value::as_str) {
            models.record(model);
        }
    }

    let Some(blocks) = record.get("content").and_then(Value::as_array) else {
        out.push(
            ParsedMessage::error_info(
                "Unreadable message",
                Some(MessageContent::json(record.to_string())),
            )
            .with_timestamp(ts),
        );
        return;
    };

    let mut texts: Vec<MessageContent> = Vec::new();
    // position of the first text block, so the joined text message lands
    // where the provider put it
    let mut text_at: Option<usize> = None;
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    if !text.trim().is_empty() {
                        text_at.get_or_insert(out.len());
                        texts.push(classified_text(text));
                    }
                }
            }
            Some("thinking") => {
                let text = block.get("thinking").and_then(Value::as_str).unwrap_or("");
                if !text.trim().is_empty() {
                    out.push(ParsedMessage::assistant_thinking(text).with_timestamp(ts));
                }
            }
            Some("toolRequest") => {
                let call = block
                    .get("toolCall")
                    .and_then(|c| c.get("value"))
                    .unwrap_or(&Value::Null);
                let name = call.get("name").and_then(Value::as_str).unwrap_or("tool");
                let mut msg =
                    ParsedMessage::tool_use(name, input_pairs(call.get("arguments")))
                        .with_timestamp(ts);
                if let Some(id) = block.get("id").and_then(Value::as_str) {
                    msg = msg.with_tool_call_id(id);
                }
                out.push(msg);
            }
            Some("toolResponse") => {
                let result = block.get("toolResult").unwrap_or(&Value::Null);
                let is_error = result.get("status").and_then(Value::as_str) == Some("error");
                let text = extract_primary_field(result.get("value").unwrap_or(result));
                let data = ToolResultData {
                    tool_name: None,
                    tool_call_id: block.get("id").and_then(Value::as_str).map(String::from),
                    output: vec![MessageContent::text(truncate_output(&text))],
                    is_error,
                    timestamp: ts,
                };
                out.push(ParsedMessage::tool_result(data));
            }
            _ => out.push(
                ParsedMessage::Info {
                    title: "block".to_string(),
                    subtitle: None,
                    content: Some(MessageContent::json(block.to_string())),
                    style: Default::default(),
                    timestamp: ts,
                },
            ),
        }
    }

    if !texts.is_empty() {
        let msg = match role {
            "user" => ParsedMessage::user(texts),
            _ => ParsedMessage::assistant_text(texts),
        };
        out.insert(text_at.unwrap_or(out.len()), msg.with_timestamp(ts));
    }
}

#[async_trait]
impl SessionParser for Goose {
    async fn parse(&self, location: &SessionLocation) -> Option<SessionDetail> {
        let lines = match read_lines(&location.path).await {
            Ok(lines) => lines,
            Err(err) => {
                debug!("goose session unreadable: {err}");
                return None;
            }
        };
        let header = parse_header(&lines)?;

        let mut messages = Vec::new();
        let mut models = ModelCounter::default();
        for line in lines.iter().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(record) => push_blocks(&record, &mut models, &mut messages),
                Err(_) => messages.push(malformed_record("session line", line)),
            }
        }
        let messages = correlate_tool_results(messages);

        let metadata = SessionMetadata {
            working_directory: header
                .get("working_dir")
                .and_then(Value::as_str)
                .map(String::from),
            created_at: messages.iter().find_map(|m| m.timestamp()),
            modified_at: file_mtime(&location.path),
            message_count: Some(messages.len()),
            model_usage: models.into_usage(),
            ..Default::default()
        };

        let title = header
            .get("description")
            .and_then(Value::as_str)
            .filter(|d| !d.trim().is_empty())
            .map(String::from)
            .unwrap_or_else(|| derive_title(&messages, &location.session_id));

        Some(SessionDetail {
            session_id: location.session_id.clone(),
            title,
            messages,
            metadata: Some(metadata),
        })
    }
}
