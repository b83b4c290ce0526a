// crates/engine/src/providers/pi.rs
//! Pi adapter.
//!
//! Storage: `~/.pi/agent/sessions/<sanitized-cwd>/<timestamp>_<uuid>.jsonl`.
//! The first line is a session header (`type: "session"`, id, cwd,
//! timestamp); every following line wraps one message whose `content`
//! array mixes text, thinking and toolCall blocks. Tool results arrive as
//! whole messages with role `toolResult`. The directory name encodes the
//! cwd, but the header is authoritative and is what scope filtering reads.

use super::{
    classified_text, derive_title, input_pairs, malformed_record, provider_root, read_lines,
    scan_candidates, sort_newest_first, title_from_text, ModelCounter, ScopeHint, SessionFinder,
    SessionLocation, SessionParser,
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

pub struct Pi;

const ROOT_ENV: &str = "AGENT_VIEW_PI_ROOT";

fn root() -> Option<PathBuf> {
    provider_root(ROOT_ENV, &[".pi", "agent", "sessions"])
}

async fn session_files() -> Vec<PathBuf> {
    let Some(root) = root() else { return Vec::new() };
    let Ok(mut dirs) = tokio::fs::read_dir(&root).await else {
        return Vec::new();
    };
    let mut files = Vec::new();
    while let Ok(Some(dir_entry)) = dirs.next_entry().await {
        let dir = dir_entry.path();
        if !dir.is_dir() {
            continue;
        }
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().map(|e| e == "jsonl").unwrap_or(false) {
                files.push(path);
            }
        }
    }
    files
}

/// Session header, first line only. A file whose first line is not a
/// `session` record fails the shape check.
fn parse_header(lines: &[String]) -> Option<Value> {
    let first = lines.first()?.trim();
    let header: Value = serde_json::from_str(first).ok()?;
    (header.get("type").and_then(Value::as_str) == Some("session")).then_some(header)
}

fn header_str<'a>(header: &'a Value, key: &str) -> Option<&'a str> {
    header.get(key).and_then(Value::as_str)
}

async fn summarize(path: PathBuf, scope: ScopeHint) -> Option<SessionSummary> {
    let lines = read_lines(&path).await.ok()?;
    let header = parse_header(&lines)?;

    if !scope.matches(header_str(&header, "cwd")) {
        return None;
    }

    let session_id = header_str(&header, "id")
        .map(String::from)
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()))?;

    let title = lines.iter().skip(1).find_map(|line| {
        let record = serde_json::from_str::<Value>(line.trim()).ok()?;
        let message = record.get("message")?;
        if message.get("role").and_then(Value::as_str) != Some("user") {
            return None;
        }
        let blocks = message.get("content").and_then(Value::as_array)?;
        blocks
            .iter()
            .find_map(|b| b.get("text").and_then(Value::as_str))
            .and_then(title_from_text)
    });

    Some(SessionSummary {
        title: title.unwrap_or_else(|| session_id.clone()),
        session_id,
        provider: Provider::Pi,
        created_at: header_str(&header, "timestamp").and_then(parse_instant),
        updated_at: file_mtime(&path),
        message_count: None,
    })
}

#[async_trait]
impl SessionFinder for Pi {
    async fn list_sessions(&self, scope: &ScopeHint) -> Vec<SessionSummary> {
        let files = session_files().await;
        let mut summaries = scan_candidates(files, |path| summarize(path, scope.clone())).await;
        sort_newest_first(&mut summaries);
        summaries
    }

    async fn find_session(&self, session_id: &str) -> Option<SessionLocation> {
        for path in session_files().await {
            let by_name = path
                .file_stem()
                .map(|s| s.to_string_lossy().contains(session_id))
                .unwrap_or(false);
            let matched = by_name || {
                match read_lines(&path).await {
                    Ok(lines) => parse_header(&lines)
                        .and_then(|h| header_str(&h, "id").map(String::from))
                        .as_deref()
                        == Some(session_id),
                    Err(_) => false,
                }
            };
            if matched {
                return Some(SessionLocation {
                    provider: Provider::Pi,
                    session_id: session_id.to_string(),
                    path,
                });
            }
        }
        None
    }
}

fn push_tool_result(message: &Value, ts: Option<DateTime<Utc>>, out: &mut Vec<ParsedMessage>) {
    let text = match message.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => extract_primary_field(other),
        None => extract_primary_field(message),
    };
    let data = ToolResultData {
        tool_name: message
            .get("toolName")
            .and_then(Value::as_str)
            .map(String::from),
        tool_call_id: message
            .get("toolCallId")
            .and_then(Value::as_str)
            .map(String::from),
        output: vec![MessageContent::text(truncate_output(&text))],
        is_error: message
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        timestamp: ts,
    };
    out.push(ParsedMessage::tool_result(data));
}

fn push_message(record: &Value, models: &mut ModelCounter, out: &mut Vec<ParsedMessage>) {
    let ts = record
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_instant);
    let Some(message) = record.get("message") else {
        out.push(malformed_record("entry", &record.to_string()));
        return;
    };
    let role = message.get("role").and_then(Value::as_str).unwrap_or("");

    if role == "toolResult" {
        push_tool_result(message, ts, out);
        return;
    }
    if role == "assistant" {
        if let Some(model) = message.get("model").and_then(Value::as_str) {
            models.record(model);
        }
    }

    let Some(blocks) = message.get("content").and_then(Value::as_array) else {
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
            Some("toolCall") => {
                let name = block.get("name").and_then(Value::as_str).unwrap_or("tool");
                let mut msg =
                    ParsedMessage::tool_use(name, input_pairs(block.get("arguments")))
                        .with_timestamp(ts);
                if let Some(id) = block.get("id").and_then(Value::as_str) {
                    msg = msg.with_tool_call_id(id);
                }
                out.push(msg);
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
impl SessionParser for Pi {
    async fn parse(&self, location: &SessionLocation) -> Option<SessionDetail> {
        let lines = match read_lines(&location.path).await {
            Ok(lines) => lines,
            Err(err) => {
                debug!("pi session unreadable: {err}");
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
                Ok(record) => push_message(&record, &mut models, &mut messages),
                Err(_) => messages.push(malformed_record("session line", line)),
            }
        }
        let messages = correlate_tool_results(messages);

        let metadata = SessionMetadata {
            tool_version: header_str(&header, "version").map(String::from),
            working_directory: header_str(&header, "cwd").map(String::from),
            created_at: header_str(&header, "timestamp").and_then(parse_instant),
            modified_at: file_mtime(&location.path),
            message_count: Some(messages.len()),
            model_usage: models.into_usage(),
            ..Default::default()
        };

        Some(SessionDetail {
            title: derive_title(&messages, &location.session_id),
            session_id: location.session_id.clone(),
            messages,
            metadata: Some(metadata),
        })
    }
}
