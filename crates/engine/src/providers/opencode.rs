// crates/engine/src/providers/opencode.rs
//! OpenCode adapter.
//!
//! Storage root `~/.local/share/opencode/storage` with three directories
//! joined by filename-derived ids:
//!
//! ```text
//! session/<sessionId>.json          session metadata
//! message/<sessionId>/<msgId>.json  one record per message
//! part/<msgId>/<partId>.json        typed content parts of a message
//! ```
//!
//! Timestamps are epoch milliseconds under `time.{created,updated,start}`.
//! Parts are ordered by their start timestamp; parts without one keep
//! enumeration order.

use super::{
    classified_text, derive_title, input_pairs, provider_root, scan_candidates,
    sort_newest_first, ModelCounter, ScopeHint, SessionFinder, SessionLocation, SessionParser,
};
use crate::correlate::correlate_tool_results;
use crate::timeutil::parse_epoch;
use agent_view_types::{
    MessageContent, ParsedMessage, Provider, SessionDetail, SessionMetadata, SessionSummary,
    ToolResultData,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct OpenCode;

const ROOT_ENV: &str = "AGENT_VIEW_OPENCODE_ROOT";

fn root() -> Option<PathBuf> {
    provider_root(ROOT_ENV, &[".local", "share", "opencode", "storage"])
}

fn epoch_of(value: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    let mut cursor = value;
    for key in keys {
        cursor = cursor.get(key)?;
    }
    cursor.as_i64().and_then(parse_epoch)
}

async fn read_doc(path: &Path) -> Option<Value> {
    let text = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str::<Value>(&text) {
        Ok(doc) => Some(doc),
        Err(err) => {
            debug!("opencode: unreadable document {}: {err}", path.display());
            None
        }
    }
}

/// Sorted `.json` entries of a directory; missing directory is empty.
async fn json_entries(dir: &Path) -> Vec<PathBuf> {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return Vec::new();
    };
    let mut paths = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            paths.push(path);
        }
    }
    paths.sort();
    paths
}

async fn message_count(storage: &Path, session_id: &str) -> Option<usize> {
    let dir = storage.join("message").join(session_id);
    match tokio::fs::read_dir(&dir).await {
        Ok(mut entries) => {
            let mut count = 0;
            while let Ok(Some(_)) = entries.next_entry().await {
                count += 1;
            }
            Some(count)
        }
        Err(_) => None,
    }
}

async fn summarize(session_file: PathBuf, scope: ScopeHint) -> Option<SessionSummary> {
    let doc = read_doc(&session_file).await?;
    let directory = doc.get("directory").and_then(Value::as_str);
    if !scope.matches(directory) {
        return None;
    }
    let session_id = doc
        .get("id")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| {
            session_file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
        })?;

    let storage = session_file.parent()?.parent()?;
    let count = message_count(storage, &session_id).await;

    Some(SessionSummary {
        title: doc
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&session_id)
            .to_string(),
        session_id,
        provider: Provider::OpenCode,
        created_at: epoch_of(&doc, &["time", "created"]),
        updated_at: epoch_of(&doc, &["time", "updated"]),
        message_count: count,
    })
}

#[async_trait]
impl SessionFinder for OpenCode {
    async fn list_sessions(&self, scope: &ScopeHint) -> Vec<SessionSummary> {
        let Some(root) = root() else { return Vec::new() };
        let files = json_entries(&root.join("session")).await;
        let mut summaries = scan_candidates(files, |path| summarize(path, scope.clone())).await;
        sort_newest_first(&mut summaries);
        summaries
    }

    async fn find_session(&self, session_id: &str) -> Option<SessionLocation> {
        let root = root()?;
        let path = root.join("session").join(format!("{session_id}.json"));
        if !path.is_file() {
            return None;
        }
        Some(SessionLocation {
            provider: Provider::OpenCode,
            session_id: session_id.to_string(),
            path,
        })
    }
}

struct Part {
    start: Option<i64>,
    value: Value,
}

/// Message parts ordered by start time; stable sort keeps enumeration
/// order for parts carrying no timestamp.
async fn ordered_parts(storage: &Path, message_id: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    for path in json_entries(&storage.join("part").join(message_id)).await {
        let Some(value) = read_doc(&path).await else {
            continue;
        };
        let start = value
            .get("time")
            .and_then(|t| t.get("start"))
            .and_then(Value::as_i64);
        parts.push(Part { start, value });
    }
    parts.sort_by_key(|p| p.start.unwrap_or(i64::MAX));
    parts
}

fn push_parts(
    role: &str,
    parts: &[Part],
    ts: Option<DateTime<Utc>>,
    out: &mut Vec<ParsedMessage>,
) {
    let mut texts: Vec<MessageContent> = Vec::new();
    // position of the first text part, so the joined text message lands
    // where the provider put it
    let mut text_at: Option<usize> = None;
    for part in parts {
        let part_ts = part.start.and_then(parse_epoch).or(ts);
        match part.value.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = part.value.get("text").and_then(Value::as_str) {
                    if !text.trim().is_empty() {
                        text_at.get_or_insert(out.len());
                        texts.push(classified_text(text));
                    }
                }
            }
            Some("reasoning") => {
                let text = part.value.get("text").and_then(Value::as_str).unwrap_or("");
                if !text.trim().is_empty() {
                    out.push(ParsedMessage::assistant_thinking(text).with_timestamp(part_ts));
                }
            }
            Some("tool") => {
                let name = part.value.get("tool").and_then(Value::as_str).unwrap_or("tool");
                let call_id = part.value.get("callID").and_then(Value::as_str);
                let state = part.value.get("state").unwrap_or(&Value::Null);

                let mut msg = ParsedMessage::tool_use(name, input_pairs(state.get("input")))
                    .with_timestamp(part_ts);
                if let Some(id) = call_id {
                    msg = msg.with_tool_call_id(id);
                }
                out.push(msg);

                // The completed state carries the result inline; emit it
                // separately and let the correlator nest it.
                let error = state.get("error").and_then(Value::as_str);
                let output = error
                    .or_else(|| state.get("output").and_then(Value::as_str));
                if let Some(output) = output {
                    let data = ToolResultData {
                        tool_name: Some(name.to_string()),
                        tool_call_id: call_id.map(String::from),
                        output: vec![MessageContent::text(
                            crate::truncate::truncate_output(output),
                        )],
                        is_error: error.is_some(),
                        timestamp: part_ts,
                    };
                    out.push(ParsedMessage::tool_result(data));
                }
            }
            // step markers and file snapshots carry no user-facing content
            Some("step-start") | Some("step-finish") | Some("snapshot") => {}
            _ => {
                out.push(
                    ParsedMessage::Info {
                        title: "part".to_string(),
                        subtitle: None,
                        content: Some(MessageContent::json(part.value.to_string())),
                        style: Default::default(),
                        timestamp: part_ts,
                    },
                );
            }
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
impl SessionParser for OpenCode {
    async fn parse(&self, location: &SessionLocation) -> Option<SessionDetail> {
        let session_doc = read_doc(&location.path).await?;
        let storage = location.path.parent()?.parent()?;

        // Enumerate messages, ordered by creation time (file order breaks ties).
        let mut message_docs = Vec::new();
        for path in json_entries(&storage.join("message").join(&location.session_id)).await {
            let Some(doc) = read_doc(&path).await else {
                continue;
            };
            let message_id = doc
                .get("id")
                .and_then(Value::as_str)
                .map(String::from)
                .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()));
            let Some(message_id) = message_id else {
                continue;
            };
            let created = epoch_of(&doc, &["time", "created"]);
            message_docs.push((created, message_id, doc));
        }
        message_docs.sort_by_key(|(created, _, _)| *created);

        let mut messages = Vec::new();
        let mut models = ModelCounter::default();
        for (created, message_id, doc) in &message_docs {
            let role = doc.get("role").and_then(Value::as_str).unwrap_or("assistant");
            if role == "assistant" {
                if let Some(model) = doc.get("modelID").and_then(Value::as_str) {
                    models.record(model);
                }
            }
            let parts = ordered_parts(storage, message_id).await;
            push_parts(role, &parts, *created, &mut messages);
        }
        let messages = correlate_tool_results(messages);

        let metadata = SessionMetadata {
            tool_version: session_doc
                .get("version")
                .and_then(Value::as_str)
                .map(String::from),
            working_directory: session_doc
                .get("directory")
                .and_then(Value::as_str)
                .map(String::from),
            created_at: epoch_of(&session_doc, &["time", "created"]),
            modified_at: epoch_of(&session_doc, &["time", "updated"]),
            message_count: Some(messages.len()),
            model_usage: models.into_usage(),
            ..Default::default()
        };

        let title = session_doc
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
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
