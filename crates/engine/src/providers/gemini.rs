// crates/engine/src/providers/gemini.rs
//! Gemini CLI adapter.
//!
//! Storage: `~/.gemini/tmp/<project-hash>/chats/*.json`, one JSON document
//! per session. The project-hash directory carries a `.project_root` marker
//! file naming the working directory the hash was derived from; scope
//! filtering reads the marker instead of reversing the hash.

use super::{
    classified_text, derive_title, input_pairs, provider_root, scan_candidates,
    sort_newest_first, title_from_text, ModelCounter, ScopeHint, SessionFinder, SessionLocation,
    SessionParser,
};
use crate::correlate::correlate_tool_results;
use crate::timeutil::{file_mtime, instant_from_value};
use crate::truncate::{extract_primary_field, truncate_output};
use agent_view_types::{
    MessageContent, ParsedMessage, Provider, SessionDetail, SessionMetadata, SessionSummary,
    ToolResultData,
};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct Gemini;

const ROOT_ENV: &str = "AGENT_VIEW_GEMINI_ROOT";
const PROJECT_ROOT_MARKER: &str = ".project_root";

fn root() -> Option<PathBuf> {
    provider_root(ROOT_ENV, &[".gemini", "tmp"])
}

/// Working directory recorded for a project-hash directory, if the marker
/// file is present and readable.
async fn project_root_of(hash_dir: &Path) -> Option<String> {
    let marker = hash_dir.join(PROJECT_ROOT_MARKER);
    let text = tokio::fs::read_to_string(marker).await.ok()?;
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(line.to_string())
}

/// All `(chat file, project root)` candidates under the storage root.
async fn chat_files() -> Vec<(PathBuf, Option<String>)> {
    let Some(root) = root() else { return Vec::new() };
    let Ok(mut hashes) = tokio::fs::read_dir(&root).await else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    while let Ok(Some(hash_entry)) = hashes.next_entry().await {
        let hash_dir = hash_entry.path();
        if !hash_dir.is_dir() {
            continue;
        }
        let project = project_root_of(&hash_dir).await;
        let Ok(mut chats) = tokio::fs::read_dir(hash_dir.join("chats")).await else {
            continue;
        };
        while let Ok(Some(chat)) = chats.next_entry().await {
            let path = chat.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                candidates.push((path, project.clone()));
            }
        }
    }
    candidates
}

async fn read_doc(path: &Path) -> Option<Value> {
    let text = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str::<Value>(&text) {
        Ok(doc) => Some(doc),
        Err(err) => {
            debug!("gemini: unreadable chat document {}: {err}", path.display());
            None
        }
    }
}

fn session_id_of(doc: &Value, path: &Path) -> Option<String> {
    doc.get("sessionId")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()))
}

async fn summarize(
    candidate: (PathBuf, Option<String>),
    scope: ScopeHint,
) -> Option<SessionSummary> {
    let (path, project) = candidate;
    if !scope.matches(project.as_deref()) {
        return None;
    }
    let doc = read_doc(&path).await?;
    let messages = doc.get("messages").and_then(Value::as_array)?;

    let title = messages
        .iter()
        .filter(|m| m.get("type").and_then(Value::as_str) == Some("user"))
        .find_map(|m| m.get("content").and_then(Value::as_str))
        .and_then(title_from_text);

    let session_id = session_id_of(&doc, &path)?;
    Some(SessionSummary {
        title: title.unwrap_or_else(|| session_id.clone()),
        session_id,
        provider: Provider::Gemini,
        created_at: instant_from_value(doc.get("startTime")),
        updated_at: instant_from_value(doc.get("lastUpdated")).or_else(|| file_mtime(&path)),
        message_count: Some(messages.len()),
    })
}

#[async_trait]
impl SessionFinder for Gemini {
    async fn list_sessions(&self, scope: &ScopeHint) -> Vec<SessionSummary> {
        let candidates = chat_files().await;
        let mut summaries =
            scan_candidates(candidates, |candidate| summarize(candidate, scope.clone())).await;
        sort_newest_first(&mut summaries);
        summaries
    }

    async fn find_session(&self, session_id: &str) -> Option<SessionLocation> {
        for (path, _) in chat_files().await {
            let by_name = path
                .file_stem()
                .map(|s| s.to_string_lossy() == session_id)
                .unwrap_or(false);
            let matched = by_name || {
                match read_doc(&path).await {
                    Some(doc) => {
                        doc.get("sessionId").and_then(Value::as_str) == Some(session_id)
                    }
                    None => false,
                }
            };
            if matched {
                return Some(SessionLocation {
                    provider: Provider::Gemini,
                    session_id: session_id.to_string(),
                    path,
                });
            }
        }
        None
    }
}

fn push_message(record: &Value, models: &mut ModelCounter, out: &mut Vec<ParsedMessage>) {
    let ts = instant_from_value(record.get("timestamp"));
    let content_text = record.get("content").and_then(Value::as_str).unwrap_or("");

    match record.get("type").and_then(Value::as_str) {
        Some("user") => {
            out.push(
                ParsedMessage::user(vec![classified_text(content_text)]).with_timestamp(ts),
            );
        }
        Some("gemini") => {
            if let Some(model) = record.get("model").and_then(Value::as_str) {
                models.record(model);
            }
            // thoughts precede the answer in the document order
            if let Some(thoughts) = record.get("thoughts").and_then(Value::as_array) {
                let text = thoughts
                    .iter()
                    .map(|t| {
                        let subject = t.get("subject").and_then(Value::as_str).unwrap_or("");
                        let desc = t.get("description").and_then(Value::as_str).unwrap_or("");
                        if subject.is_empty() {
                            desc.to_string()
                        } else {
                            format!("{subject}: {desc}")
                        }
                    })
                    .filter(|t| !t.trim().is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                if !text.is_empty() {
                    out.push(ParsedMessage::assistant_thinking(text).with_timestamp(ts));
                }
            }
            if !content_text.trim().is_empty() {
                out.push(
                    ParsedMessage::assistant_text(vec![classified_text(content_text)])
                        .with_timestamp(ts),
                );
            }
        }
        Some("tool") => {
            let name = record
                .get("toolName")
                .and_then(Value::as_str)
                .unwrap_or("tool");
            let mut msg =
                ParsedMessage::tool_use(name, input_pairs(record.get("args"))).with_timestamp(ts);
            if let Some(id) = record.get("callId").and_then(Value::as_str) {
                msg = msg.with_tool_call_id(id);
            }
            out.push(msg);
        }
        Some("tool_result") => {
            let text = record
                .get("resultDisplay")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| {
                    extract_primary_field(record.get("result").unwrap_or(&Value::Null))
                });
            let data = ToolResultData {
                tool_name: record
                    .get("toolName")
                    .and_then(Value::as_str)
                    .map(String::from),
                tool_call_id: record
                    .get("callId")
                    .and_then(Value::as_str)
                    .map(String::from),
                output: vec![MessageContent::text(truncate_output(&text))],
                is_error: record.get("status").and_then(Value::as_str) == Some("error"),
                timestamp: ts,
            };
            out.push(ParsedMessage::tool_result(data));
        }
        Some("error") => {
            out.push(
                ParsedMessage::error_info(
                    "Error",
                    (!content_text.is_empty()).then(|| MessageContent::text(content_text)),
                )
                .with_timestamp(ts),
            );
        }
        Some("info") => {
            out.push(
                ParsedMessage::Info {
                    title: "Info".to_string(),
                    subtitle: None,
                    content: (!content_text.is_empty())
                        .then(|| classified_text(content_text)),
                    style: Default::default(),
                    timestamp: ts,
                },
            );
        }
        other => {
            // Unknown message types stay visible as raw JSON.
            out.push(
                ParsedMessage::Info {
                    title: other.unwrap_or("message").to_string(),
                    subtitle: None,
                    content: Some(MessageContent::json(record.to_string())),
                    style: Default::default(),
                    timestamp: ts,
                },
            );
        }
    }
}

#[async_trait]
impl SessionParser for Gemini {
    async fn parse(&self, location: &SessionLocation) -> Option<SessionDetail> {
        let doc = read_doc(&location.path).await?;
        // Minimal shape check: a chat document always carries a message array.
        let records = doc.get("messages").and_then(Value::as_array)?;

        let mut messages = Vec::new();
        let mut models = ModelCounter::default();
        for record in records {
            push_message(record, &mut models, &mut messages);
        }
        let messages = correlate_tool_results(messages);

        let project = match location.path.parent().and_then(Path::parent) {
            Some(hash_dir) => project_root_of(hash_dir).await,
            None => None,
        };

        let metadata = SessionMetadata {
            working_directory: project,
            created_at: instant_from_value(doc.get("startTime")),
            modified_at: instant_from_value(doc.get("lastUpdated"))
                .or_else(|| file_mtime(&location.path)),
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
