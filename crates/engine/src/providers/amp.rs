// crates/engine/src/providers/amp.rs
//! Amp adapter.
//!
//! Storage root `~/.local/share/amp`:
//!
//! ```text
//! project-map.json   project path -> workspace id
//! task-index.json    global index of tasks (workspace id, title, times)
//! tasks/<id>.json    one thread document per task
//! ```
//!
//! Listing sessions for a project is a double indirection: the map file
//! translates the path to a workspace id, the index yields that
//! workspace's task ids, and each task file holds the thread itself.
//! Timestamps are epoch milliseconds.

use super::{
    classified_text, derive_title, input_pairs, provider_root, sort_newest_first, ModelCounter,
    ScopeHint, SessionFinder, SessionLocation, SessionParser,
};
use crate::correlate::correlate_tool_results;
use crate::timeutil::parse_epoch;
use crate::truncate::{extract_primary_field, truncate_output};
use agent_view_types::{
    MessageContent, ParsedMessage, Provider, SessionDetail, SessionMetadata, SessionSummary,
    ToolResultData,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct Amp;

const ROOT_ENV: &str = "AGENT_VIEW_AMP_ROOT";

fn root() -> Option<PathBuf> {
    provider_root(ROOT_ENV, &[".local", "share", "amp"])
}

async fn read_doc(path: &Path) -> Option<Value> {
    let text = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str::<Value>(&text) {
        Ok(doc) => Some(doc),
        Err(err) => {
            debug!("amp: unreadable document {}: {err}", path.display());
            None
        }
    }
}

/// `project-map.json`: flat object mapping project path to workspace id.
async fn workspace_for(root: &Path, project: &Path) -> Option<String> {
    let map = read_doc(&root.join("project-map.json")).await?;
    map.get(project.to_string_lossy().as_ref())
        .and_then(Value::as_str)
        .map(String::from)
}

/// Reverse lookup for the parser: workspace id back to a project path.
async fn project_for(root: &Path, workspace_id: &str) -> Option<String> {
    let map = read_doc(&root.join("project-map.json")).await?;
    let object = map.as_object()?;
    object
        .iter()
        .find(|(_, v)| v.as_str() == Some(workspace_id))
        .map(|(path, _)| path.clone())
}

fn epoch_field(value: &Value, key: &str) -> Option<DateTime<Utc>> {
    value.get(key).and_then(Value::as_i64).and_then(parse_epoch)
}

#[async_trait]
impl SessionFinder for Amp {
    async fn list_sessions(&self, scope: &ScopeHint) -> Vec<SessionSummary> {
        let Some(root) = root() else { return Vec::new() };
        let Some(index) = read_doc(&root.join("task-index.json")).await else {
            return Vec::new();
        };
        let Some(tasks) = index.get("tasks").and_then(Value::as_array) else {
            return Vec::new();
        };

        // Scope resolution goes through the project map; an unmapped
        // project has no workspace and therefore no sessions.
        let workspace = match &scope.working_directory {
            Some(project) => match workspace_for(&root, project).await {
                Some(id) => Some(id),
                None => return Vec::new(),
            },
            None => None,
        };

        let mut summaries = Vec::new();
        for task in tasks {
            let task_workspace = task.get("workspaceId").and_then(Value::as_str);
            if let Some(want) = &workspace {
                if task_workspace != Some(want.as_str()) {
                    continue;
                }
            }
            let Some(id) = task.get("id").and_then(Value::as_str) else {
                continue;
            };
            summaries.push(SessionSummary {
                session_id: id.to_string(),
                title: task
                    .get("title")
                    .and_then(Value::as_str)
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or(id)
                    .to_string(),
                provider: Provider::Amp,
                created_at: epoch_field(task, "createdAt"),
                updated_at: epoch_field(task, "updatedAt"),
                message_count: None,
            });
        }
        sort_newest_first(&mut summaries);
        summaries
    }

    async fn find_session(&self, session_id: &str) -> Option<SessionLocation> {
        let root = root()?;
        let path = root.join("tasks").join(format!("{session_id}.json"));
        if !path.is_file() {
            return None;
        }
        Some(SessionLocation {
            provider: Provider::Amp,
            session_id: session_id.to_string(),
            path,
        })
    }
}

fn tool_result_block(block: &Value, ts: Option<DateTime<Utc>>) -> ParsedMessage {
    let output = match block.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => extract_primary_field(other),
        None => extract_primary_field(block),
    };
    let data = ToolResultData {
        tool_name: None,
        tool_call_id: block
            .get("toolUseId")
            .and_then(Value::as_str)
            .map(String::from),
        output: vec![MessageContent::text(truncate_output(&output))],
        is_error: block
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        timestamp: ts,
    };
    ParsedMessage::tool_result(data)
}

fn push_thread_message(record: &Value, models: &mut ModelCounter, out: &mut Vec<ParsedMessage>) {
    let ts = record
        .get("meta")
        .and_then(|m| m.get("sentAt"))
        .and_then(Value::as_i64)
        .and_then(parse_epoch);
    let role = record.get("role").and_then(Value::as_str).unwrap_or("");

    if role == "assistant" {
        if let Some(model) = record.get("model").and_then(Value::as_str) {
            models.record(model);
        }
    }

    let Some(blocks) = record.get("content").and_then(Value::as_array) else {
        // No block array at all: keep the record visible as raw JSON.
        out.push(
            ParsedMessage::error_info(
                "Unreadable thread message",
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
            Some("tool_use") => {
                let name = block.get("name").and_then(Value::as_str).unwrap_or("tool");
                let mut msg = ParsedMessage::tool_use(name, input_pairs(block.get("input")))
                    .with_timestamp(ts);
                if let Some(id) = block.get("id").and_then(Value::as_str) {
                    msg = msg.with_tool_call_id(id);
                }
                out.push(msg);
            }
            Some("tool_result") => out.push(tool_result_block(block, ts)),
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
impl SessionParser for Amp {
    async fn parse(&self, location: &SessionLocation) -> Option<SessionDetail> {
        let doc = read_doc(&location.path).await?;
        let records = doc.get("messages").and_then(Value::as_array)?;

        let mut messages = Vec::new();
        let mut models = ModelCounter::default();
        for record in records {
            push_thread_message(record, &mut models, &mut messages);
        }
        let messages = correlate_tool_results(messages);

        let working_directory = match (
            location.path.parent().and_then(Path::parent),
            doc.get("workspaceId").and_then(Value::as_str),
        ) {
            (Some(root), Some(workspace)) => project_for(root, workspace).await,
            _ => None,
        };

        let metadata = SessionMetadata {
            working_directory,
            created_at: epoch_field(&doc, "createdAt"),
            modified_at: epoch_field(&doc, "updatedAt"),
            message_count: Some(messages.len()),
            model_usage: models.into_usage(),
            ..Default::default()
        };

        let title = doc
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use tempfile::TempDir;

    async fn write_json(path: &Path, value: &Value) {
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(path, serde_json::to_string(value).unwrap())
            .await
            .unwrap();
    }

    async fn seed_store(root: &Path) {
        write_json(
            &root.join("project-map.json"),
            &serde_json::json!({
                "/work/proj": "ws_1",
                "/other": "ws_2",
            }),
        )
        .await;
        write_json(
            &root.join("task-index.json"),
            &serde_json::json!({
                "tasks": [
                    {"id": "T-1", "workspaceId": "ws_1", "title": "Refactor parser",
                     "createdAt": 1755600000000i64, "updatedAt": 1755600300000i64},
                    {"id": "T-2", "workspaceId": "ws_2", "title": "Other task",
                     "createdAt": 1755500000000i64, "updatedAt": 1755500300000i64},
                ]
            }),
        )
        .await;
        write_json(
            &root.join("tasks").join("T-1.json"),
            &serde_json::json!({
                "id": "T-1", "title": "Refactor parser", "workspaceId": "ws_1",
                "createdAt": 1755600000000i64, "updatedAt": 1755600300000i64,
                "messages": [
                    {"role": "user", "meta": {"sentAt": 1755600000000i64},
                     "content": [{"type": "text", "text": "refactor the parser"}]},
                    {"role": "assistant", "model": "gpt-5",
                     "meta": {"sentAt": 1755600010000i64},
                     "content": [
                        {"type": "thinking", "thinking": "start with the lexer"},
                        {"type": "tool_use", "id": "tu_1", "name": "read_file",
                         "input": {"path": "src/lexer.rs"}},
                     ]},
                    {"role": "user", "meta": {"sentAt": 1755600020000i64},
                     "content": [
                        {"type": "tool_result", "toolUseId": "tu_1",
                         "content": [{"type": "text", "text": "pub struct Lexer;"}]},
                     ]},
                ]
            }),
        )
        .await;
    }

    #[tokio::test]
    #[serial(amp_root)]
    async fn map_indirection_resolves_project_to_tasks() {
        let tmp = TempDir::new().unwrap();
        seed_store(tmp.path()).await;
        std::env::set_var(ROOT_ENV, tmp.path());

        let all = Amp.list_sessions(&ScopeHint::any()).await;
        assert_eq!(all.len(), 2);
        // newest updatedAt first
        assert_eq!(all[0].session_id, "T-1");

        let scoped = Amp
            .list_sessions(&ScopeHint::for_directory("/work/proj"))
            .await;
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].title, "Refactor parser");

        // unmapped project resolves to no workspace, hence no sessions
        let unmapped = Amp
            .list_sessions(&ScopeHint::for_directory("/nowhere"))
            .await;
        assert!(unmapped.is_empty());

        std::env::remove_var(ROOT_ENV);
    }

    #[tokio::test]
    #[serial(amp_root)]
    async fn thread_parses_with_nested_tool_result() {
        let tmp = TempDir::new().unwrap();
        seed_store(tmp.path()).await;
        std::env::set_var(ROOT_ENV, tmp.path());

        let loc = Amp.find_session("T-1").await.unwrap();
        let detail = Amp.parse(&loc).await.unwrap();
        std::env::remove_var(ROOT_ENV);

        // user, thinking, tool use (result nested)
        assert_eq!(detail.messages.len(), 3);
        assert_eq!(detail.messages[0].role(), "user");
        assert_eq!(detail.messages[1].role(), "thinking");
        match &detail.messages[2] {
            ParsedMessage::ToolUse {
                tool_name, results, ..
            } => {
                assert_eq!(tool_name, "read_file");
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].output[0].as_text(), "pub struct Lexer;");
            }
            other => panic!("expected ToolUse, got {other:?}"),
        }

        let meta = detail.metadata.unwrap();
        assert_eq!(meta.working_directory.as_deref(), Some("/work/proj"));
        assert_eq!(meta.model_usage[0].model, "gpt-5");
        assert_eq!(detail.title, "Refactor parser");
    }

    #[test]
    fn text_block_before_tool_use_keeps_its_position() {
        let record = serde_json::json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": "checking the lexer"},
                {"type": "tool_use", "id": "tu_9", "name": "grep",
                 "input": {"pattern": "Lexer"}},
            ]
        });
        let mut out = Vec::new();
        let mut models = ModelCounter::default();
        push_thread_message(&record, &mut models, &mut out);
        let roles: Vec<&str> = out.iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec!["assistant", "tool_use"]);
    }

    #[tokio::test]
    #[serial(amp_root)]
    async fn missing_index_is_empty_and_missing_task_not_found() {
        let tmp = TempDir::new().unwrap();
        std::env::set_var(ROOT_ENV, tmp.path());
        assert!(Amp.list_sessions(&ScopeHint::any()).await.is_empty());
        assert!(Amp.find_session("T-9").await.is_none());
        std::env::remove_var(ROOT_ENV);
    }
}
