// crates/engine/src/providers/claude_code.rs
//! Claude Code adapter.
//!
//! Storage: `~/.claude/projects/<encoded-path>/<sessionId>.jsonl`, one JSONL
//! file per session grouped under a directory per project. Records carry a
//! top-level `type` (`user`, `assistant`, `system`, `summary`, ...), the
//! conversation payload under `message`, and common fields (`timestamp`,
//! `cwd`, `gitBranch`, `version`, `isMeta`).

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
use regex_lite::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

pub struct ClaudeCode;

const ROOT_ENV: &str = "AGENT_VIEW_CLAUDE_CODE_ROOT";

fn root() -> Option<PathBuf> {
    provider_root(ROOT_ENV, &[".claude", "projects"])
}

/// All `<project>/<session>.jsonl` files under the projects root.
async fn session_files() -> Vec<PathBuf> {
    let Some(root) = root() else { return Vec::new() };
    let Ok(mut projects) = tokio::fs::read_dir(&root).await else {
        return Vec::new();
    };

    let mut files = Vec::new();
    while let Ok(Some(project)) = projects.next_entry().await {
        let dir = project.path();
        if !dir.is_dir() {
            continue;
        }
        let Ok(mut sessions) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = sessions.next_entry().await {
            let path = entry.path();
            if path.extension().map(|e| e == "jsonl").unwrap_or(false) {
                files.push(path);
            }
        }
    }
    files
}

struct CommandTagRegexes {
    name: Regex,
    args: Regex,
    message: Regex,
}

fn command_tag_regexes() -> &'static CommandTagRegexes {
    static REGEXES: OnceLock<CommandTagRegexes> = OnceLock::new();
    REGEXES.get_or_init(|| CommandTagRegexes {
        name: Regex::new(r"(?s)<command-name>.*?</command-name>\s*").unwrap(),
        args: Regex::new(r"(?s)<command-args>(.*?)</command-args>").unwrap(),
        message: Regex::new(r"(?s)<command-message>.*?</command-message>\s*").unwrap(),
    })
}

/// Slash-command invocations arrive wrapped in command tags. The
/// `<command-args>` body is the user's actual input when present;
/// otherwise the text minus the other tags.
fn clean_command_tags(content: &str) -> String {
    let regexes = command_tag_regexes();
    if let Some(caps) = regexes.args.captures(content) {
        if let Some(args) = caps.get(1) {
            let extracted = args.as_str().trim();
            if !extracted.is_empty() {
                return extracted.to_string();
            }
        }
    }
    let cleaned = regexes.name.replace_all(content, "");
    let cleaned = regexes.message.replace_all(&cleaned, "");
    cleaned.trim().to_string()
}

fn record_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_instant)
}

/// Lightweight per-file scan for the listing: first user prompt, working
/// directory, message count, and the timestamp range. Malformed lines are
/// skipped here; the full parse surfaces them.
async fn summarize(path: PathBuf, scope: ScopeHint) -> Option<SessionSummary> {
    let lines = read_lines(&path).await.ok()?;
    let session_id = path.file_stem()?.to_string_lossy().to_string();

    let mut cwd: Option<String> = None;
    let mut title: Option<String> = None;
    let mut created_at: Option<DateTime<Utc>> = None;
    let mut updated_at: Option<DateTime<Utc>> = None;
    let mut message_count = 0usize;

    for line in &lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let entry_type = value.get("type").and_then(Value::as_str).unwrap_or("");
        if !matches!(entry_type, "user" | "assistant") {
            continue;
        }
        message_count += 1;

        if cwd.is_none() {
            cwd = value.get("cwd").and_then(Value::as_str).map(String::from);
        }
        if let Some(ts) = record_timestamp(&value) {
            created_at = created_at.or(Some(ts));
            updated_at = Some(ts);
        }
        if title.is_none()
            && entry_type == "user"
            && value.get("isMeta").and_then(Value::as_bool) != Some(true)
        {
            if let Some(text) = value
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_str)
            {
                title = title_from_text(&clean_command_tags(text));
            }
        }
    }

    if !scope.matches(cwd.as_deref()) {
        return None;
    }

    Some(SessionSummary {
        title: title.unwrap_or_else(|| session_id.clone()),
        session_id,
        provider: Provider::ClaudeCode,
        created_at,
        updated_at: updated_at.or_else(|| file_mtime(&path)),
        message_count: Some(message_count),
    })
}

#[async_trait]
impl SessionFinder for ClaudeCode {
    async fn list_sessions(&self, scope: &ScopeHint) -> Vec<SessionSummary> {
        let files = session_files().await;
        let mut summaries = scan_candidates(files, |path| summarize(path, scope.clone())).await;
        sort_newest_first(&mut summaries);
        summaries
    }

    async fn find_session(&self, session_id: &str) -> Option<SessionLocation> {
        let wanted = format!("{session_id}.jsonl");
        session_files()
            .await
            .into_iter()
            .find(|p| p.file_name().map(|n| n == wanted.as_str()).unwrap_or(false))
            .map(|path| SessionLocation {
                provider: Provider::ClaudeCode,
                session_id: session_id.to_string(),
                path,
            })
    }
}

/// Tool-result blocks inside a `user` record become standalone
/// `ToolResult` messages; the correlator nests them afterwards.
fn tool_result_message(block: &Value, ts: Option<DateTime<Utc>>) -> ParsedMessage {
    let output_text = block
        .get("content")
        .map(extract_primary_field)
        .unwrap_or_default();
    let data = ToolResultData {
        tool_name: None,
        tool_call_id: block
            .get("tool_use_id")
            .and_then(Value::as_str)
            .map(String::from),
        output: vec![MessageContent::text(truncate_output(&output_text))],
        is_error: block
            .get("is_error")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        timestamp: ts,
    };
    ParsedMessage::tool_result(data)
}

fn push_user_record(value: &Value, ts: Option<DateTime<Utc>>, out: &mut Vec<ParsedMessage>) {
    let content = value.get("message").and_then(|m| m.get("content"));
    match content {
        Some(Value::String(text)) => {
            let cleaned = clean_command_tags(text).replace("\\\n", "\n");
            if !cleaned.trim().is_empty() {
                out.push(
                    ParsedMessage::user(vec![classified_text(&cleaned)]).with_timestamp(ts),
                );
            }
        }
        Some(Value::Array(blocks)) => {
            let mut texts: Vec<&str> = Vec::new();
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("tool_result") => out.push(tool_result_message(block, ts)),
                    Some("text") => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            texts.push(text);
                        }
                    }
                    _ => out.push(unknown_block(block, ts)),
                }
            }
            let joined = clean_command_tags(&texts.join("\n"));
            if !joined.trim().is_empty() {
                out.push(ParsedMessage::user(vec![classified_text(&joined)]).with_timestamp(ts));
            }
        }
        _ => {
            // No usable content field: keep the raw payload visible.
            match value.get("message") {
                Some(message) => out.push(
                    ParsedMessage::user(vec![MessageContent::json(message.to_string())])
                        .with_timestamp(ts),
                ),
                None => out.push(malformed_record("log line", &value.to_string())),
            }
        }
    }
}

/// Block types this adapter does not know stay visible as raw JSON.
fn unknown_block(block: &Value, ts: Option<DateTime<Utc>>) -> ParsedMessage {
    ParsedMessage::Info {
        title: block
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("block")
            .to_string(),
        subtitle: None,
        content: Some(MessageContent::json(block.to_string())),
        style: Default::default(),
        timestamp: ts,
    }
}

fn push_assistant_record(
    value: &Value,
    ts: Option<DateTime<Utc>>,
    models: &mut ModelCounter,
    out: &mut Vec<ParsedMessage>,
) {
    let Some(message) = value.get("message") else {
        out.push(malformed_record("log line", &value.to_string()));
        return;
    };
    if let Some(model) = message.get("model").and_then(Value::as_str) {
        models.record(model);
    }

    match message.get("content") {
        Some(Value::String(text)) => {
            if !text.trim().is_empty() {
                out.push(ParsedMessage::assistant_text(vec![classified_text(text)])
                    .with_timestamp(ts));
            }
        }
        Some(Value::Array(blocks)) => {
            let mut texts: Vec<&str> = Vec::new();
            let mut tool_uses: Vec<ParsedMessage> = Vec::new();
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            texts.push(text);
                        }
                    }
                    Some("thinking") => {
                        if let Some(thinking) = block.get("thinking").and_then(Value::as_str) {
                            out.push(
                                ParsedMessage::assistant_thinking(thinking).with_timestamp(ts),
                            );
                        }
                    }
                    Some("tool_use") => {
                        let name = block
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown tool");
                        let mut msg = ParsedMessage::tool_use(name, input_pairs(block.get("input")))
                            .with_timestamp(ts);
                        if let Some(id) = block.get("id").and_then(Value::as_str) {
                            msg = msg.with_tool_call_id(id);
                        }
                        tool_uses.push(msg);
                    }
                    _ => out.push(unknown_block(block, ts)),
                }
            }
            let joined = texts.join("\n");
            if !joined.trim().is_empty() {
                out.push(
                    ParsedMessage::assistant_text(vec![classified_text(&joined)])
                        .with_timestamp(ts),
                );
            }
            out.extend(tool_uses);
        }
        _ => {
            out.push(
                ParsedMessage::assistant_text(vec![MessageContent::json(message.to_string())])
                    .with_timestamp(ts),
            );
        }
    }
}

fn push_ancillary_record(
    entry_type: &str,
    value: &Value,
    ts: Option<DateTime<Utc>>,
    out: &mut Vec<ParsedMessage>,
) {
    let msg = match entry_type {
        "system" => {
            let subtype = value
                .get("subtype")
                .and_then(Value::as_str)
                .unwrap_or("system");
            let mut info = ParsedMessage::info(subtype.to_string());
            if let Some(ms) = value.get("durationMs").and_then(Value::as_u64) {
                info = info.with_subtitle(format!("{ms}ms"));
            }
            info
        }
        "summary" => {
            let text = value.get("summary").and_then(Value::as_str).unwrap_or("");
            ParsedMessage::Info {
                title: "Summary".to_string(),
                subtitle: None,
                content: Some(classified_text(text)),
                style: Default::default(),
                timestamp: None,
            }
        }
        other => ParsedMessage::Info {
            title: other.to_string(),
            subtitle: None,
            content: Some(MessageContent::json(value.to_string())),
            style: Default::default(),
            timestamp: None,
        },
    };
    out.push(msg.with_timestamp(ts));
}

#[async_trait]
impl SessionParser for ClaudeCode {
    async fn parse(&self, location: &SessionLocation) -> Option<SessionDetail> {
        let lines = match read_lines(&location.path).await {
            Ok(lines) => lines,
            Err(err) => {
                debug!("claude-code session unreadable: {err}");
                return None;
            }
        };

        let mut messages: Vec<ParsedMessage> = Vec::new();
        let mut models = ModelCounter::default();
        let mut metadata = SessionMetadata::default();

        for line in &lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(err) => {
                    debug!("claude-code: malformed line in {:?}: {err}", location.path);
                    messages.push(malformed_record("log line", line));
                    continue;
                }
            };

            let ts = record_timestamp(&value);
            if let Some(ts) = ts {
                metadata.created_at = metadata.created_at.or(Some(ts));
                metadata.modified_at = Some(ts);
            }
            if metadata.working_directory.is_none() {
                metadata.working_directory =
                    value.get("cwd").and_then(Value::as_str).map(String::from);
            }
            if metadata.git_branch.is_none() {
                metadata.git_branch = value
                    .get("gitBranch")
                    .and_then(Value::as_str)
                    .map(String::from);
            }
            if metadata.tool_version.is_none() {
                metadata.tool_version = value
                    .get("version")
                    .and_then(Value::as_str)
                    .map(String::from);
            }

            match value.get("type").and_then(Value::as_str) {
                Some("user") => {
                    if value.get("isMeta").and_then(Value::as_bool) == Some(true) {
                        continue;
                    }
                    push_user_record(&value, ts, &mut messages);
                }
                Some("assistant") => push_assistant_record(&value, ts, &mut models, &mut messages),
                Some(other) => push_ancillary_record(other, &value, ts, &mut messages),
                None => messages.push(malformed_record("log line", line)),
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use tempfile::TempDir;

    fn location(path: &Path) -> SessionLocation {
        SessionLocation {
            provider: Provider::ClaudeCode,
            session_id: path.file_stem().unwrap().to_string_lossy().to_string(),
            path: path.to_path_buf(),
        }
    }

    async fn write_session(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        tokio::fs::write(&path, content).await.unwrap();
        path
    }

    #[tokio::test]
    async fn two_line_session_parses_user_then_assistant() {
        let tmp = TempDir::new().unwrap();
        let content = concat!(
            r#"{"type":"user","timestamp":"2026-01-27T10:00:00Z","message":{"content":"hi"}}"#,
            "\n",
            r#"{"type":"assistant","timestamp":"2026-01-27T10:00:01Z","message":{"model":"claude-sonnet-4","content":"hello"}}"#,
        );
        let path = write_session(tmp.path(), "abc.jsonl", content).await;

        let detail = ClaudeCode.parse(&location(&path)).await.unwrap();
        assert_eq!(detail.messages.len(), 2);
        assert_eq!(detail.messages[0].role(), "user");
        assert_eq!(detail.messages[1].role(), "assistant");
        assert!(detail.messages[0].timestamp().is_some());
        assert_eq!(detail.title, "hi");

        let meta = detail.metadata.unwrap();
        assert_eq!(meta.model_usage[0].model, "claude-sonnet-4");
        assert_eq!(meta.message_count, Some(2));
    }

    #[tokio::test]
    async fn tool_use_and_result_correlate_into_one_message() {
        let tmp = TempDir::new().unwrap();
        let content = concat!(
            r#"{"type":"assistant","timestamp":"2026-01-27T10:00:00Z","message":{"content":[{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}}]}}"#,
            "\n",
            r#"{"type":"user","timestamp":"2026-01-27T10:00:02Z","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"a.rs\nb.rs"}]}}"#,
        );
        let path = write_session(tmp.path(), "tools.jsonl", content).await;

        let detail = ClaudeCode.parse(&location(&path)).await.unwrap();
        assert_eq!(detail.messages.len(), 1);
        match &detail.messages[0] {
            ParsedMessage::ToolUse {
                tool_name,
                results,
                input,
                ..
            } => {
                assert_eq!(tool_name, "Bash");
                assert_eq!(input[0], ("command".to_string(), "ls".to_string()));
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].output[0].as_text(), "a.rs\nb.rs");
            }
            other => panic!("expected ToolUse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_line_between_valid_lines_degrades_visibly() {
        let tmp = TempDir::new().unwrap();
        let content = concat!(
            r#"{"type":"user","message":{"content":"first"}}"#,
            "\n",
            "{this is not json",
            "\n",
            r#"{"type":"assistant","message":{"content":"second"}}"#,
        );
        let path = write_session(tmp.path(), "bad.jsonl", content).await;

        let detail = ClaudeCode.parse(&location(&path)).await.unwrap();
        let valid: Vec<_> = detail
            .messages
            .iter()
            .filter(|m| matches!(m.role(), "user" | "assistant"))
            .collect();
        assert_eq!(valid.len(), 2);
        // The bad line is visible, not silently dropped.
        assert!(detail
            .messages
            .iter()
            .any(|m| matches!(m, ParsedMessage::Info { style, .. } if *style == agent_view_types::InfoStyle::Error)));
    }

    #[tokio::test]
    async fn command_tags_cleaned_and_meta_skipped() {
        let tmp = TempDir::new().unwrap();
        let content = concat!(
            r#"{"type":"user","isMeta":true,"message":{"content":"internal init"}}"#,
            "\n",
            r#"{"type":"user","message":{"content":"<command-name>/review</command-name><command-args>PR 42</command-args>"}}"#,
        );
        let path = write_session(tmp.path(), "cmd.jsonl", content).await;

        let detail = ClaudeCode.parse(&location(&path)).await.unwrap();
        assert_eq!(detail.messages.len(), 1);
        match &detail.messages[0] {
            ParsedMessage::User { content, .. } => assert_eq!(content[0].as_text(), "PR 42"),
            other => panic!("expected user, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recordless_and_unknown_blocks_stay_visible() {
        let tmp = TempDir::new().unwrap();
        let content = concat!(
            // valid JSON but no message field at all
            r#"{"type":"user","timestamp":"2026-01-27T10:00:00Z"}"#,
            "\n",
            // content array holding only an unrecognized block type
            r#"{"type":"assistant","message":{"content":[{"type":"image","source":"..."}]}}"#,
        );
        let path = write_session(tmp.path(), "odd.jsonl", content).await;

        let detail = ClaudeCode.parse(&location(&path)).await.unwrap();
        // one stand-in per record, nothing silently dropped
        assert_eq!(detail.messages.len(), 2);
        assert!(detail
            .messages
            .iter()
            .all(|m| matches!(m, ParsedMessage::Info { .. })));
        match &detail.messages[1] {
            ParsedMessage::Info { title, content, .. } => {
                assert_eq!(title, "image");
                assert!(content.as_ref().unwrap().as_text().contains("source"));
            }
            other => panic!("expected Info, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn thinking_blocks_become_thinking_messages() {
        let tmp = TempDir::new().unwrap();
        let content = r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"let me see"},{"type":"text","text":"done"}]}}"#;
        let path = write_session(tmp.path(), "think.jsonl", content).await;

        let detail = ClaudeCode.parse(&location(&path)).await.unwrap();
        assert_eq!(detail.messages.len(), 2);
        assert_eq!(detail.messages[0].role(), "thinking");
        assert_eq!(detail.messages[1].role(), "assistant");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let loc = location(&tmp.path().join("absent.jsonl"));
        assert!(ClaudeCode.parse(&loc).await.is_none());
    }

    #[tokio::test]
    #[serial(claude_code_root)]
    async fn finder_lists_and_filters_by_scope() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("-work-proj");
        tokio::fs::create_dir_all(&project).await.unwrap();
        write_session(
            &project,
            "s1.jsonl",
            r#"{"type":"user","cwd":"/work/proj","timestamp":"2026-01-27T10:00:00Z","message":{"content":"scoped"}}"#,
        )
        .await;
        write_session(
            &project,
            "s2.jsonl",
            r#"{"type":"user","cwd":"/elsewhere","timestamp":"2026-01-27T11:00:00Z","message":{"content":"other"}}"#,
        )
        .await;
        std::env::set_var(ROOT_ENV, tmp.path());

        let all = ClaudeCode.list_sessions(&ScopeHint::any()).await;
        assert_eq!(all.len(), 2);
        // newest first
        assert_eq!(all[0].session_id, "s2");

        let scoped = ClaudeCode
            .list_sessions(&ScopeHint::for_directory("/work/proj"))
            .await;
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].title, "scoped");
        assert_eq!(scoped[0].message_count, Some(1));

        let found = ClaudeCode.find_session("s1").await.unwrap();
        assert_eq!(found.session_id, "s1");
        assert!(ClaudeCode.find_session("nope").await.is_none());

        std::env::remove_var(ROOT_ENV);
    }

    #[tokio::test]
    #[serial(claude_code_root)]
    async fn missing_root_lists_empty() {
        std::env::set_var(ROOT_ENV, "/definitely/not/here");
        assert!(ClaudeCode.list_sessions(&ScopeHint::any()).await.is_empty());
        std::env::remove_var(ROOT_ENV);
    }

    #[test]
    fn clean_command_tags_variants() {
        assert_eq!(
            clean_command_tags("<command-name>/commit</command-name>\ncommit please"),
            "commit please"
        );
        assert_eq!(
            clean_command_tags("<command-args>Fix the <T> generic\nacross files</command-args>"),
            "Fix the <T> generic\nacross files"
        );
        assert_eq!(clean_command_tags("no tags here"), "no tags here");
    }
}
