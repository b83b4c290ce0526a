// crates/engine/src/providers/junie.rs
//! Junie adapter.
//!
//! Storage: `~/.junie/tasks/<taskId>/` holding an append-only
//! `events.jsonl` and usually a `work_description.txt`. The event log is
//! step-oriented: tool, terminal, file and result blocks recur under one
//! `stepId` as their status advances from IN_PROGRESS to COMPLETED. The
//! parser keeps the most recent payload per step but emits the message at
//! the position the step first appeared, so interleaving with user
//! prompts and status lines is preserved.
//!
//! No structured field carries the working directory. It is recovered
//! from the "Project root directory:" line of the work description, or
//! failing that from the first `cd <path>` terminal event.

use super::{
    classified_text, derive_title, malformed_record, provider_root, read_lines, scan_candidates,
    sort_newest_first, title_from_text, ScopeHint, SessionFinder, SessionLocation, SessionParser,
};
use crate::timeutil::{file_mtime, parse_instant};
use crate::truncate::truncate_output;
use agent_view_types::{
    MessageContent, ParsedMessage, Provider, SessionDetail, SessionMetadata, SessionSummary,
    ToolResultData,
};
use async_trait::async_trait;
use regex_lite::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::io::AsyncBufReadExt;
use tracing::debug;

pub struct Junie;

const ROOT_ENV: &str = "AGENT_VIEW_JUNIE_ROOT";
const EVENTS_FILE: &str = "events.jsonl";
const WORK_DESCRIPTION_FILE: &str = "work_description.txt";
const PROJECT_ROOT_LABEL: &str = "Project root directory:";

fn root() -> Option<PathBuf> {
    provider_root(ROOT_ENV, &[".junie", "tasks"])
}

async fn task_dirs() -> Vec<PathBuf> {
    let Some(root) = root() else { return Vec::new() };
    let Ok(mut entries) = tokio::fs::read_dir(&root).await else {
        return Vec::new();
    };
    let mut dirs = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs
}

fn cd_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^cd\s+([^\s&;|]+)").unwrap())
}

/// Recover the task's working directory. The work description is the fast
/// path; otherwise the event log is scanned line by line and the scan
/// stops at the first `cd` terminal command.
async fn working_directory(task_dir: &Path) -> Option<String> {
    if let Ok(text) = tokio::fs::read_to_string(task_dir.join(WORK_DESCRIPTION_FILE)).await {
        for line in text.lines() {
            if let Some(rest) = line.trim().strip_prefix(PROJECT_ROOT_LABEL) {
                let path = rest.trim();
                if !path.is_empty() {
                    return Some(path.to_string());
                }
            }
        }
    }

    let file = tokio::fs::File::open(task_dir.join(EVENTS_FILE)).await.ok()?;
    let mut lines = tokio::io::BufReader::new(file).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(event) = serde_json::from_str::<Value>(line.trim()) else {
            continue;
        };
        if event.get("block").and_then(Value::as_str) != Some("terminal") {
            continue;
        }
        let command = event
            .get("command")
            .and_then(Value::as_str)
            .or_else(|| event.get("text").and_then(Value::as_str))
            .unwrap_or("");
        if let Some(cap) = cd_regex().captures(command.trim()) {
            return Some(cap[1].to_string());
        }
    }
    None
}

async fn summarize(task_dir: PathBuf, scope: ScopeHint) -> Option<SessionSummary> {
    let events = task_dir.join(EVENTS_FILE);
    if !events.is_file() {
        return None;
    }

    let cwd = working_directory(&task_dir).await;
    if !scope.matches(cwd.as_deref()) {
        return None;
    }

    let session_id = task_dir.file_name()?.to_string_lossy().to_string();

    // Title: work description first, else the first user prompt.
    let mut title = tokio::fs::read_to_string(task_dir.join(WORK_DESCRIPTION_FILE))
        .await
        .ok()
        .and_then(|text| {
            text.lines()
                .map(str::trim)
                .find(|l| !l.is_empty() && !l.starts_with(PROJECT_ROOT_LABEL))
                .and_then(title_from_text)
        });
    let mut created_at = None;

    if let Ok(lines) = read_lines(&events).await {
        for line in &lines {
            let Ok(event) = serde_json::from_str::<Value>(line.trim()) else {
                continue;
            };
            if created_at.is_none() {
                created_at = event
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .and_then(parse_instant);
            }
            if title.is_none()
                && event.get("type").and_then(Value::as_str) == Some("user_prompt")
            {
                title = event
                    .get("text")
                    .and_then(Value::as_str)
                    .and_then(title_from_text);
            }
            if created_at.is_some() && title.is_some() {
                break;
            }
        }
    }

    Some(SessionSummary {
        title: title.unwrap_or_else(|| session_id.clone()),
        session_id,
        provider: Provider::Junie,
        created_at,
        updated_at: file_mtime(&events),
        message_count: None,
    })
}

#[async_trait]
impl SessionFinder for Junie {
    async fn list_sessions(&self, scope: &ScopeHint) -> Vec<SessionSummary> {
        let dirs = task_dirs().await;
        let mut summaries = scan_candidates(dirs, |dir| summarize(dir, scope.clone())).await;
        sort_newest_first(&mut summaries);
        summaries
    }

    async fn find_session(&self, session_id: &str) -> Option<SessionLocation> {
        let root = root()?;
        let path = root.join(session_id);
        if !path.join(EVENTS_FILE).is_file() {
            return None;
        }
        Some(SessionLocation {
            provider: Provider::Junie,
            session_id: session_id.to_string(),
            path,
        })
    }
}

/// Timeline slot: either a finished message or a step placeholder whose
/// payload keeps being overwritten until the end of the log.
enum Slot {
    Message(ParsedMessage),
    Step(String),
}

/// Render the latest payload of one step. The block kind names the tool;
/// `details` becomes the nested result when present.
fn step_message(event: &Value) -> ParsedMessage {
    let ts = event
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_instant);
    let block = event.get("block").and_then(Value::as_str).unwrap_or("step");
    let text = event.get("text").and_then(Value::as_str).unwrap_or("");
    let details = event.get("details").and_then(Value::as_str);

    if block == "result" {
        return ParsedMessage::Info {
            title: "Result".to_string(),
            subtitle: None,
            content: (!text.is_empty()).then(|| classified_text(text)),
            style: Default::default(),
            timestamp: ts,
        };
    }

    let tool_name = event
        .get("toolName")
        .and_then(Value::as_str)
        .unwrap_or(block);
    let mut input = Vec::new();
    if let Some(command) = event.get("command").and_then(Value::as_str) {
        input.push(("command".to_string(), truncate_output(command)));
    }
    if !text.is_empty() {
        input.push(("text".to_string(), truncate_output(text)));
    }

    let mut msg = ParsedMessage::tool_use(tool_name, input).with_timestamp(ts);
    if let Some(details) = details {
        if let ParsedMessage::ToolUse { results, .. } = &mut msg {
            results.push(
                ToolResultData::new(vec![MessageContent::text(truncate_output(details))])
                    .with_timestamp(ts),
            );
        }
    }
    msg
}

#[async_trait]
impl SessionParser for Junie {
    async fn parse(&self, location: &SessionLocation) -> Option<SessionDetail> {
        let events = location.path.join(EVENTS_FILE);
        let lines = match read_lines(&events).await {
            Ok(lines) => lines,
            Err(err) => {
                debug!("junie task unreadable: {err}");
                return None;
            }
        };

        let mut slots: Vec<Slot> = Vec::new();
        let mut steps: HashMap<String, Value> = HashMap::new();
        let mut created_at = None;

        for line in &lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let event: Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(_) => {
                    slots.push(Slot::Message(malformed_record("event", line)));
                    continue;
                }
            };
            let ts = event
                .get("timestamp")
                .and_then(Value::as_str)
                .and_then(parse_instant);
            if created_at.is_none() {
                created_at = ts;
            }

            if let Some(step_id) = event.get("stepId").and_then(Value::as_str) {
                // Last write wins; position stays where the step first appeared.
                if steps.insert(step_id.to_string(), event.clone()).is_none() {
                    slots.push(Slot::Step(step_id.to_string()));
                }
                continue;
            }

            let text = event.get("text").and_then(Value::as_str).unwrap_or("");
            match event.get("type").and_then(Value::as_str) {
                Some("user_prompt") => slots.push(Slot::Message(
                    ParsedMessage::user(vec![classified_text(text)]).with_timestamp(ts),
                )),
                Some("agent_answer") => slots.push(Slot::Message(
                    ParsedMessage::assistant_text(vec![classified_text(text)])
                        .with_timestamp(ts),
                )),
                Some("status") => slots.push(Slot::Message(
                    ParsedMessage::Info {
                        title: "Status".to_string(),
                        subtitle: None,
                        content: (!text.is_empty()).then(|| MessageContent::text(text)),
                        style: Default::default(),
                        timestamp: ts,
                    },
                )),
                _ => slots.push(Slot::Message(
                    ParsedMessage::Info {
                        title: "event".to_string(),
                        subtitle: None,
                        content: Some(MessageContent::json(event.to_string())),
                        style: Default::default(),
                        timestamp: ts,
                    },
                )),
            }
        }

        let messages: Vec<ParsedMessage> = slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Message(msg) => Some(msg),
                Slot::Step(id) => steps.get(&id).map(step_message),
            })
            .collect();

        let metadata = SessionMetadata {
            working_directory: working_directory(&location.path).await,
            created_at,
            modified_at: file_mtime(&events),
            message_count: Some(messages.len()),
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use tempfile::TempDir;

    async fn write_task(root: &Path, id: &str, events: &[&str], description: Option<&str>) -> PathBuf {
        let dir = root.join(id);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join(EVENTS_FILE), events.join("\n"))
            .await
            .unwrap();
        if let Some(text) = description {
            tokio::fs::write(dir.join(WORK_DESCRIPTION_FILE), text)
                .await
                .unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn step_dedupe_keeps_last_payload_at_first_position() {
        let tmp = TempDir::new().unwrap();
        let dir = write_task(
            tmp.path(),
            "task-1",
            &[
                r#"{"timestamp":"2026-04-01T08:00:00Z","type":"user_prompt","text":"find Foo"}"#,
                r#"{"timestamp":"2026-04-01T08:00:01Z","block":"tool","toolName":"search","stepId":"s1","status":"IN_PROGRESS","text":"Searching..."}"#,
                r#"{"timestamp":"2026-04-01T08:00:02Z","type":"status","text":"still working"}"#,
                r#"{"timestamp":"2026-04-01T08:00:03Z","block":"tool","toolName":"search","stepId":"s1","status":"COMPLETED","text":"Found file","details":"src/Foo.kt"}"#,
            ],
            None,
        )
        .await;

        let loc = SessionLocation {
            provider: Provider::Junie,
            session_id: "task-1".to_string(),
            path: dir,
        };
        let detail = Junie.parse(&loc).await.unwrap();

        // prompt, one deduped step (between prompt and status), status
        assert_eq!(detail.messages.len(), 3);
        assert_eq!(detail.messages[0].role(), "user");
        match &detail.messages[1] {
            ParsedMessage::ToolUse {
                tool_name,
                input,
                results,
                ..
            } => {
                assert_eq!(tool_name, "search");
                assert!(input.iter().any(|(_, v)| v == "Found file"));
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].output[0].as_text(), "src/Foo.kt");
            }
            other => panic!("expected ToolUse, got {other:?}"),
        }
        assert_eq!(detail.messages[2].role(), "info");
        assert_eq!(detail.title, "find Foo");
    }

    #[tokio::test]
    async fn cwd_prefers_work_description_over_terminal_scan() {
        let tmp = TempDir::new().unwrap();
        let dir = write_task(
            tmp.path(),
            "task-2",
            &[
                r#"{"block":"terminal","stepId":"t1","status":"COMPLETED","command":"cd /from/terminal && ls"}"#,
            ],
            Some("Fix the build\nProject root directory: /from/description\n"),
        )
        .await;
        assert_eq!(
            working_directory(&dir).await.as_deref(),
            Some("/from/description")
        );
    }

    #[tokio::test]
    async fn cwd_falls_back_to_first_cd_command() {
        let tmp = TempDir::new().unwrap();
        let dir = write_task(
            tmp.path(),
            "task-3",
            &[
                r#"{"type":"status","text":"starting"}"#,
                r#"{"block":"terminal","stepId":"t1","status":"COMPLETED","command":"cd /work/proj && cargo check"}"#,
                r#"{"block":"terminal","stepId":"t2","status":"COMPLETED","command":"cd /work/later"}"#,
            ],
            None,
        )
        .await;
        // first match wins
        assert_eq!(working_directory(&dir).await.as_deref(), Some("/work/proj"));
    }

    #[tokio::test]
    async fn malformed_event_stays_visible() {
        let tmp = TempDir::new().unwrap();
        let dir = write_task(
            tmp.path(),
            "task-4",
            &[
                r#"{"type":"user_prompt","text":"hello"}"#,
                "not json at all {",
                r#"{"type":"agent_answer","text":"done"}"#,
            ],
            None,
        )
        .await;
        let loc = SessionLocation {
            provider: Provider::Junie,
            session_id: "task-4".to_string(),
            path: dir,
        };
        let detail = Junie.parse(&loc).await.unwrap();
        assert_eq!(detail.messages.len(), 3);
        assert!(detail
            .messages
            .iter()
            .any(|m| matches!(m, ParsedMessage::Info { style, .. }
                if *style == agent_view_types::InfoStyle::Error)));
    }

    #[tokio::test]
    #[serial(junie_root)]
    async fn finder_scopes_by_recovered_cwd() {
        let tmp = TempDir::new().unwrap();
        write_task(
            tmp.path(),
            "task-a",
            &[r#"{"timestamp":"2026-04-01T08:00:00Z","type":"user_prompt","text":"first"}"#],
            Some("First task\nProject root directory: /work/proj\n"),
        )
        .await;
        write_task(
            tmp.path(),
            "task-b",
            &[
                r#"{"type":"user_prompt","text":"second"}"#,
                r#"{"block":"terminal","stepId":"t1","status":"COMPLETED","command":"cd /other"}"#,
            ],
            None,
        )
        .await;
        std::env::set_var(ROOT_ENV, tmp.path());

        let all = Junie.list_sessions(&ScopeHint::any()).await;
        assert_eq!(all.len(), 2);

        let scoped = Junie
            .list_sessions(&ScopeHint::for_directory("/work/proj"))
            .await;
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].session_id, "task-a");
        assert_eq!(scoped[0].title, "First task");

        let loc = Junie.find_session("task-b").await.unwrap();
        assert!(loc.path.ends_with("task-b"));
        assert!(Junie.find_session("task-z").await.is_none());

        std::env::remove_var(ROOT_ENV);
    }

    #[tokio::test]
    #[serial(junie_root)]
    async fn missing_root_is_empty() {
        std::env::set_var(ROOT_ENV, "/no/junie/root");
        assert!(Junie.list_sessions(&ScopeHint::any()).await.is_empty());
        std::env::remove_var(ROOT_ENV);
    }
}
