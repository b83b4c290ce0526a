// crates/types/src/export.rs
//! Flattened row view of a parsed session.
//!
//! External query surfaces (search tools, exporters) consume sessions as a
//! flat list of rows rather than the nested message enum. This is the de
//! facto wire contract: sequence number, role, title, subtitle, timestamp,
//! and content rendered as plain text.

use crate::{MessageContent, ParsedMessage, SessionDetail, ToolResultData};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRow {
    pub seq: usize,
    pub role: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub content: String,
}

fn join_content(content: &[MessageContent]) -> String {
    content
        .iter()
        .map(MessageContent::as_text)
        .collect::<Vec<_>>()
        .join("\n")
}

fn result_row(seq: usize, data: &ToolResultData) -> MessageRow {
    MessageRow {
        seq,
        role: "tool_result".to_string(),
        title: data
            .tool_name
            .clone()
            .unwrap_or_else(|| "Tool result".to_string()),
        subtitle: data.tool_call_id.clone(),
        timestamp: data.timestamp,
        content: join_content(&data.output),
    }
}

impl SessionDetail {
    /// Flatten the message sequence into wire rows. Nested tool results get
    /// their own rows immediately after the owning `ToolUse`.
    pub fn rows(&self) -> Vec<MessageRow> {
        let mut rows = Vec::with_capacity(self.messages.len());
        for msg in &self.messages {
            let seq = rows.len();
            match msg {
                ParsedMessage::User { content, timestamp } => rows.push(MessageRow {
                    seq,
                    role: "user".to_string(),
                    title: "User".to_string(),
                    subtitle: None,
                    timestamp: *timestamp,
                    content: join_content(content),
                }),
                ParsedMessage::AssistantText { content, timestamp } => rows.push(MessageRow {
                    seq,
                    role: "assistant".to_string(),
                    title: "Assistant".to_string(),
                    subtitle: None,
                    timestamp: *timestamp,
                    content: join_content(content),
                }),
                ParsedMessage::AssistantThinking {
                    thinking,
                    timestamp,
                } => rows.push(MessageRow {
                    seq,
                    role: "thinking".to_string(),
                    title: "Thinking".to_string(),
                    subtitle: None,
                    timestamp: *timestamp,
                    content: thinking.clone(),
                }),
                ParsedMessage::ToolUse {
                    tool_name,
                    tool_call_id,
                    input,
                    results,
                    timestamp,
                } => {
                    rows.push(MessageRow {
                        seq,
                        role: "tool_use".to_string(),
                        title: tool_name.clone(),
                        subtitle: tool_call_id.clone(),
                        timestamp: *timestamp,
                        content: input
                            .iter()
                            .map(|(k, v)| format!("{k}: {v}"))
                            .collect::<Vec<_>>()
                            .join("\n"),
                    });
                    for data in results {
                        let seq = rows.len();
                        rows.push(result_row(seq, data));
                    }
                }
                ParsedMessage::ToolResult(data) => rows.push(result_row(seq, data)),
                ParsedMessage::Info {
                    title,
                    subtitle,
                    content,
                    timestamp,
                    ..
                } => rows.push(MessageRow {
                    seq,
                    role: "info".to_string(),
                    title: title.clone(),
                    subtitle: subtitle.clone(),
                    timestamp: *timestamp,
                    content: content.as_ref().map(|c| c.as_text().to_string()).unwrap_or_default(),
                }),
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InfoStyle;
    use pretty_assertions::assert_eq;

    #[test]
    fn rows_are_sequential_and_flatten_nested_results() {
        let mut detail = SessionDetail::new("s1", "title");
        detail.messages = vec![
            ParsedMessage::user(vec![MessageContent::text("hi")]),
            ParsedMessage::ToolUse {
                tool_name: "Bash".to_string(),
                tool_call_id: Some("t1".to_string()),
                input: vec![("command".to_string(), "ls".to_string())],
                results: vec![ToolResultData::new(vec![MessageContent::text("a.rs")])
                    .with_tool_call_id("t1")],
                timestamp: None,
            },
            ParsedMessage::Info {
                title: "Session ended".to_string(),
                subtitle: Some("exit 0".to_string()),
                content: None,
                style: InfoStyle::Default,
                timestamp: None,
            },
        ];

        let rows = detail.rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows.iter().map(|r| r.seq).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert_eq!(rows[1].role, "tool_use");
        assert_eq!(rows[1].content, "command: ls");
        assert_eq!(rows[2].role, "tool_result");
        assert_eq!(rows[2].subtitle.as_deref(), Some("t1"));
        assert_eq!(rows[3].title, "Session ended");
    }

    #[test]
    fn user_content_blocks_join_with_newlines() {
        let mut detail = SessionDetail::new("s", "t");
        detail.messages = vec![ParsedMessage::user(vec![
            MessageContent::markdown("**hi**"),
            MessageContent::code("let x = 1;", Some("rust".to_string())),
        ])];
        let rows = detail.rows();
        assert_eq!(rows[0].content, "**hi**\nlet x = 1;");
    }
}
